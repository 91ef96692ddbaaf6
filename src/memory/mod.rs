//! Persistent memory backed by SQLite.
//!
//! Facts, projects, events, preferences, safety rules, workflows and learning
//! records all live in one database file under the data directory. Each
//! concern is implemented in its own file as a separate `impl Memory` block.

mod events;
mod facts;
mod learning;
mod preferences;
mod projects;
mod safety;
mod seed;
mod workflows;

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::error::Result;

pub use events::{Event, EventRecord};
pub use facts::Fact;
pub use learning::{Goal, MemoryStats, Trigger};
pub use projects::ProjectRecord;
pub use safety::{RiskLevel, SafetyAction, SafetyVerdict};
pub use workflows::{LearnedWorkflow, NamedWorkflow, PatternSuggestion, Pipeline, WorkflowTrigger, parse_steps};

/// Handle to the memory database. Cheap to clone.
#[derive(Clone)]
pub struct Memory {
    pool: SqlitePool,
}

impl Memory {
    /// Open (or create) the database file and apply migrations.
    ///
    /// # Arguments
    /// * `path` - Database file, usually `<data>/memory/val_memory.db`
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or the schema cannot be migrated.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(4).connect_with(options).await?;

        let memory = Self::from_pool(pool).await?;
        info!("🧠 Memory ready at {}", path.display());
        Ok(memory)
    }

    /// Fresh private in-memory database.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // One connection that never expires, otherwise the database vanishes
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        let memory = Self { pool };
        memory.seed_safety_rules().await?;
        debug!("Memory schema migrated");
        Ok(memory)
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Current local time as sortable ISO-8601 text.
pub(crate) fn now() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}
