//! Error types for the memory store, blueprints and model access.
//!
//! Application glue (CLI, audio, daemon loop) uses `anyhow`; the pieces below
//! return `ValError` so callers can tell storage failures from bad input.

/// Core error type.
#[derive(Debug, thiserror::Error)]
pub enum ValError {
    /// SQLite query or connection failure.
    #[error("memory store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Schema migration failure at startup.
    #[error("memory migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Malformed JSON in a stored value or model answer.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blueprint could not be parsed or contains unsafe paths.
    #[error("invalid blueprint: {0}")]
    Blueprint(String),

    /// The language model could not be reached or returned nothing usable.
    #[error("language model error: {0}")]
    Llm(String),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, ValError>;
