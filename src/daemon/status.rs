//! HTTP status endpoint.
//!
//! `GET /health` reports host load, `GET /state` a snapshot of the
//! dialogue.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::{MemoryRefreshKind, ProcessesToUpdate, System};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::session::{DialogueState, SharedSession, Slot};

#[derive(Clone)]
pub struct StatusState {
    session: SharedSession,
    system: Arc<Mutex<System>>,
}

impl StatusState {
    pub fn new(session: SharedSession) -> Self {
        Self { session, system: Arc::new(Mutex::new(System::new())) }
    }

    /// Host figures. CPU usage covers the time since the previous call and
    /// reads zero on the first one.
    fn sample(&self) -> HealthResponse {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        system.refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());
        system.refresh_processes(ProcessesToUpdate::All, true);

        HealthResponse {
            cpu: round1(f64::from(system.global_cpu_usage()).clamp(0.0, 100.0)),
            memory: memory_percent(system.used_memory(), system.total_memory()),
            processes: system.processes().len(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub cpu: f64,
    pub memory: f64,
    pub processes: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PendingSummary {
    pub intent: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Slot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub state: DialogueState,
    pub listening: bool,
    pub last_command: Option<String>,
    pub last_project: Option<String>,
    pub actions_count: u64,
    pub pending: Option<PendingSummary>,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn memory_percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round1(100.0 * used.min(total) as f64 / total as f64)
}

pub async fn health(State(state): State<StatusState>) -> Json<HealthResponse> {
    Json(state.sample())
}

pub async fn state(State(state): State<StatusState>) -> Json<StateResponse> {
    let session = state.session.lock();
    Json(StateResponse {
        state: session.state,
        listening: !matches!(session.state, DialogueState::Thinking | DialogueState::Executing),
        last_command: session.last_command.clone(),
        last_project: session.last_project.as_ref().map(|p| p.name.clone()),
        actions_count: session.actions_count,
        pending: session.pending.as_ref().map(|p| PendingSummary {
            intent: p.intent.kind_name().to_string(),
            reason: p.reason.clone(),
            missing: p.missing,
            options: p.options.clone(),
        }),
    })
}

pub fn router(session: SharedSession) -> Router {
    Router::new().route("/health", get(health)).route("/state", get(state)).with_state(StatusState::new(session))
}

/// Serve the status endpoint on `port` until cancelled.
pub async fn serve(port: u16, session: SharedSession, cancel: CancellationToken) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("Failed to bind status endpoint on {}", addr))?;
    info!("📡 Status endpoint on http://{}", addr);
    axum::serve(listener, router(session)).with_graceful_shutdown(cancel.cancelled_owned()).await?;
    Ok(())
}
