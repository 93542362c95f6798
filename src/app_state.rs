//! Application state for the Actix-web server
//!
//! `AppState` is wrapped in `web::Data` and shared by all handlers. It holds
//! no per-request state: every capture owns its own engine session.

use crate::render::RenderOrchestrator;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shared application state for Actix-web handlers
pub struct AppState {
    /// Capture pipeline, shared by all workers
    pub orchestrator: Arc<RenderOrchestrator>,
    /// When the server started, for the health endpoint
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: RenderOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            started_at: Utc::now(),
        }
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
