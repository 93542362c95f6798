use crate::browser::{EngineError, LaunchFailure};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Where a render is in its lifecycle.
///
/// `Created → SessionAcquired → Navigated → Ready → Exported → Released`.
/// Every failure also ends in `Released`; the stage carried by an error is
/// the one the render was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderStage {
    Created,
    SessionAcquired,
    Navigated,
    Ready,
    Exported,
    Released,
}

impl RenderStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStage::Created => "created",
            RenderStage::SessionAcquired => "session_acquired",
            RenderStage::Navigated => "navigated",
            RenderStage::Ready => "ready",
            RenderStage::Exported => "exported",
            RenderStage::Released => "released",
        }
    }
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that end a render. None of them leaves a process behind.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("could not start the rendering engine: {0}")]
    Launch(#[from] LaunchFailure),

    #[error("{url} did not reach network idle within {}s", .timeout.as_secs_f64())]
    NavigationTimeout { url: Url, timeout: Duration },

    #[error("navigation to {url} failed: {source}")]
    Navigation { url: Url, source: EngineError },

    #[error("marker '{selector}' was not attached within {}s", .timeout.as_secs_f64())]
    RenderTimeout { selector: String, timeout: Duration },

    #[error("readiness check failed: {0}")]
    Readiness(EngineError),

    #[error("PDF export failed: {0}")]
    Export(String),

    #[error("render cancelled while {stage}")]
    Cancelled { stage: RenderStage },

    #[error("no render slot became free within {}s", .waited.as_secs_f64())]
    Overloaded { waited: Duration },

    #[error("cannot resolve capture target: {0}")]
    Target(#[from] crate::render::request::OriginError),

    /// The render task died without returning. Its session was released
    /// when the task unwound.
    #[error("render aborted: {0}")]
    Internal(String),
}

impl RenderError {
    /// Stable, machine-readable failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::Launch(_) => "launch_failure",
            RenderError::NavigationTimeout { .. } => "navigation_timeout",
            RenderError::Navigation { .. } => "navigation_failure",
            RenderError::RenderTimeout { .. } => "render_timeout",
            RenderError::Readiness(_) => "readiness_failure",
            RenderError::Export(_) => "export_failure",
            RenderError::Cancelled { .. } => "cancelled",
            RenderError::Overloaded { .. } => "overloaded",
            RenderError::Target(_) => "invalid_target",
            RenderError::Internal(_) => "internal",
        }
    }

    /// Stage the render was in when it failed
    pub fn stage(&self) -> RenderStage {
        match self {
            RenderError::Launch(_)
            | RenderError::Overloaded { .. }
            | RenderError::Target(_) => RenderStage::Created,
            RenderError::NavigationTimeout { .. } | RenderError::Navigation { .. } => {
                RenderStage::SessionAcquired
            }
            RenderError::RenderTimeout { .. } | RenderError::Readiness(_) => RenderStage::Navigated,
            RenderError::Export(_) => RenderStage::Ready,
            RenderError::Cancelled { stage } => *stage,
            RenderError::Internal(_) => RenderStage::Released,
        }
    }
}
