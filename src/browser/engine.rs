//! The seam between the render pipeline and the out-of-process engine.
//!
//! The pipeline only ever talks to these traits. [`ChromeEngine`](super::ChromeEngine)
//! is the production implementation; tests script their own.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Fixed print configuration handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFormat {
    pub paper_width_in: f64,
    pub paper_height_in: f64,
    pub margin_in: f64,
    pub print_background: bool,
}

impl PageFormat {
    /// A4 with printed backgrounds and a uniform 20px margin (20 / 96 in).
    pub const A4: PageFormat = PageFormat {
        paper_width_in: 8.27,
        paper_height_in: 11.69,
        margin_in: 20.0 / 96.0,
        print_background: true,
    };
}

/// What the page reports about its own loading state.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProbe {
    pub ready_state: String,
    pub resource_count: u64,
    /// Requests sent and not yet finished or failed. Filled in by the
    /// engine from its network events, not by the page.
    #[serde(default)]
    pub in_flight: u64,
}

impl NetworkProbe {
    pub fn is_loaded(&self) -> bool {
        self.ready_state == "complete"
    }

    /// Document loaded and nothing on the wire
    pub fn is_quiet(&self) -> bool {
        self.is_loaded() && self.in_flight == 0
    }
}

/// Starts engine processes.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Spawns a fresh engine process. Never hands out a process twice.
    async fn launch(&self) -> Result<Box<dyn EngineProcess>, EngineError>;
}

/// One running engine process.
#[async_trait]
pub trait EngineProcess: Send + Sync {
    /// OS process id, when the engine exposes one.
    fn pid(&self) -> Option<u32>;

    async fn open_page(&self) -> Result<Box<dyn EnginePage>, EngineError>;

    /// Kills the process. Must be safe to call more than once.
    fn terminate(&mut self);
}

/// One page/tab inside an engine process.
#[async_trait]
pub trait EnginePage: Send + Sync {
    /// Starts navigation and returns once the engine reports the frame navigated.
    /// `budget` is a hint for engines with their own internal timeouts.
    async fn navigate(&self, url: &Url, budget: Duration) -> Result<(), EngineError>;

    async fn probe_network(&self) -> Result<NetworkProbe, EngineError>;

    /// Whether an element matching `selector` is attached to the document.
    async fn is_attached(&self, selector: &str) -> Result<bool, EngineError>;

    async fn print_pdf(&self, format: PageFormat) -> Result<Vec<u8>, EngineError>;

    /// Releases the page handle. Must be safe to call more than once.
    fn close(&mut self);
}

/// Errors that can occur at the engine boundary
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Engine launch failed: {0}")]
    Launch(String),

    #[error("Engine configuration error: {0}")]
    Configuration(String),

    #[error("Page creation failed: {0}")]
    PageCreation(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("JavaScript evaluation error: {0}")]
    Evaluation(String),

    #[error("Print failed: {0}")]
    Print(String),

    #[error("Session already released")]
    Released,
}
