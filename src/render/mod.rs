//! The capture pipeline: resolve target, acquire session, navigate, wait for
//! readiness, export, release.

pub mod error;
pub mod export;
pub mod orchestrator;
pub mod readiness;
pub mod request;
pub mod result;
pub mod wait;

pub use error::{RenderError, RenderStage};
pub use export::{DocumentExporter, PDF_MAGIC};
pub use orchestrator::RenderOrchestrator;
pub use readiness::{ReadinessDetector, ReadinessPolicy};
pub use request::{FrontendOrigin, RenderRequest, RenderTarget, RenderTimings};
pub use result::{suggested_filename, RenderResult, PDF_MEDIA_TYPE};
