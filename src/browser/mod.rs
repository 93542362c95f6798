//! Engine boundary: headless Chrome processes and the sessions that own them
//!
//! Every render gets its own Chrome process and tab through a
//! [`SessionManager`]. The returned [`RenderSession`] is the only owner of
//! both; releasing it (explicitly or by dropping it) kills the process.
//!
//! # Example
//!
//! ```no_run
//! use book_capture::browser::{BrowserConfig, ChromeEngine, LaunchPolicy, SessionManager};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = ChromeEngine::new(BrowserConfig::default(), Duration::from_secs(60));
//! let sessions = SessionManager::new(Arc::new(engine), LaunchPolicy::default());
//!
//! let mut session = sessions.acquire().await?;
//! let page = session.page()?;
//! println!("attached: {}", page.is_attached("body").await?);
//! sessions.release(&mut session);
//! # Ok(())
//! # }
//! ```

pub mod chrome;
pub mod config;
pub mod engine;
pub mod session;

pub use chrome::ChromeEngine;
pub use config::BrowserConfig;
pub use engine::{EngineError, EnginePage, EngineProcess, NetworkProbe, PageFormat, RenderEngine};
pub use session::{LaunchFailure, LaunchPolicy, RenderSession, SessionManager};
