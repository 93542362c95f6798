// Library interface for book_capture
// The binary and the integration tests both build on these modules

pub mod app_state;
pub mod browser;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod render;
pub mod routes;
