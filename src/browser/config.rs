use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the engine processes launched per render
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Run the browser without a display
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Keep Chrome's sandbox on. Containers running as root usually need it off.
    #[serde(default = "default_true")]
    pub sandbox: bool,

    /// Viewport width used while laying out the page
    #[serde(default = "default_window_width")]
    pub window_width: u32,

    /// Viewport height used while laying out the page
    #[serde(default = "default_window_height")]
    pub window_height: u32,

    /// Explicit Chrome/Chromium binary; auto-detected when unset
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Additional Chrome flags
    #[serde(default)]
    pub extra_flags: Vec<String>,
}

fn default_true() -> bool {
    true
}
fn default_window_width() -> u32 {
    1280
}
fn default_window_height() -> u32 {
    1024
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            window_width: default_window_width(),
            window_height: default_window_height(),
            chrome_path: None,
            extra_flags: vec![],
        }
    }
}

impl BrowserConfig {
    /// Configuration for running inside a container as root
    pub fn container() -> Self {
        Self {
            sandbox: false,
            extra_flags: vec!["--disable-dev-shm-usage".to_string()],
            ..Self::default()
        }
    }

    /// Non-headless browser for watching a capture locally
    pub fn debug_mode() -> Self {
        Self {
            headless: false,
            ..Self::default()
        }
    }

    /// How long the engine's own watchdog may see no traffic before it
    /// kills the process. Must outlast the longest single wait in a render.
    pub fn idle_timeout(&self, longest_wait: Duration) -> Duration {
        longest_wait + Duration::from_secs(30)
    }
}
