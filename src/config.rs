use crate::browser::{BrowserConfig, ChromeEngine, LaunchPolicy, RenderEngine, SessionManager};
use crate::metrics::RenderMetrics;
use crate::render::request::{OriginError, DEFAULT_MARKER_SELECTOR};
use crate::render::{
    DocumentExporter, FrontendOrigin, ReadinessDetector, RenderOrchestrator, RenderTimings,
};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const CONFIG_PATH: &str = "config.toml";
pub const FRONTEND_URL_ENV: &str = "FRONTEND_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Origin(#[from] OriginError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Base origin of the front end whose pages are captured
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Actix worker threads; one per core when unset
    #[serde(default)]
    pub workers: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenderConfig {
    /// Budget for navigation plus network idle
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// Budget for the chart marker to attach
    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout_secs: u64,

    /// Grace period for pages without a chart
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Final delay applied to every page before printing
    #[serde(default = "default_post_ready_delay")]
    pub post_ready_delay_ms: u64,

    /// How long the resource count must stay unchanged to count as network idle
    #[serde(default = "default_network_idle")]
    pub network_idle_ms: u64,

    /// Interval between readiness probes
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_export_timeout")]
    pub export_timeout_secs: u64,

    #[serde(default = "default_marker_selector")]
    pub marker_selector: String,

    /// Maximum simultaneous Chrome processes
    #[serde(default = "default_max_concurrent_renders")]
    pub max_concurrent_renders: usize,

    /// How long a request may queue for a render slot
    #[serde(default = "default_admission_timeout")]
    pub admission_timeout_secs: u64,

    #[serde(default = "default_launch_timeout")]
    pub launch_timeout_secs: u64,

    /// Launch attempts per render, including the first
    #[serde(default = "default_launch_attempts")]
    pub launch_attempts: u32,

    #[serde(default = "default_launch_retry_delay")]
    pub launch_retry_delay_ms: u64,
}

fn default_frontend_url() -> String { "http://localhost:3000".to_string() }
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 5078 }
fn default_navigation_timeout() -> u64 { 60 }
fn default_readiness_timeout() -> u64 { 10 }
fn default_settle_delay() -> u64 { 2000 }
fn default_post_ready_delay() -> u64 { 1000 }
fn default_network_idle() -> u64 { 500 }
fn default_poll_interval() -> u64 { 100 }
fn default_export_timeout() -> u64 { 30 }
fn default_marker_selector() -> String { DEFAULT_MARKER_SELECTOR.to_string() }
fn default_max_concurrent_renders() -> usize { 2 }
fn default_admission_timeout() -> u64 { 30 }
fn default_launch_timeout() -> u64 { 20 }
fn default_launch_attempts() -> u32 { 2 }
fn default_launch_retry_delay() -> u64 { 250 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_secs: default_navigation_timeout(),
            readiness_timeout_secs: default_readiness_timeout(),
            settle_delay_ms: default_settle_delay(),
            post_ready_delay_ms: default_post_ready_delay(),
            network_idle_ms: default_network_idle(),
            poll_interval_ms: default_poll_interval(),
            export_timeout_secs: default_export_timeout(),
            marker_selector: default_marker_selector(),
            max_concurrent_renders: default_max_concurrent_renders(),
            admission_timeout_secs: default_admission_timeout(),
            launch_timeout_secs: default_launch_timeout(),
            launch_attempts: default_launch_attempts(),
            launch_retry_delay_ms: default_launch_retry_delay(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frontend_url: default_frontend_url(),
            server: ServerConfig::default(),
            render: RenderConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

impl RenderConfig {
    pub fn timings(&self) -> RenderTimings {
        RenderTimings {
            navigation_timeout: Duration::from_secs(self.navigation_timeout_secs),
            readiness_timeout: Duration::from_secs(self.readiness_timeout_secs),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            post_ready_delay: Duration::from_millis(self.post_ready_delay_ms),
            marker_selector: self.marker_selector.clone(),
        }
    }

    pub fn launch_policy(&self) -> LaunchPolicy {
        LaunchPolicy {
            timeout: Duration::from_secs(self.launch_timeout_secs),
            attempts: self.launch_attempts,
            retry_delay: Duration::from_millis(self.launch_retry_delay_ms),
        }
    }

    pub fn readiness_detector(&self) -> ReadinessDetector {
        ReadinessDetector::new(
            Duration::from_millis(self.poll_interval_ms),
            Duration::from_millis(self.network_idle_ms),
        )
    }

    pub fn exporter(&self) -> DocumentExporter {
        DocumentExporter::new(Duration::from_secs(self.export_timeout_secs))
    }

    /// Longest single wait a render can make
    pub fn longest_wait(&self) -> Duration {
        [
            self.navigation_timeout_secs,
            self.readiness_timeout_secs,
            self.export_timeout_secs,
        ]
        .into_iter()
        .max()
        .map(Duration::from_secs)
        .unwrap_or_default()
    }
}

impl Config {
    /// Reads `config.toml` when present, falling back to defaults, then
    /// applies environment overrides.
    pub fn load() -> Self {
        let mut config = if Path::new(CONFIG_PATH).exists() {
            match Self::load_from(CONFIG_PATH) {
                Ok(cfg) => cfg,
                Err(e) => {
                    log::warn!("{}; using defaults", e);
                    Self::default()
                }
            }
        } else {
            Self::default()
        };
        config.apply_overrides(std::env::var(FRONTEND_URL_ENV).ok());
        config
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// A non-blank `frontend_url` replaces the configured origin.
    pub fn apply_overrides(&mut self, frontend_url: Option<String>) {
        if let Some(url) = frontend_url.filter(|u| !u.trim().is_empty()) {
            self.frontend_url = url;
        }
    }

    pub fn frontend_origin(&self) -> Result<FrontendOrigin, ConfigError> {
        Ok(FrontendOrigin::parse(&self.frontend_url)?)
    }

    /// Create the Chrome engine described by `[browser]`
    pub fn create_engine(&self) -> ChromeEngine {
        ChromeEngine::new(self.browser.clone(), self.render.longest_wait())
    }

    /// Wire an orchestrator over `engine` from this configuration
    pub fn build_orchestrator(
        &self,
        engine: Arc<dyn RenderEngine>,
        metrics: Arc<RenderMetrics>,
    ) -> Result<RenderOrchestrator, ConfigError> {
        let sessions = SessionManager::new(engine, self.render.launch_policy());

        Ok(RenderOrchestrator::new(self.frontend_origin()?, sessions)
            .with_timings(self.render.timings())
            .with_readiness(self.render.readiness_detector())
            .with_exporter(self.render.exporter())
            .with_admission(
                self.render.max_concurrent_renders,
                Duration::from_secs(self.render.admission_timeout_secs),
            )
            .with_metrics(metrics))
    }
}
