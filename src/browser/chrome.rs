use super::config::BrowserConfig;
use super::engine::{EngineError, EnginePage, EngineProcess, NetworkProbe, PageFormat, RenderEngine};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use url::Url;

/// Extra time Chrome's own navigation timeout gets over the pipeline budget,
/// so the pipeline deadline is always the one that fires first.
const NAVIGATION_GRACE: Duration = Duration::from_secs(1);

const NETWORK_PROBE_SCRIPT: &str = r#"JSON.stringify({
    readyState: document.readyState,
    resourceCount: performance.getEntriesByType('resource').length
})"#;

/// Launches one headless Chrome process per session.
///
/// `headless_chrome` is a blocking client, so every call into it runs on the
/// blocking pool and async workers are never parked on the DevTools socket.
pub struct ChromeEngine {
    config: BrowserConfig,
    idle_timeout: Duration,
}

impl ChromeEngine {
    /// `longest_wait` is the longest single wait a render can make; Chrome's
    /// idle watchdog is set beyond it.
    pub fn new(config: BrowserConfig, longest_wait: Duration) -> Self {
        let idle_timeout = config.idle_timeout(longest_wait);
        Self {
            config,
            idle_timeout,
        }
    }

    fn launch_args(config: &BrowserConfig) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            OsString::from("--disable-gpu"),
            OsString::from("--hide-scrollbars"),
            OsString::from("--mute-audio"),
        ];
        args.extend(config.extra_flags.iter().map(OsString::from));
        args
    }

    /// Build Chrome launch options from our config
    fn build_launch_options<'a>(
        config: &BrowserConfig,
        args: &'a [OsString],
        idle_timeout: Duration,
    ) -> Result<LaunchOptions<'a>, EngineError> {
        LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(config.sandbox)
            .window_size(Some((config.window_width, config.window_height)))
            .path(config.chrome_path.clone())
            .idle_browser_timeout(idle_timeout)
            .args(args.iter().map(OsString::as_os_str).collect::<Vec<&OsStr>>())
            .build()
            .map_err(|e| EngineError::Configuration(e.to_string()))
    }
}

/// Runs a blocking `headless_chrome` call off the async workers. A panicked
/// or aborted task is reported through `wrap`.
async fn blocking<T, F>(wrap: fn(String) -> EngineError, f: F) -> Result<T, EngineError>
where
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| wrap(format!("engine task failed: {}", e)))?
}

/// Drops `value` on the blocking pool when called inside a runtime, inline
/// otherwise. Dropping a `Browser` kills and reaps Chrome and removes its
/// profile directory.
fn dispose<T: Send + 'static>(value: T) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(move || drop(value));
        }
        Err(_) => drop(value),
    }
}

/// Requests a tab has sent and not yet seen finish or fail, by request id.
#[derive(Debug, Default)]
struct InFlightRequests {
    ids: Mutex<HashSet<String>>,
}

impl InFlightRequests {
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn started(&self, request_id: &str) {
        // redirects reuse the id, so a set keeps them counted once
        self.lock().insert(request_id.to_string());
    }

    fn ended(&self, request_id: &str) {
        self.lock().remove(request_id);
    }

    fn count(&self) -> u64 {
        self.lock().len() as u64
    }

    fn on_event(&self, event: &Event) {
        match event {
            Event::NetworkRequestWillBeSent(e) => self.started(&e.params.request_id),
            Event::NetworkLoadingFinished(e) => self.ended(&e.params.request_id),
            Event::NetworkLoadingFailed(e) => self.ended(&e.params.request_id),
            _ => {}
        }
    }
}

#[async_trait]
impl RenderEngine for ChromeEngine {
    async fn launch(&self) -> Result<Box<dyn EngineProcess>, EngineError> {
        let config = self.config.clone();
        let idle_timeout = self.idle_timeout;

        let browser = blocking(EngineError::Launch, move || {
            let args = Self::launch_args(&config);
            let options = Self::build_launch_options(&config, &args, idle_timeout)?;
            Browser::new(options).map_err(|e| EngineError::Launch(e.to_string()))
        })
        .await?;

        let pid = browser.get_process_id();
        log::debug!("Chrome launched (pid {:?})", pid);

        Ok(Box::new(ChromeProcess {
            browser: Some(browser),
            pid,
        }))
    }
}

struct ChromeProcess {
    browser: Option<Browser>,
    pid: Option<u32>,
}

#[async_trait]
impl EngineProcess for ChromeProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn open_page(&self) -> Result<Box<dyn EnginePage>, EngineError> {
        let browser = self.browser.clone().ok_or(EngineError::Released)?;
        let in_flight = Arc::new(InFlightRequests::default());
        let tracker = Arc::clone(&in_flight);

        let tab = blocking(EngineError::PageCreation, move || {
            let tab = browser
                .new_tab()
                .map_err(|e| EngineError::PageCreation(e.to_string()))?;

            tab.add_event_listener(Arc::new(move |event: &Event| tracker.on_event(event)))
                .map_err(|e| EngineError::PageCreation(e.to_string()))?;
            // Registering a response handler is what turns on the Network
            // domain, and with it the request events counted above.
            tab.register_response_handling("in-flight", Box::new(|_, _| {}))
                .map_err(|e| EngineError::PageCreation(e.to_string()))?;
            Ok(tab)
        })
        .await?;

        Ok(Box::new(ChromePage {
            tab: Some(tab),
            in_flight,
        }))
    }

    fn terminate(&mut self) {
        // Dropping the last Browser handle kills the child process.
        if let Some(browser) = self.browser.take() {
            dispose(browser);
            log::debug!("Chrome terminated (pid {:?})", self.pid);
        }
    }
}

struct ChromePage {
    tab: Option<Arc<Tab>>,
    in_flight: Arc<InFlightRequests>,
}

impl ChromePage {
    fn tab(&self) -> Result<Arc<Tab>, EngineError> {
        self.tab.clone().ok_or(EngineError::Released)
    }

    async fn evaluate_value(&self, script: String) -> Result<serde_json::Value, EngineError> {
        let tab = self.tab()?;
        blocking(EngineError::Evaluation, move || {
            tab.evaluate(&script, false)
                .map_err(|e| EngineError::Evaluation(e.to_string()))?
                .value
                .ok_or_else(|| EngineError::Evaluation("script returned no value".to_string()))
        })
        .await
    }
}

#[async_trait]
impl EnginePage for ChromePage {
    async fn navigate(&self, url: &Url, budget: Duration) -> Result<(), EngineError> {
        let tab = self.tab()?;
        let url = url.to_string();

        blocking(EngineError::Navigation, move || {
            tab.set_default_timeout(budget + NAVIGATION_GRACE);
            tab.navigate_to(&url)
                .map_err(|e| EngineError::Navigation(format!("Failed to navigate to {}: {}", url, e)))?
                .wait_until_navigated()
                .map_err(|e| EngineError::Navigation(format!("Navigation did not settle for {}: {}", url, e)))?;
            Ok(())
        })
        .await
    }

    async fn probe_network(&self) -> Result<NetworkProbe, EngineError> {
        let value = self.evaluate_value(NETWORK_PROBE_SCRIPT.to_string()).await?;
        let raw = value
            .as_str()
            .ok_or_else(|| EngineError::Evaluation(format!("unexpected probe result: {}", value)))?;
        let mut probe: NetworkProbe =
            serde_json::from_str(raw).map_err(|e| EngineError::Evaluation(e.to_string()))?;
        probe.in_flight = self.in_flight.count();
        Ok(probe)
    }

    async fn is_attached(&self, selector: &str) -> Result<bool, EngineError> {
        let literal =
            serde_json::to_string(selector).map_err(|e| EngineError::Evaluation(e.to_string()))?;
        let script = format!("document.querySelector({}) !== null", literal);
        Ok(self.evaluate_value(script).await?.as_bool() == Some(true))
    }

    async fn print_pdf(&self, format: PageFormat) -> Result<Vec<u8>, EngineError> {
        let tab = self.tab()?;
        let options = PrintToPdfOptions {
            landscape: Some(false),
            print_background: Some(format.print_background),
            paper_width: Some(format.paper_width_in),
            paper_height: Some(format.paper_height_in),
            margin_top: Some(format.margin_in),
            margin_bottom: Some(format.margin_in),
            margin_left: Some(format.margin_in),
            margin_right: Some(format.margin_in),
            prefer_css_page_size: Some(false),
            ..Default::default()
        };

        blocking(EngineError::Print, move || {
            tab.print_to_pdf(Some(options))
                .map_err(|e| EngineError::Print(e.to_string()))
        })
        .await
    }

    fn close(&mut self) {
        // The tab dies with its process; dropping the handle is enough here.
        self.tab.take();
    }
}
