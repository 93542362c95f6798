//! Scripted engine for pipeline tests. Timing is driven by tokio's clock so
//! tests can run with paused time.

#![allow(dead_code)]

use async_trait::async_trait;
use book_capture::browser::{
    EngineError, EnginePage, EngineProcess, LaunchPolicy, NetworkProbe, PageFormat, RenderEngine,
    SessionManager,
};
use book_capture::render::{
    DocumentExporter, FrontendOrigin, ReadinessDetector, RenderOrchestrator, RenderTimings,
};
use chrono::NaiveDate;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

pub const SAMPLE_PDF: &[u8] = b"%PDF-1.7\n1 0 obj << /Type /Catalog >> endobj\n%%EOF\n";

/// How the scripted page behaves after navigation
#[derive(Debug, Clone)]
pub struct PageScript {
    /// Launches that fail before one succeeds
    pub launch_failures: u32,
    /// Every launch blocks forever
    pub launch_hangs: bool,
    /// When the page reaches network idle; `None` keeps it loading forever
    pub idle_after: Option<Duration>,
    /// How long one request stays in flight after navigation, with the
    /// document already complete and the resource count stable
    pub request_in_flight_for: Option<Duration>,
    /// When the chart marker attaches; `None` never attaches it
    pub marker_after: Option<Duration>,
    pub navigate_error: Option<String>,
    pub navigate_hangs: bool,
    pub pdf: Result<Vec<u8>, String>,
    pub print_panics: bool,
}

impl Default for PageScript {
    fn default() -> Self {
        Self {
            launch_failures: 0,
            launch_hangs: false,
            idle_after: Some(Duration::ZERO),
            request_in_flight_for: None,
            marker_after: Some(Duration::ZERO),
            navigate_error: None,
            navigate_hangs: false,
            pdf: Ok(SAMPLE_PDF.to_vec()),
            print_panics: false,
        }
    }
}

/// What the engine saw
#[derive(Debug, Default)]
pub struct Recorder {
    pub launch_attempts: AtomicU32,
    pub launches: AtomicU32,
    pub terminations: AtomicU32,
    pub pages_closed: AtomicU32,
    pub live: AtomicU32,
    pub peak_live: AtomicU32,
    pub navigated_at: Mutex<Option<Instant>>,
    pub export_started_at: Mutex<Option<Instant>>,
}

impl Recorder {
    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> u32 {
        self.terminations.load(Ordering::SeqCst)
    }

    pub fn peak_live(&self) -> u32 {
        self.peak_live.load(Ordering::SeqCst)
    }

    pub fn navigated_at(&self) -> Instant {
        self.navigated_at.lock().unwrap().expect("page never navigated")
    }

    pub fn export_started_at(&self) -> Option<Instant> {
        *self.export_started_at.lock().unwrap()
    }

    /// Every launched process was terminated and every page closed
    pub fn all_released(&self) -> bool {
        let launches = self.launches();
        launches == self.terminations()
            && launches == self.pages_closed.load(Ordering::SeqCst)
            && self.live.load(Ordering::SeqCst) == 0
    }
}

pub struct MockEngine {
    script: PageScript,
    recorder: Arc<Recorder>,
    failures_left: AtomicU32,
}

impl MockEngine {
    pub fn new(script: PageScript) -> (Arc<Self>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let engine = Arc::new(Self {
            failures_left: AtomicU32::new(script.launch_failures),
            script,
            recorder: Arc::clone(&recorder),
        });
        (engine, recorder)
    }
}

#[async_trait]
impl RenderEngine for MockEngine {
    async fn launch(&self) -> Result<Box<dyn EngineProcess>, EngineError> {
        self.recorder.launch_attempts.fetch_add(1, Ordering::SeqCst);
        if self.script.launch_hangs {
            std::future::pending::<()>().await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EngineError::Launch("chrome binary not found".to_string()));
        }

        self.recorder.launches.fetch_add(1, Ordering::SeqCst);
        let live = self.recorder.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.recorder.peak_live.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(MockProcess {
            script: self.script.clone(),
            recorder: Arc::clone(&self.recorder),
            terminated: false,
        }))
    }
}

struct MockProcess {
    script: PageScript,
    recorder: Arc<Recorder>,
    terminated: bool,
}

#[async_trait]
impl EngineProcess for MockProcess {
    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    async fn open_page(&self) -> Result<Box<dyn EnginePage>, EngineError> {
        Ok(Box::new(MockPage {
            script: self.script.clone(),
            recorder: Arc::clone(&self.recorder),
            navigated_at: Mutex::new(None),
            probes: AtomicU64::new(0),
            closed: false,
        }))
    }

    fn terminate(&mut self) {
        if !self.terminated {
            self.terminated = true;
            self.recorder.terminations.fetch_add(1, Ordering::SeqCst);
            self.recorder.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

struct MockPage {
    script: PageScript,
    recorder: Arc<Recorder>,
    navigated_at: Mutex<Option<Instant>>,
    probes: AtomicU64,
    closed: bool,
}

impl MockPage {
    fn since_navigation(&self) -> Result<Duration, EngineError> {
        self.navigated_at
            .lock()
            .unwrap()
            .map(|at| at.elapsed())
            .ok_or_else(|| EngineError::Evaluation("page not navigated".to_string()))
    }

    fn reached(&self, at: Option<Duration>) -> Result<bool, EngineError> {
        let elapsed = self.since_navigation()?;
        Ok(at.map_or(false, |at| elapsed >= at))
    }
}

#[async_trait]
impl EnginePage for MockPage {
    async fn navigate(&self, _url: &Url, _budget: Duration) -> Result<(), EngineError> {
        if self.script.navigate_hangs {
            std::future::pending::<()>().await;
        }
        if let Some(message) = &self.script.navigate_error {
            return Err(EngineError::Navigation(message.clone()));
        }

        let now = Instant::now();
        *self.navigated_at.lock().unwrap() = Some(now);
        *self.recorder.navigated_at.lock().unwrap() = Some(now);
        Ok(())
    }

    async fn probe_network(&self) -> Result<NetworkProbe, EngineError> {
        let pending = match self.script.request_in_flight_for {
            Some(held) => !self.reached(Some(held))?,
            None => false,
        };

        if self.reached(self.script.idle_after)? {
            Ok(NetworkProbe {
                ready_state: "complete".to_string(),
                resource_count: 7,
                in_flight: u64::from(pending),
            })
        } else {
            Ok(NetworkProbe {
                ready_state: "loading".to_string(),
                resource_count: self.probes.fetch_add(1, Ordering::SeqCst),
                in_flight: 1,
            })
        }
    }

    async fn is_attached(&self, _selector: &str) -> Result<bool, EngineError> {
        self.reached(self.script.marker_after)
    }

    async fn print_pdf(&self, _format: PageFormat) -> Result<Vec<u8>, EngineError> {
        *self.recorder.export_started_at.lock().unwrap() = Some(Instant::now());
        if self.script.print_panics {
            panic!("renderer crashed while printing");
        }
        self.script.pdf.clone().map_err(EngineError::Print)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.recorder.pages_closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub fn new_year() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

/// Timings with the production defaults, spelled out for readability
pub fn timings() -> RenderTimings {
    RenderTimings {
        navigation_timeout: Duration::from_secs(60),
        readiness_timeout: Duration::from_secs(10),
        settle_delay: Duration::from_secs(2),
        post_ready_delay: Duration::from_secs(1),
        marker_selector: ".highcharts-container".to_string(),
    }
}

/// Near-zero delays for tests on a real clock
pub fn fast_timings() -> RenderTimings {
    RenderTimings {
        navigation_timeout: Duration::from_secs(5),
        readiness_timeout: Duration::from_secs(1),
        settle_delay: Duration::from_millis(5),
        post_ready_delay: Duration::from_millis(5),
        marker_selector: ".highcharts-container".to_string(),
    }
}

pub fn orchestrator(engine: Arc<MockEngine>, timings: RenderTimings) -> RenderOrchestrator {
    let policy = LaunchPolicy {
        timeout: Duration::from_secs(5),
        attempts: 2,
        retry_delay: Duration::from_millis(10),
    };
    let origin = FrontendOrigin::parse("http://frontend.test:3000").unwrap();

    RenderOrchestrator::new(origin, SessionManager::new(engine, policy))
        .with_timings(timings)
        .with_readiness(ReadinessDetector::new(
            Duration::from_millis(100),
            Duration::from_millis(500),
        ))
        .with_exporter(DocumentExporter::new(Duration::from_secs(30)))
        .with_admission(2, Duration::from_secs(30))
        .with_clock(new_year)
}

/// Orchestrator with short polling for tests on a real clock
pub fn fast_orchestrator(engine: Arc<MockEngine>) -> RenderOrchestrator {
    orchestrator(engine, fast_timings()).with_readiness(ReadinessDetector::new(
        Duration::from_millis(5),
        Duration::from_millis(20),
    ))
}
