use super::error::{RenderError, RenderStage};
use super::export::DocumentExporter;
use super::readiness::ReadinessDetector;
use super::request::{FrontendOrigin, RenderRequest, RenderTarget, RenderTimings};
use super::result::RenderResult;
use crate::browser::{RenderSession, SessionManager};
use crate::metrics::RenderMetrics;
use chrono::{NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

fn utc_today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Runs one capture from target to PDF bytes.
///
/// Each render takes an admission permit, gets its own session, navigates,
/// waits for readiness, exports and releases the session on every path.
/// A render either yields a complete PDF or an error; never partial output.
pub struct RenderOrchestrator {
    origin: FrontendOrigin,
    timings: RenderTimings,
    sessions: SessionManager,
    readiness: ReadinessDetector,
    exporter: DocumentExporter,
    admission: Semaphore,
    admission_timeout: Duration,
    metrics: Arc<RenderMetrics>,
    today: fn() -> NaiveDate,
}

impl RenderOrchestrator {
    pub const DEFAULT_MAX_CONCURRENT_RENDERS: usize = 2;

    pub fn new(origin: FrontendOrigin, sessions: SessionManager) -> Self {
        Self {
            origin,
            timings: RenderTimings::default(),
            sessions,
            readiness: ReadinessDetector::default(),
            exporter: DocumentExporter::default(),
            admission: Semaphore::new(Self::DEFAULT_MAX_CONCURRENT_RENDERS),
            admission_timeout: Duration::from_secs(30),
            metrics: Arc::new(RenderMetrics::new()),
            today: utc_today,
        }
    }

    /// Timings applied to requests built by [`request_for`](Self::request_for)
    pub fn with_timings(mut self, timings: RenderTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessDetector) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_exporter(mut self, exporter: DocumentExporter) -> Self {
        self.exporter = exporter;
        self
    }

    /// At most `max_concurrent` engine processes at once; a render waits at
    /// most `timeout` for a slot.
    pub fn with_admission(mut self, max_concurrent: usize, timeout: Duration) -> Self {
        self.admission = Semaphore::new(max_concurrent.max(1));
        self.admission_timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<RenderMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Date source for file names
    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn origin(&self) -> &FrontendOrigin {
        &self.origin
    }

    pub fn metrics(&self) -> &Arc<RenderMetrics> {
        &self.metrics
    }

    pub fn live_sessions(&self) -> usize {
        self.sessions.live_sessions()
    }

    pub fn available_permits(&self) -> usize {
        self.admission.available_permits()
    }

    /// Builds the request for `target` against the configured origin.
    pub fn request_for(&self, target: RenderTarget) -> Result<RenderRequest, RenderError> {
        let url = self.origin.resolve(&target)?;
        Ok(RenderRequest::new(target, url).with_timings(self.timings.clone()))
    }

    /// Resolves and renders `target`.
    pub async fn capture(
        &self,
        target: RenderTarget,
        cancel: &CancellationToken,
    ) -> Result<RenderResult, RenderError> {
        let request = match self.request_for(target) {
            Ok(request) => request,
            Err(e) => {
                self.metrics.record_failure(target.kind(), &e);
                return Err(e);
            }
        };
        self.render_with_cancel(&request, cancel).await
    }

    pub async fn render(&self, request: RenderRequest) -> Result<RenderResult, RenderError> {
        self.render_with_cancel(&request, &CancellationToken::new())
            .await
    }

    /// Renders `request`, aborting with [`RenderError::Cancelled`] as soon as
    /// `cancel` fires. The session is released before this returns either way.
    pub async fn render_with_cancel(
        &self,
        request: &RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RenderResult, RenderError> {
        let kind = request.target().kind();
        let started = Instant::now();
        log::info!("Rendering {} from {}", request.target(), request.target_url());

        let result = self.run(request, cancel).await;
        match &result {
            Ok(_) => self.metrics.record_success(kind, started.elapsed()),
            Err(e) => self.metrics.record_failure(kind, e),
        }
        result
    }

    async fn run(
        &self,
        request: &RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RenderResult, RenderError> {
        let kind = request.target().kind();

        let _permit = until_cancelled(cancel, RenderStage::Created, self.admit()).await?;

        let mut session = until_cancelled(cancel, RenderStage::Created, async {
            self.sessions
                .acquire_with(|_| self.metrics.record_retry(kind))
                .await
                .map_err(RenderError::from)
        })
        .await?;
        transition(&session, RenderStage::SessionAcquired);

        let outcome = self.drive(&session, request, cancel).await;

        self.sessions.release(&mut session);
        transition(&session, RenderStage::Released);

        let bytes = outcome?;
        Ok(RenderResult::new(bytes, request.target(), (self.today)()))
    }

    async fn drive(
        &self,
        session: &RenderSession,
        request: &RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RenderError> {
        until_cancelled(
            cancel,
            RenderStage::SessionAcquired,
            self.readiness.navigate(session, request),
        )
        .await?;
        transition(session, RenderStage::Navigated);

        until_cancelled(
            cancel,
            RenderStage::Navigated,
            self.readiness.settle(session, request),
        )
        .await?;
        transition(session, RenderStage::Ready);

        let bytes =
            until_cancelled(cancel, RenderStage::Ready, self.exporter.export(session)).await?;
        transition(session, RenderStage::Exported);

        Ok(bytes)
    }

    async fn admit(&self) -> Result<SemaphorePermit<'_>, RenderError> {
        let overloaded = RenderError::Overloaded {
            waited: self.admission_timeout,
        };
        match tokio::time::timeout(self.admission_timeout, self.admission.acquire()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) | Err(_) => Err(overloaded),
        }
    }
}

fn transition(session: &RenderSession, stage: RenderStage) {
    log::info!("Session {} -> {}", session.id(), stage);
}

async fn until_cancelled<T>(
    cancel: &CancellationToken,
    stage: RenderStage,
    work: impl Future<Output = Result<T, RenderError>>,
) -> Result<T, RenderError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RenderError::Cancelled { stage }),
        result = work => result,
    }
}
