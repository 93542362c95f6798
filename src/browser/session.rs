//! One engine process plus one page per render, torn down on every exit path.

use super::engine::{EngineError, EnginePage, EngineProcess, RenderEngine};
use rand::Rng;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Launch policy for [`SessionManager`]
#[derive(Debug, Clone)]
pub struct LaunchPolicy {
    /// Upper bound on a single process spawn plus page open
    pub timeout: Duration,
    /// Total attempts, including the first
    pub attempts: u32,
    /// Base delay before the second attempt; doubles afterwards
    pub retry_delay: Duration,
}

impl Default for LaunchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            attempts: 2,
            retry_delay: Duration::from_millis(250),
        }
    }
}

impl LaunchPolicy {
    /// Exponential backoff with ±25% jitter
    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.retry_delay.saturating_mul(2u32.saturating_pow(attempt));
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        base.mul_f64(jitter)
    }
}

/// Why a session could not be acquired
#[derive(Debug, Clone, thiserror::Error)]
#[error("engine did not start after {attempts} attempt(s): {last_error}")]
pub struct LaunchFailure {
    pub attempts: u32,
    pub last_error: EngineError,
}

/// Hands out fresh, exclusively owned render sessions.
pub struct SessionManager {
    engine: Arc<dyn RenderEngine>,
    policy: LaunchPolicy,
    live: Arc<AtomicUsize>,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new(engine: Arc<dyn RenderEngine>, policy: LaunchPolicy) -> Self {
        Self {
            engine,
            policy,
            live: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of sessions acquired and not yet released
    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Launches a new engine process and opens one page in it.
    ///
    /// Only launch failures are retried, up to `LaunchPolicy::attempts`.
    /// `on_retry` is called before each retry.
    pub async fn acquire_with(&self, mut on_retry: impl FnMut(u32)) -> Result<RenderSession, LaunchFailure> {
        let attempts = self.policy.attempts.max(1);
        let mut last_error = EngineError::Launch("no launch attempted".to_string());

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.policy.retry_delay(attempt - 1);
                log::warn!(
                    "Engine launch attempt {}/{} failed ({}), retrying in {}ms",
                    attempt,
                    attempts,
                    last_error,
                    delay.as_millis()
                );
                on_retry(attempt);
                tokio::time::sleep(delay).await;
            }

            match tokio::time::timeout(self.policy.timeout, self.launch_once()).await {
                Ok(Ok(session)) => return Ok(session),
                Ok(Err(e)) => last_error = e,
                Err(_) => {
                    last_error = EngineError::Launch(format!(
                        "engine did not start within {}s",
                        self.policy.timeout.as_secs_f64()
                    ))
                }
            }
        }

        Err(LaunchFailure {
            attempts,
            last_error,
        })
    }

    pub async fn acquire(&self) -> Result<RenderSession, LaunchFailure> {
        self.acquire_with(|_| {}).await
    }

    /// Releases `session`. Releasing twice is a no-op.
    pub fn release(&self, session: &mut RenderSession) {
        session.release();
    }

    async fn launch_once(&self) -> Result<RenderSession, EngineError> {
        // Terminates the process if page creation fails or this future is
        // dropped by the launch timeout.
        let mut pending = PendingProcess(Some(self.engine.launch().await?));
        let page = pending.get()?.open_page().await?;
        let process = pending.take()?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_add(1, Ordering::SeqCst);
        log::debug!("Session {} acquired (pid {:?})", id, process.pid());

        Ok(RenderSession {
            id,
            handles: Some(SessionHandles { process, page }),
            live: Arc::clone(&self.live),
        })
    }
}

/// A launched process not yet owned by a session
struct PendingProcess(Option<Box<dyn EngineProcess>>);

impl PendingProcess {
    fn get(&self) -> Result<&dyn EngineProcess, EngineError> {
        self.0.as_deref().ok_or(EngineError::Released)
    }

    fn take(&mut self) -> Result<Box<dyn EngineProcess>, EngineError> {
        self.0.take().ok_or(EngineError::Released)
    }
}

impl Drop for PendingProcess {
    fn drop(&mut self) {
        if let Some(mut process) = self.0.take() {
            process.terminate();
        }
    }
}

struct SessionHandles {
    process: Box<dyn EngineProcess>,
    page: Box<dyn EnginePage>,
}

/// Exclusive owner of one engine process and its page.
///
/// Dropping an unreleased session releases it, so an aborted render
/// future still kills its process.
pub struct RenderSession {
    id: u64,
    handles: Option<SessionHandles>,
    live: Arc<AtomicUsize>,
}

impl RenderSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn page(&self) -> Result<&dyn EnginePage, EngineError> {
        self.handles
            .as_ref()
            .map(|h| h.page.as_ref())
            .ok_or(EngineError::Released)
    }

    pub fn is_released(&self) -> bool {
        self.handles.is_none()
    }

    /// Closes the page and terminates the process. Returns `false` if the
    /// session was already released.
    pub fn release(&mut self) -> bool {
        let Some(mut handles) = self.handles.take() else {
            return false;
        };

        handles.page.close();
        handles.process.terminate();
        self.live.fetch_sub(1, Ordering::SeqCst);
        log::debug!("Session {} released", self.id);
        true
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if self.release() {
            log::warn!("Session {} released on drop", self.id);
        }
    }
}
