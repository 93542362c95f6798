//! "Poll until a predicate holds or a deadline passes", the one waiting
//! primitive every readiness check goes through.

use crate::browser::EngineError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("condition not met before the deadline")]
    TimedOut,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Calls `probe` every `interval` until `judge` accepts a result or `deadline`
/// passes. An in-flight probe is abandoned at the deadline. Probe errors end
/// the wait immediately.
pub async fn poll_until<T, P, Fut, J>(
    deadline: Instant,
    interval: Duration,
    mut probe: P,
    mut judge: J,
) -> Result<T, WaitError>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
    J: FnMut(&T) -> bool,
{
    let polling = async {
        loop {
            let value = probe().await.map_err(WaitError::Engine)?;
            if judge(&value) {
                return Ok::<T, WaitError>(value);
            }
            tokio::time::sleep(interval).await;
        }
    };

    match tokio::time::timeout_at(deadline, polling).await {
        Ok(result) => result,
        Err(_) => Err(WaitError::TimedOut),
    }
}

/// Waits until `check` returns `true`, for at most `timeout`.
pub async fn wait_until<P, Fut>(timeout: Duration, interval: Duration, check: P) -> Result<(), WaitError>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, EngineError>>,
{
    poll_until(Instant::now() + timeout, interval, check, |ready| *ready)
        .await
        .map(|_| ())
}

/// Tracks how long an observed counter has stayed unchanged.
///
/// Used for network idle: the page is idle once it has reported a finished
/// document with no requests in flight, and an unchanged resource count, for
/// the whole of `window`.
#[derive(Debug)]
pub struct QuietPeriod {
    window: Duration,
    last: Option<(u64, Instant)>,
}

impl QuietPeriod {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Feeds one observation. Returns `true` once `value` has been stable and
    /// `settled` has held for the whole window. An unsettled observation
    /// restarts the window.
    pub fn observe(&mut self, value: u64, settled: bool) -> bool {
        if !settled {
            self.last = None;
            return false;
        }

        let now = Instant::now();
        let since = match self.last {
            Some((previous, since)) if previous == value => since,
            _ => {
                self.last = Some((value, now));
                now
            }
        };
        now.duration_since(since) >= self.window
    }
}
