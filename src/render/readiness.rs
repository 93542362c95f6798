use super::error::RenderError;
use super::request::RenderRequest;
use super::wait::{poll_until, wait_until, QuietPeriod, WaitError};
use crate::browser::RenderSession;
use std::time::Duration;
use tokio::time::Instant;

/// How to decide a navigated page is ready to export
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessPolicy {
    /// Chart pages: wait for the marker element to be attached
    WaitForMarker { selector: String, timeout: Duration },
    /// Pages with no readiness signal: wait a fixed grace period
    FixedDelay(Duration),
}

impl ReadinessPolicy {
    pub fn for_request(request: &RenderRequest) -> Self {
        let timings = request.timings();
        if request.expects_chart() {
            ReadinessPolicy::WaitForMarker {
                selector: timings.marker_selector.clone(),
                timeout: timings.readiness_timeout,
            }
        } else {
            ReadinessPolicy::FixedDelay(timings.settle_delay)
        }
    }
}

/// Decides when a page has stabilized enough to export.
///
/// Network idle alone misses charts that are drawn after their data fetch
/// completes, so chart pages additionally wait for the chart container.
/// Pages without charts get a fixed grace period instead.
#[derive(Debug, Clone)]
pub struct ReadinessDetector {
    poll_interval: Duration,
    network_idle: Duration,
}

impl Default for ReadinessDetector {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_millis(500))
    }
}

impl ReadinessDetector {
    /// `network_idle` is the quiescence window: how long the page's resource
    /// count must stay unchanged after the document finished loading.
    pub fn new(poll_interval: Duration, network_idle: Duration) -> Self {
        Self {
            poll_interval,
            network_idle,
        }
    }

    /// Navigates and applies the readiness policy plus the final delay.
    pub async fn await_ready(
        &self,
        session: &RenderSession,
        request: &RenderRequest,
    ) -> Result<(), RenderError> {
        self.navigate(session, request).await?;
        self.settle(session, request).await
    }

    /// Navigates to the target and waits for network idle, all within the
    /// navigation budget.
    pub async fn navigate(
        &self,
        session: &RenderSession,
        request: &RenderRequest,
    ) -> Result<(), RenderError> {
        let url = request.target_url();
        let timeout = request.timings().navigation_timeout;
        let deadline = Instant::now() + timeout;
        let timed_out = || RenderError::NavigationTimeout {
            url: url.clone(),
            timeout,
        };

        let page = session.page().map_err(|source| RenderError::Navigation {
            url: url.clone(),
            source,
        })?;

        match tokio::time::timeout_at(deadline, page.navigate(url, timeout)).await {
            Err(_) => return Err(timed_out()),
            Ok(Err(source)) => {
                return Err(RenderError::Navigation {
                    url: url.clone(),
                    source,
                })
            }
            Ok(Ok(())) => {}
        }

        let mut quiet = QuietPeriod::new(self.network_idle);
        let probe = poll_until(
            deadline,
            self.poll_interval,
            move || page.probe_network(),
            |probe| quiet.observe(probe.resource_count, probe.is_quiet()),
        )
        .await
        .map_err(|e| match e {
            WaitError::TimedOut => timed_out(),
            WaitError::Engine(source) => RenderError::Navigation {
                url: url.clone(),
                source,
            },
        })?;

        log::debug!(
            "{} reached network idle ({} resources)",
            url,
            probe.resource_count
        );
        Ok(())
    }

    /// Applies the readiness policy, then the unconditional post-ready delay.
    pub async fn settle(
        &self,
        session: &RenderSession,
        request: &RenderRequest,
    ) -> Result<(), RenderError> {
        match ReadinessPolicy::for_request(request) {
            ReadinessPolicy::WaitForMarker { selector, timeout } => {
                let page = session.page().map_err(RenderError::Readiness)?;
                let marker = selector.as_str();

                wait_until(timeout, self.poll_interval, move || page.is_attached(marker))
                    .await
                    .map_err(|e| match e {
                        WaitError::TimedOut => RenderError::RenderTimeout {
                            selector: selector.clone(),
                            timeout,
                        },
                        WaitError::Engine(source) => RenderError::Readiness(source),
                    })?;
                log::debug!("Marker '{}' attached", selector);
            }
            ReadinessPolicy::FixedDelay(delay) => {
                tokio::time::sleep(delay).await;
            }
        }

        tokio::time::sleep(request.timings().post_ready_delay).await;
        Ok(())
    }
}
