//! Metrics for the capture pipeline
//!
//! Tracks success rates, failure kinds, retries and render time per target kind

use crate::render::RenderError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct TargetMetrics {
    pub target_kind: String,
    pub total_renders: u64,
    pub successful_renders: u64,
    pub failed_renders: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub average_render_time_ms: f64,
    pub total_render_time_ms: u64,
    pub launch_retries: u64,
    pub failures_by_kind: BTreeMap<String, u64>,
}

impl TargetMetrics {
    pub fn new(target_kind: String) -> Self {
        Self {
            target_kind,
            total_renders: 0,
            successful_renders: 0,
            failed_renders: 0,
            last_success: None,
            last_failure: None,
            last_error: None,
            average_render_time_ms: 0.0,
            total_render_time_ms: 0,
            launch_retries: 0,
            failures_by_kind: BTreeMap::new(),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_renders == 0 {
            0.0
        } else {
            (self.successful_renders as f64 / self.total_renders as f64) * 100.0
        }
    }

    pub fn record_success(&mut self, render_time: Duration) {
        self.total_renders += 1;
        self.successful_renders += 1;
        self.last_success = Some(Utc::now());

        self.total_render_time_ms += render_time.as_millis() as u64;
        self.average_render_time_ms =
            self.total_render_time_ms as f64 / self.successful_renders as f64;
    }

    pub fn record_failure(&mut self, error: &RenderError) {
        self.total_renders += 1;
        self.failed_renders += 1;
        self.last_failure = Some(Utc::now());
        self.last_error = Some(error.to_string());
        *self
            .failures_by_kind
            .entry(error.kind().to_string())
            .or_insert(0) += 1;
    }

    pub fn record_retry(&mut self) {
        self.launch_retries += 1;
    }

    pub fn failures_of(&self, kind: &str) -> u64 {
        self.failures_by_kind.get(kind).copied().unwrap_or(0)
    }
}

/// Per-target render metrics shared by all requests
#[derive(Default)]
pub struct RenderMetrics {
    metrics: Mutex<HashMap<String, TargetMetrics>>,
}

impl RenderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TargetMetrics>> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_target<R>(&self, target_kind: &str, f: impl FnOnce(&mut TargetMetrics) -> R) -> R {
        let mut metrics = self.lock();
        let entry = metrics
            .entry(target_kind.to_string())
            .or_insert_with(|| TargetMetrics::new(target_kind.to_string()));
        f(entry)
    }

    pub fn record_success(&self, target_kind: &str, render_time: Duration) {
        let rate = self.with_target(target_kind, |m| {
            m.record_success(render_time);
            m.success_rate()
        });

        log::info!(
            "[{}] Rendered in {}ms - Success rate: {:.2}%",
            target_kind,
            render_time.as_millis(),
            rate
        );
    }

    pub fn record_failure(&self, target_kind: &str, error: &RenderError) {
        let rate = self.with_target(target_kind, |m| {
            m.record_failure(error);
            m.success_rate()
        });

        log::warn!(
            "[{}] Failed at {} ({}): {} - Success rate: {:.2}%",
            target_kind,
            error.stage(),
            error.kind(),
            error,
            rate
        );
    }

    pub fn record_retry(&self, target_kind: &str) {
        let retries = self.with_target(target_kind, |m| {
            m.record_retry();
            m.launch_retries
        });

        log::debug!("[{}] Launch retry - Total retries: {}", target_kind, retries);
    }

    pub fn get_metrics(&self, target_kind: &str) -> Option<TargetMetrics> {
        self.lock().get(target_kind).cloned()
    }

    /// All targets, ordered by kind
    pub fn get_all_metrics(&self) -> Vec<TargetMetrics> {
        let mut all: Vec<TargetMetrics> = self.lock().values().cloned().collect();
        all.sort_by(|a, b| a.target_kind.cmp(&b.target_kind));
        all
    }
}
