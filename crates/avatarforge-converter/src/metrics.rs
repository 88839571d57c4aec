//! Request metrics.
//!
//! Counters are atomics; recent durations live in a bounded ring behind a
//! mutex and feed the P50/P95/P99 figures of a snapshot.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FailureKind;
use crate::models::SourceType;

/// Maximum number of duration samples kept in memory.
const MAX_DURATION_SAMPLES: usize = 1000;

/// Pipeline metrics collector, shared by all requests.
#[derive(Debug, Default)]
pub struct ConversionMetrics {
    requests_started: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_failed: AtomicU64,
    glb_requests: AtomicU64,
    mml_requests: AtomicU64,
    merges_performed: AtomicU64,
    resources_fetched: AtomicU64,
    engine_timeouts: AtomicU64,
    launch_failures: AtomicU64,
    client_failures: AtomicU64,
    fetch_failures: AtomicU64,
    bytes_produced: AtomicU64,
    duration_samples: Mutex<VecDeque<Duration>>,
}

impl ConversionMetrics {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// A request entered the pipeline.
    pub fn record_started(&self) {
        self.requests_started.fetch_add(1, Ordering::Relaxed);
    }

    /// The source of a request was classified.
    pub fn record_source(&self, source: SourceType) {
        let counter = match source {
            SourceType::Glb => &self.glb_requests,
            SourceType::Mml => &self.mml_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// `count` remote resources were downloaded.
    pub fn record_fetches(&self, count: u64) {
        self.resources_fetched.fetch_add(count, Ordering::Relaxed);
    }

    /// A merge job completed successfully.
    pub fn record_merge(&self) {
        self.merges_performed.fetch_add(1, Ordering::Relaxed);
    }

    /// A request produced `output_bytes` of VRM in `duration`.
    pub fn record_success(&self, duration: Duration, output_bytes: u64) {
        self.requests_succeeded.fetch_add(1, Ordering::Relaxed);
        self.bytes_produced
            .fetch_add(output_bytes, Ordering::Relaxed);
        self.add_duration_sample(duration);
    }

    /// A request failed with `kind`.
    pub fn record_failure(&self, kind: FailureKind, timed_out: bool) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        match kind {
            FailureKind::Validation | FailureKind::Parse => {
                self.client_failures.fetch_add(1, Ordering::Relaxed);
            }
            FailureKind::Fetch => {
                self.fetch_failures.fetch_add(1, Ordering::Relaxed);
            }
            FailureKind::ProcessLaunch => {
                self.launch_failures.fetch_add(1, Ordering::Relaxed);
            }
            FailureKind::Conversion if timed_out => {
                self.engine_timeouts.fetch_add(1, Ordering::Relaxed);
            }
            FailureKind::Conversion | FailureKind::Cleanup | FailureKind::Internal => {}
        }
    }

    fn add_duration_sample(&self, duration: Duration) {
        if let Ok(mut samples) = self.duration_samples.lock() {
            if samples.len() >= MAX_DURATION_SAMPLES {
                samples.pop_front();
            }
            samples.push_back(duration);
        }
    }

    /// Point-in-time view of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut durations: Vec<Duration> = self
            .duration_samples
            .lock()
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        durations.sort();

        MetricsSnapshot {
            requests_started: self.requests_started.load(Ordering::Relaxed),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            glb_requests: self.glb_requests.load(Ordering::Relaxed),
            mml_requests: self.mml_requests.load(Ordering::Relaxed),
            merges_performed: self.merges_performed.load(Ordering::Relaxed),
            resources_fetched: self.resources_fetched.load(Ordering::Relaxed),
            engine_timeouts: self.engine_timeouts.load(Ordering::Relaxed),
            launch_failures: self.launch_failures.load(Ordering::Relaxed),
            client_failures: self.client_failures.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            bytes_produced: self.bytes_produced.load(Ordering::Relaxed),
            duration_p50_ms: percentile_ms(&durations, 50),
            duration_p95_ms: percentile_ms(&durations, 95),
            duration_p99_ms: percentile_ms(&durations, 99),
            sample_count: durations.len() as u64,
        }
    }
}

/// Nearest-rank percentile of already sorted samples, in milliseconds.
fn percentile_ms(sorted: &[Duration], pct: usize) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (sorted.len() * pct).div_ceil(100).max(1);
    sorted
        .get(rank - 1)
        .map(|d| d.as_millis() as u64)
}

/// A point-in-time snapshot of pipeline metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Requests that entered the pipeline.
    pub requests_started: u64,
    /// Requests that produced a VRM.
    pub requests_succeeded: u64,
    /// Requests that ended in an error.
    pub requests_failed: u64,
    /// Requests whose source resolved to a GLB.
    pub glb_requests: u64,
    /// Requests whose source resolved to a manifest.
    pub mml_requests: u64,
    /// Successful merge jobs.
    pub merges_performed: u64,
    /// Remote resources downloaded.
    pub resources_fetched: u64,
    /// Engine invocations killed on timeout.
    pub engine_timeouts: u64,
    /// Engine launch failures.
    pub launch_failures: u64,
    /// Validation and parse failures.
    pub client_failures: u64,
    /// Fetch failures.
    pub fetch_failures: u64,
    /// Total VRM bytes returned.
    pub bytes_produced: u64,
    /// P50 request duration.
    pub duration_p50_ms: Option<u64>,
    /// P95 request duration.
    pub duration_p95_ms: Option<u64>,
    /// P99 request duration.
    pub duration_p99_ms: Option<u64>,
    /// Number of duration samples behind the percentiles.
    pub sample_count: u64,
}
