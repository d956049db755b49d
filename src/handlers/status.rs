//! Status and health check handlers for the Civipay webhook daemon.
//!
//! This module provides HTTP endpoints for monitoring service health and
//! webhook throughput:
//! - `/status` - Detailed service status with runtime metrics
//! - `/health` - Simple health check for systemd/load balancers
//! - `/ready` - Readiness probe
//! - `/metrics` - Prometheus text format export
//!
//! # Architecture
//!
//! ```text
//! HTTP Request ──> Axum Router ──> status_handler ──> AppState
//!                                        │                │
//!                                        ▼                ▼
//!                              StatusResponse    LatencyHistogram
//!                                        │         + Counters
//!                                        ▼
//!                                   JSON Response
//! ```
//!
//! # Example Response
//!
//! ```json
//! {
//!   "version": "0.1.0",
//!   "uptime_seconds": 3600,
//!   "events": {
//!     "received": 1024,
//!     "processed": 1000,
//!     "duplicates": 20
//!   },
//!   "memory": { "rss_bytes": 52428800 },
//!   "latency": { "p50_ms": 1.2, "p95_ms": 4.5, "p99_ms": 9.8 }
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, instrument};

use crate::reconcile::ReconcileOutcome;

/// Server version from Cargo.toml
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server name from Cargo.toml
pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");

// ============================================================================
// Response Types
// ============================================================================

/// Health check response for simple liveness probes.
///
/// Used by systemd, Kubernetes, and load balancers to verify the service is
/// running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status (always "healthy" if responding)
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

/// Detailed service status response with runtime metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Service version (from Cargo.toml)
    pub version: String,

    /// Service name
    pub name: String,

    /// Service uptime in seconds
    pub uptime_seconds: u64,

    /// Webhook pipeline counters
    pub events: CounterSnapshot,

    /// Memory usage metrics
    pub memory: MemoryMetrics,

    /// Request latency statistics (percentiles)
    pub latency: LatencyMetrics,

    /// Service status (always "running" if responding)
    pub status: String,

    /// ISO8601 timestamp of when status was generated
    pub timestamp: String,
}

/// Point-in-time view of the webhook pipeline counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Deliveries received, before any verification
    pub received: u64,
    /// Events fully reconciled (including lifecycle no-ops)
    pub processed: u64,
    /// Known-but-unhandled event types acknowledged
    pub ignored: u64,
    /// Redeliveries skipped by the idempotency check
    pub duplicates: u64,
    /// Deliveries rejected for signature problems
    pub signature_failures: u64,
    /// Deliveries rejected for unparseable payloads
    pub invalid_payloads: u64,
    /// Reconciliation failures returned as 500s
    pub processing_failures: u64,
    /// Donation records written
    pub donations_recorded: u64,
    /// Purchase records written
    pub purchases_recorded: u64,
    /// Membership records created
    pub memberships_recorded: u64,
    /// Membership records updated in place
    pub memberships_updated: u64,
}

/// Memory usage metrics collected from sysinfo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Resident Set Size - actual physical memory used (bytes)
    pub rss_bytes: u64,

    /// Virtual memory size (bytes)
    pub virtual_bytes: u64,

    /// CPU usage percentage (0.0 - 100.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f32>,
}

/// Request latency percentile metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyMetrics {
    /// 50th percentile (median) latency in milliseconds
    pub p50_ms: f64,

    /// 95th percentile latency in milliseconds
    pub p95_ms: f64,

    /// 99th percentile latency in milliseconds
    pub p99_ms: f64,

    /// Total number of requests recorded
    pub total_requests: u64,

    /// Mean latency in milliseconds
    pub mean_ms: f64,

    /// Maximum latency recorded in milliseconds
    pub max_ms: f64,
}

impl Default for LatencyMetrics {
    fn default() -> Self {
        Self {
            p50_ms: 0.0,
            p95_ms: 0.0,
            p99_ms: 0.0,
            total_requests: 0,
            mean_ms: 0.0,
            max_ms: 0.0,
        }
    }
}

// ============================================================================
// Latency Histogram
// ============================================================================

/// Thread-safe latency histogram for recording request timings.
///
/// Uses HdrHistogram for efficient percentile calculations with minimal
/// memory. Tracks latencies from 1 microsecond to 60 seconds with 3
/// significant figures of precision.
#[derive(Debug)]
pub struct LatencyHistogram {
    /// The underlying HdrHistogram wrapped in RwLock for thread safety
    inner: RwLock<Histogram<u64>>,
}

impl LatencyHistogram {
    /// Create a new latency histogram.
    pub fn new() -> Self {
        // Track 1us to 60 seconds with 3 significant figures
        let histogram =
            Histogram::new_with_bounds(1, 60_000_000, 3).expect("Failed to create histogram");
        Self {
            inner: RwLock::new(histogram),
        }
    }

    /// Record a latency value in microseconds.
    ///
    /// Values outside the histogram bounds are silently ignored.
    pub fn record(&self, latency_us: u64) {
        let mut hist = self.inner.write();
        // Ignore errors from values outside bounds
        let _ = hist.record(latency_us);
    }

    /// Record a latency duration.
    pub fn record_duration(&self, duration: std::time::Duration) {
        self.record(duration.as_micros() as u64);
    }

    /// Get a percentile value in microseconds.
    pub fn percentile(&self, percentile: f64) -> u64 {
        let hist = self.inner.read();
        hist.value_at_percentile(percentile)
    }

    /// Get the total count of recorded values.
    pub fn count(&self) -> u64 {
        let hist = self.inner.read();
        hist.len()
    }

    /// Get complete latency metrics in milliseconds.
    pub fn metrics(&self) -> LatencyMetrics {
        let hist = self.inner.read();
        LatencyMetrics {
            p50_ms: hist.value_at_percentile(50.0) as f64 / 1000.0,
            p95_ms: hist.value_at_percentile(95.0) as f64 / 1000.0,
            p99_ms: hist.value_at_percentile(99.0) as f64 / 1000.0,
            total_requests: hist.len(),
            mean_ms: hist.mean() / 1000.0,
            max_ms: hist.max() as f64 / 1000.0,
        }
    }

    /// Reset the histogram, clearing all recorded values.
    pub fn reset(&self) {
        let mut hist = self.inner.write();
        hist.reset();
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Shared state for metrics and status tracking.
///
/// All fields are thread-safe and can be accessed concurrently: counters are
/// `AtomicU64` for lock-free increments, the latency histogram sits behind an
/// `RwLock`, and the start time is immutable after creation.
#[derive(Debug)]
pub struct AppState {
    /// Service start time for uptime calculation
    start_time: Instant,

    received: AtomicU64,
    processed: AtomicU64,
    ignored: AtomicU64,
    duplicates: AtomicU64,
    signature_failures: AtomicU64,
    invalid_payloads: AtomicU64,
    processing_failures: AtomicU64,
    donations_recorded: AtomicU64,
    purchases_recorded: AtomicU64,
    memberships_recorded: AtomicU64,
    memberships_updated: AtomicU64,

    /// Request latency histogram for percentile calculations
    latency_histogram: LatencyHistogram,
}

impl AppState {
    /// Create a new AppState with zeroed counters.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            received: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            signature_failures: AtomicU64::new(0),
            invalid_payloads: AtomicU64::new(0),
            processing_failures: AtomicU64::new(0),
            donations_recorded: AtomicU64::new(0),
            purchases_recorded: AtomicU64::new(0),
            memberships_recorded: AtomicU64::new(0),
            memberships_updated: AtomicU64::new(0),
            latency_histogram: LatencyHistogram::new(),
        }
    }

    /// Get the service uptime in seconds.
    #[inline]
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Count a delivery hitting the endpoint.
    #[inline]
    pub fn record_event_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a duplicate delivery skipped by the idempotency check.
    #[inline]
    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a signature rejection.
    #[inline]
    pub fn record_signature_failure(&self) {
        self.signature_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an unparseable payload rejection.
    #[inline]
    pub fn record_invalid_payload(&self) {
        self.invalid_payloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a reconciliation failure.
    #[inline]
    pub fn record_processing_failure(&self) {
        self.processing_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a completed reconciliation by its outcome.
    pub fn record_outcome(&self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Ignored => {
                self.ignored.fetch_add(1, Ordering::Relaxed);
                return;
            }
            ReconcileOutcome::Noop => {}
            ReconcileOutcome::DonationRecorded => {
                self.donations_recorded.fetch_add(1, Ordering::Relaxed);
            }
            ReconcileOutcome::PurchaseRecorded => {
                self.purchases_recorded.fetch_add(1, Ordering::Relaxed);
            }
            ReconcileOutcome::MembershipRecorded => {
                self.memberships_recorded.fetch_add(1, Ordering::Relaxed);
            }
            ReconcileOutcome::MembershipUpdated => {
                self.memberships_updated.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request latency duration.
    #[inline]
    pub fn record_latency(&self, duration: std::time::Duration) {
        self.latency_histogram.record_duration(duration);
    }

    /// Record a request latency in microseconds.
    #[inline]
    pub fn record_latency_us(&self, latency_us: u64) {
        self.latency_histogram.record(latency_us);
    }

    /// Get the latency metrics.
    #[inline]
    pub fn latency_metrics(&self) -> LatencyMetrics {
        self.latency_histogram.metrics()
    }

    /// Snapshot all pipeline counters.
    pub fn counters(&self) -> CounterSnapshot {
        CounterSnapshot {
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            signature_failures: self.signature_failures.load(Ordering::Relaxed),
            invalid_payloads: self.invalid_payloads.load(Ordering::Relaxed),
            processing_failures: self.processing_failures.load(Ordering::Relaxed),
            donations_recorded: self.donations_recorded.load(Ordering::Relaxed),
            purchases_recorded: self.purchases_recorded.load(Ordering::Relaxed),
            memberships_recorded: self.memberships_recorded.load(Ordering::Relaxed),
            memberships_updated: self.memberships_updated.load(Ordering::Relaxed),
        }
    }

    /// Convert current counters and latencies to Prometheus text format.
    pub fn to_prometheus_format(&self) -> String {
        let counters = self.counters();
        let mut output = String::new();

        // Counters
        output.push_str(&format!(
            "civipay_events_received_total {}\n",
            counters.received
        ));
        output.push_str(&format!(
            "civipay_events_processed_total {}\n",
            counters.processed
        ));
        output.push_str(&format!(
            "civipay_events_ignored_total {}\n",
            counters.ignored
        ));
        output.push_str(&format!(
            "civipay_events_duplicate_total {}\n",
            counters.duplicates
        ));
        output.push_str(&format!(
            "civipay_signature_failures_total {}\n",
            counters.signature_failures
        ));
        output.push_str(&format!(
            "civipay_invalid_payloads_total {}\n",
            counters.invalid_payloads
        ));
        output.push_str(&format!(
            "civipay_processing_failures_total {}\n",
            counters.processing_failures
        ));
        output.push_str(&format!(
            "civipay_donations_recorded_total {}\n",
            counters.donations_recorded
        ));
        output.push_str(&format!(
            "civipay_purchases_recorded_total {}\n",
            counters.purchases_recorded
        ));
        output.push_str(&format!(
            "civipay_memberships_recorded_total {}\n",
            counters.memberships_recorded
        ));
        output.push_str(&format!(
            "civipay_memberships_updated_total {}\n",
            counters.memberships_updated
        ));

        // Latency percentiles
        let latency = self.latency_metrics();
        if latency.total_requests > 0 {
            output.push_str(&format!(
                "civipay_request_duration_p50_ms {}\n",
                latency.p50_ms
            ));
            output.push_str(&format!(
                "civipay_request_duration_p95_ms {}\n",
                latency.p95_ms
            ));
            output.push_str(&format!(
                "civipay_request_duration_p99_ms {}\n",
                latency.p99_ms
            ));
        }

        output.push_str(&format!(
            "civipay_uptime_seconds {}\n",
            self.uptime_seconds()
        ));

        output
    }

    /// Reset all metrics (useful for testing).
    pub fn reset_metrics(&self) {
        self.received.store(0, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
        self.ignored.store(0, Ordering::Relaxed);
        self.duplicates.store(0, Ordering::Relaxed);
        self.signature_failures.store(0, Ordering::Relaxed);
        self.invalid_payloads.store(0, Ordering::Relaxed);
        self.processing_failures.store(0, Ordering::Relaxed);
        self.donations_recorded.store(0, Ordering::Relaxed);
        self.purchases_recorded.store(0, Ordering::Relaxed);
        self.memberships_recorded.store(0, Ordering::Relaxed);
        self.memberships_updated.store(0, Ordering::Relaxed);
        self.latency_histogram.reset();
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// System Metrics Collection
// ============================================================================

/// Collect memory metrics for the current process using sysinfo.
///
/// If the process cannot be found, returns default (zero) values.
fn collect_memory_metrics() -> MemoryMetrics {
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();

    // sysinfo 0.33 API: refresh_processes with ProcessesToUpdate
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    match system.process(pid) {
        Some(process) => MemoryMetrics {
            rss_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
            cpu_percent: None, // CPU requires multiple samples, skip for status
        },
        None => {
            debug!("Could not find current process in sysinfo");
            MemoryMetrics::default()
        }
    }
}

// ============================================================================
// HTTP Handlers
// ============================================================================

/// Health check endpoint handler.
///
/// # Route
/// `GET /health`
///
/// # Response
/// - `200 OK` - Always, if the service is running
#[instrument(skip_all)]
pub async fn health_handler() -> impl IntoResponse {
    debug!("Health check requested");
    (StatusCode::OK, Json(HealthResponse::default()))
}

/// Detailed status endpoint handler.
///
/// Returns version, uptime, webhook pipeline counters, memory usage, and
/// request latency percentiles.
///
/// # Route
/// `GET /status`
#[instrument(skip_all)]
pub async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Status check requested");

    let memory = collect_memory_metrics();
    let latency = state.latency_metrics();

    let response = StatusResponse {
        version: SERVER_VERSION.to_string(),
        name: SERVER_NAME.to_string(),
        uptime_seconds: state.uptime_seconds(),
        events: state.counters(),
        memory,
        latency,
        status: "running".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}

/// Readiness check endpoint handler.
///
/// Mirrors the health check; the daemon has no external dependencies that
/// warm up after boot.
///
/// # Route
/// `GET /ready`
#[instrument(skip_all)]
pub async fn readiness_handler() -> impl IntoResponse {
    debug!("Readiness check requested");
    (StatusCode::OK, Json(HealthResponse::default()))
}

/// Prometheus metrics endpoint handler.
///
/// # Route
/// `GET /metrics`
#[instrument(skip_all)]
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.to_prometheus_format(),
    )
}

// ============================================================================
// Router Setup
// ============================================================================

/// Create the ops router with all health, status, and metrics endpoints.
///
/// # Routes
/// - `GET /health` - Simple health check
/// - `GET /status` - Detailed status with metrics
/// - `GET /ready` - Readiness probe
/// - `GET /metrics` - Prometheus text format
pub fn ops_router(state: Arc<AppState>) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/ready", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// ============================================================================
// Tests
// ============================================================================
