//! HTTP handlers for the operational surface of the daemon.
//!
//! The webhook endpoint itself lives in [`crate::webhook::handler`]; this
//! module covers everything an operator points a probe or scraper at.

pub mod status;

pub use status::{
    metrics_handler, ops_router, status_handler, AppState, CounterSnapshot, HealthResponse,
    LatencyHistogram, LatencyMetrics, MemoryMetrics, StatusResponse,
};
