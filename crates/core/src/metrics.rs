//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Catalog requests (count and duration per operation)
//! - Offline fallbacks to the local library
//! - Write-behind jobs
//! - Library writes

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Remote Catalog
// =============================================================================

/// Catalog requests by operation and result.
pub static REMOTE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "anitrack_remote_requests_total",
            "Total requests to the remote catalog",
        ),
        &["operation", "result"], // result: "success", "error"
    )
    .unwrap()
});

/// Catalog request duration in seconds.
pub static REMOTE_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "anitrack_remote_request_duration_seconds",
            "Duration of remote catalog requests",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"],
    )
    .unwrap()
});

/// Reads served from the local library because the catalog failed.
pub static LOCAL_FALLBACKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "anitrack_local_fallbacks_total",
            "Catalog reads answered from the local library",
        ),
        &["operation"], // "load_anime", "load_episodes"
    )
    .unwrap()
});

// =============================================================================
// Library
// =============================================================================

/// Write-behind jobs by result.
pub static WRITEBACK_JOBS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "anitrack_writeback_jobs_total",
            "Background persistence jobs processed",
        ),
        &["result"], // "persisted", "failed"
    )
    .unwrap()
});

/// Library writes issued by the tracker.
pub static STORE_OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "anitrack_store_operations_total",
            "Library write operations",
        ),
        &["operation", "result"],
    )
    .unwrap()
});

/// `"success"` or `"error"`.
pub fn result_label<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() {
        "success"
    } else {
        "error"
    }
}

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(REMOTE_REQUESTS.clone()),
        Box::new(REMOTE_REQUEST_DURATION.clone()),
        Box::new(LOCAL_FALLBACKS.clone()),
        Box::new(WRITEBACK_JOBS.clone()),
        Box::new(STORE_OPERATIONS.clone()),
    ]
}
