//! Prometheus metrics for observability.
//!
//! HTTP request metrics live here; catalog, write-behind and library
//! metrics come from `anitrack_core::metrics` and are registered alongside.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "anitrack_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("anitrack_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "anitrack_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Library Metrics (collected dynamically)
// =============================================================================

/// Library row counts by table.
pub static LIBRARY_ROWS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("anitrack_library_rows", "Rows in the local library by table"),
        &["table"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Library
    registry.register(Box::new(LIBRARY_ROWS.clone())).unwrap();

    // Core metrics (catalog, write-behind, store)
    for metric in anitrack_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Refresh the library gauges before encoding.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    if let Ok(stats) = state.tracker().stats() {
        for (table, count) in [
            ("animes", stats.animes),
            ("episodes", stats.episodes),
            ("user_collection", stats.collection_entries),
            ("watched_episodes", stats.watched_episodes),
            ("watchlist", stats.watchlist_entries),
        ] {
            LIBRARY_ROWS.with_label_values(&[table]).set(count as i64);
        }
    }
}

/// Normalize a path for metric labels.
///
/// Everything after a known collection segment is an identifier, so
/// `/api/v1/anime/42/episodes/abc` becomes `/api/v1/anime/{id}/episodes/{id}`.
pub fn normalize_path(path: &str) -> String {
    const ID_PARENTS: [&str; 3] = ["anime", "episodes", "collection"];

    let mut previous = "";
    let segments: Vec<&str> = path
        .split('/')
        .map(|segment| {
            let normalized = if ID_PARENTS.contains(&previous) && !is_route_word(segment) {
                "{id}"
            } else {
                segment
            };
            previous = segment;
            normalized
        })
        .collect();
    segments.join("/")
}

/// Literal segments that may follow an id parent.
fn is_route_word(segment: &str) -> bool {
    matches!(segment, "" | "watched" | "watchlist" | "episodes")
}
