use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests served. Labels: route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "cowork_http_requests_total";

/// Histogram: HTTP handler latency in seconds. Labels: route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "cowork_http_request_duration_seconds";

/// Counter: requests rejected by the auth middleware.
pub const AUTH_FAILURES_TOTAL: &str = "cowork_auth_failures_total";

// ── Booking domain ──────────────────────────────────────────────

/// Counter: bookings durably created.
pub const BOOKINGS_CREATED_TOTAL: &str = "cowork_bookings_created_total";

/// Counter: create attempts rejected because the slot was taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "cowork_booking_conflicts_total";

/// Counter: bookings moved to cancelled.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "cowork_bookings_cancelled_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "cowork_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "cowork_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "cowork_wal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op if port is None; a failed
/// install is logged and the service keeps running without metrics.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus exporter on {addr}: {e}"),
    }
}
