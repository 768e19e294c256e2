//! # Internal Metrics
//!
//! Prometheus metrics for the bridge, exposed at `/metrics` on the main
//! listener (see `server.rs`).
//!
//! - **`MetricsBuilder`**: builds the Prometheus recorder, installs it as the
//!   global recorder and hands back the handle used to render the scrape.
//! - The free functions below are the only places metric names appear.
//!
//! Installing the recorder twice in one process (as the integration tests do)
//! is logged and otherwise ignored; metric updates then go to the first
//! recorder.

use metrics::Unit;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

const BUILD_INFO: &str = "alertmanager_matrix_build_info";
const RELOAD_SUCCESSFUL: &str = "alertmanager_matrix_config_last_reload_successful";
const RELOAD_SUCCESS_TIMESTAMP: &str =
    "alertmanager_matrix_config_last_reload_success_timestamp_seconds";
const NOTIFICATIONS_TOTAL: &str = "alertmanager_matrix_notifications_total";
const DELIVERY_DURATION: &str = "alertmanager_matrix_delivery_duration_seconds";

/// Outcome label values for [`record_notification`].
pub mod outcome {
    pub const DELIVERED: &str = "delivered";
    pub const BAD_REQUEST: &str = "bad_request";
    pub const RENDER_ERROR: &str = "render_error";
    pub const DELIVERY_ERROR: &str = "delivery_error";
}

/// Builder for the metrics system.
#[derive(Default)]
pub struct MetricsBuilder;

impl MetricsBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Installs the Prometheus recorder and returns the handle that renders it.
    pub fn build(self) -> PrometheusHandle {
        let builder = PrometheusBuilder::new();
        let builder = match builder.set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        ) {
            Ok(builder) => builder,
            Err(e) => {
                warn!(error = %e, "Invalid histogram buckets, using summaries");
                PrometheusBuilder::new()
            }
        };
        let recorder = builder.build_recorder();
        let handle = recorder.handle();

        if let Err(e) = metrics::set_global_recorder(recorder) {
            warn!(error = %e, "Prometheus recorder already installed");
        }

        describe();
        metrics::gauge!(BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
        handle
    }
}

fn describe() {
    metrics::describe_gauge!(
        BUILD_INFO,
        "A metric with a constant '1' value labeled by version"
    );
    metrics::describe_gauge!(
        RELOAD_SUCCESSFUL,
        "Matrix Alertmanager config loaded successfully."
    );
    metrics::describe_gauge!(
        RELOAD_SUCCESS_TIMESTAMP,
        Unit::Seconds,
        "Timestamp of the last successful configuration reload."
    );
    metrics::describe_counter!(
        NOTIFICATIONS_TOTAL,
        Unit::Count,
        "Webhook notifications handled, labeled by outcome."
    );
    metrics::describe_histogram!(
        DELIVERY_DURATION,
        Unit::Seconds,
        "Latency of message sends to the homeserver."
    );
}

/// Records the outcome of a configuration load.
pub fn record_config_reload(success: bool) {
    metrics::gauge!(RELOAD_SUCCESSFUL).set(if success { 1.0 } else { 0.0 });
    if success {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        metrics::gauge!(RELOAD_SUCCESS_TIMESTAMP).set(now);
    }
}

/// Counts one handled webhook notification.
pub fn record_notification(outcome: &'static str) {
    metrics::counter!(NOTIFICATIONS_TOTAL, "outcome" => outcome).increment(1);
}

/// Records how long a send to the homeserver took.
pub fn record_delivery_duration(elapsed: Duration) {
    metrics::histogram!(DELIVERY_DURATION).record(elapsed);
}
