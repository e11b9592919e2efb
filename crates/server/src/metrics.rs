//! Prometheus metrics
//!
//! Installs the global recorder; counters and histograms are emitted at
//! their call sites throughout the workspace (`echoai_*`).

use axum::extract::State;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;

/// Install the Prometheus recorder. Call once at startup, before any
/// metric is emitted.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_ms".to_string()),
            &[
                5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
            ],
        )?
        .install_recorder()
}

/// `GET /metrics`
pub async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}
