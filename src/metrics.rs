use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and describe the viewer series.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        router(self.handle.clone())
    }
}

pub fn router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let h = handle.clone();
            async move { h.render() }
        }),
    )
}

fn describe() {
    describe_counter!("viewer_refresh_total", "Refresh cycles run");
    describe_counter!("viewer_refresh_errors_total", "Refresh cycles that failed");
    describe_counter!(
        "viewer_feed_filtered_total",
        "Low-signal observations dropped from the feed"
    );
    describe_counter!("viewer_load_more_errors_total", "Failed next-page loads");
    describe_gauge!("viewer_feed_items", "Items currently held by the feed");
    describe_gauge!("viewer_health_risk_score", "Latest weighted health risk score");
}
