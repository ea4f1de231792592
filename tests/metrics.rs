// tests/metrics.rs
//
// One test per binary: the Prometheus recorder is process-global.

mod common;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use codemem_viewer::metrics::Metrics;
use codemem_viewer::{app, ViewerConfig};

use common::{low_signal, obs, page, FakeApi};

#[tokio::test]
async fn metrics_endpoint_exposes_viewer_series() {
    let metrics = Metrics::init().expect("install recorder");

    let api = FakeApi::new();
    api.set_memories(
        "",
        0,
        page(
            vec![
                obs(1, "2026-01-10T10:00:00Z", "Indexed the workspace"),
                low_signal(2, "2026-01-10T11:00:00Z"),
            ],
            None,
            None,
        ),
    );
    let cfg = ViewerConfig {
        prefs_path: None,
        ..Default::default()
    };
    let (router, dashboard, _paused_rx) = app(&cfg, api, Some(&metrics));
    dashboard.refresh().await.expect("refresh");

    let resp = router
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "viewer_refresh_total",
        "viewer_feed_filtered_total",
        "viewer_feed_items",
        "viewer_health_risk_score",
    ] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }

    // the standalone router serves the same handle
    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
