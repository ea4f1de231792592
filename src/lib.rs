// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod client;
pub mod config;
pub mod format;
pub mod metrics;
pub mod prefs;
pub mod refresh;
pub mod settings;
pub mod sync;

// Feed aggregation and health scoring
pub mod feed;
pub mod health;

// Editor plugin helpers
pub mod plugin;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::client::{HttpViewerApi, ViewerApi};
pub use crate::config::ViewerConfig;
pub use crate::refresh::{run_polling, Dashboard};

use std::sync::Arc;

use axum::Router;
use tokio::sync::watch;

use crate::prefs::PrefsStore;

/// Builds the dashboard and router for `cfg`, without starting the poller.
///
/// The returned receiver follows `POST /api/polling`; hand it to [`run_polling`].
pub fn app(
    cfg: &ViewerConfig,
    api: Arc<dyn ViewerApi>,
    metrics: Option<&crate::metrics::Metrics>,
) -> (Router, Arc<Dashboard>, watch::Receiver<bool>) {
    let prefs = match &cfg.prefs_path {
        Some(path) => PrefsStore::open(path),
        None => PrefsStore::in_memory(),
    };
    let dashboard = Arc::new(Dashboard::new(api, Arc::new(prefs)));
    dashboard.set_project(&cfg.project);

    let (paused_tx, paused_rx) = watch::channel(false);
    let mut state = AppState::new(dashboard.clone(), paused_tx);
    if let Some(m) = metrics {
        state = state.with_metrics(m.handle.clone());
    }
    (create_router(state), dashboard, paused_rx)
}
