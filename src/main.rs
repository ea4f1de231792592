//! codemem viewer binary entrypoint.
//! Polls the codemem backend and serves the derived dashboard over Axum.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use codemem_viewer::metrics::Metrics;
use codemem_viewer::{app, run_polling, HttpViewerApi, ViewerApi, ViewerConfig};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("codemem_viewer=info,warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present; missing file is fine.
    let _ = dotenvy::dotenv();

    let cfg = ViewerConfig::load_default().context("loading viewer config")?;
    init_tracing(cfg.log_json);

    let metrics = if cfg.metrics {
        match Metrics::init() {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("metrics disabled: {e:#}");
                None
            }
        }
    } else {
        None
    };

    let api: Arc<dyn ViewerApi> = Arc::new(HttpViewerApi::new(cfg.base_url.clone()));
    let (router, dashboard, paused_rx) = app(&cfg, api, metrics.as_ref());

    tokio::spawn(run_polling(dashboard, cfg.poll_interval(), paused_rx));

    let listener = tokio::net::TcpListener::bind(&cfg.listen)
        .await
        .with_context(|| format!("binding {}", cfg.listen))?;
    info!(listen = %cfg.listen, backend = %cfg.base_url, "codemem viewer ready");
    axum::serve(listener, router).await.context("serving viewer api")?;
    Ok(())
}
