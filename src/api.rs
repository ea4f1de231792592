use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::feed::store::NextPageOutcome;
use crate::feed::view::{feed_meta_line, view_signature, visible_items, FeedCard, FeedFilter, RenderCache};
use crate::health::HealthOverview;
use crate::prefs::{ALL_KEYS, THEME_KEY};
use crate::refresh::{Dashboard, DashboardSnapshot, PrefsView, RefreshOutcome};
use crate::settings::{SettingsForm, SettingsView};

#[derive(Clone)]
pub struct AppState {
    dashboard: Arc<Dashboard>,
    paused_tx: Arc<watch::Sender<bool>>,
    render: Arc<Mutex<RenderCache>>,
    metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(dashboard: Arc<Dashboard>, paused_tx: watch::Sender<bool>) -> Self {
        Self {
            dashboard,
            paused_tx: Arc::new(paused_tx),
            render: Arc::new(Mutex::new(RenderCache::default())),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn dashboard(&self) -> &Arc<Dashboard> {
        &self.dashboard
    }
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn upstream(e: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::BAD_GATEWAY, format!("{e:#}"))
}

pub fn create_router(state: AppState) -> Router {
    let metrics = state.metrics.clone();
    let router = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/dashboard", get(dashboard))
        .route("/api/feed", get(feed))
        .route("/api/feed/more", post(feed_more))
        .route("/api/feed/seen", post(feed_seen))
        .route("/api/health-report", get(health_report))
        .route("/api/refresh", post(refresh))
        .route("/api/project", post(select_project))
        .route("/api/polling", post(polling))
        .route("/api/settings", get(settings).post(save_settings))
        .route("/api/sync/run", post(sync_run))
        .route("/api/prefs", get(prefs).post(update_prefs))
        .layer(CorsLayer::very_permissive())
        .with_state(state);
    match metrics {
        Some(handle) => router.merge(crate::metrics::router(handle)),
        None => router,
    }
}

async fn dashboard(State(state): State<AppState>) -> Json<DashboardSnapshot> {
    Json(state.dashboard.snapshot())
}

#[derive(Debug, Default, Deserialize)]
struct FeedQuery {
    #[serde(rename = "type")]
    filter: Option<String>,
    #[serde(default)]
    q: String,
}

#[derive(Debug, Serialize)]
struct FeedResponse {
    filter: FeedFilter,
    query: String,
    meta: String,
    signature: String,
    changed: bool,
    has_more: bool,
    loading_more: bool,
    cards: Vec<FeedCard>,
}

/// Read-only: `type` overrides the saved filter for this response only, and
/// new-item flags stay set until acknowledged through `POST /api/feed/seen`.
async fn feed(State(state): State<AppState>, Query(params): Query<FeedQuery>) -> Json<FeedResponse> {
    let dash = &state.dashboard;
    let filter = match params.filter.as_deref() {
        Some(raw) => FeedFilter::parse(raw),
        None => dash.prefs().feed_filter(),
    };
    let query = params.q.trim().to_string();

    let store = dash.feed();
    let snapshot = store.snapshot();
    let fresh = &snapshot.new_keys;
    let visible = visible_items(&snapshot.items, filter, &query);
    let signature = view_signature(filter, &snapshot.project, &visible);
    let changed = state.render.lock().changed(&signature);

    let now = Utc::now();
    let cards = visible
        .iter()
        .map(|item| {
            let key = item.key();
            FeedCard::build(item, fresh.contains(&key), now)
        })
        .collect();

    Json(FeedResponse {
        meta: feed_meta_line(
            visible.len(),
            filter,
            &query,
            snapshot.filtered_count,
            snapshot.has_more,
        ),
        filter,
        query,
        signature,
        changed,
        has_more: snapshot.has_more,
        loading_more: store.is_loading_more(),
        cards,
    })
}

#[derive(Debug, Serialize)]
struct MoreResponse {
    outcome: &'static str,
    new_items: usize,
    has_more: bool,
}

async fn feed_more(State(state): State<AppState>) -> Json<MoreResponse> {
    let (outcome, new_items) = match state.dashboard.load_more().await {
        NextPageOutcome::Applied { new_items } => ("applied", new_items),
        NextPageOutcome::Skipped => ("skipped", 0),
        NextPageOutcome::Stale => ("stale", 0),
        NextPageOutcome::Failed => ("failed", 0),
    };
    Json(MoreResponse {
        outcome,
        new_items,
        has_more: state.dashboard.feed().has_more(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct SeenReq {
    /// Absent means every currently new key.
    #[serde(default)]
    keys: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct SeenResponse {
    cleared: usize,
}

async fn feed_seen(State(state): State<AppState>, body: Bytes) -> ApiResult<SeenResponse> {
    let req: SeenReq = if body.is_empty() {
        SeenReq::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    };
    let store = state.dashboard.feed();
    let cleared = match req.keys {
        Some(keys) => store.acknowledge_new_keys(keys.as_slice()),
        None => store.take_new_keys().len(),
    };
    Ok(Json(SeenResponse { cleared }))
}

async fn health_report(State(state): State<AppState>) -> ApiResult<HealthOverview> {
    state
        .dashboard
        .health()
        .map(Json)
        .ok_or((StatusCode::SERVICE_UNAVAILABLE, "no refresh has completed yet".to_string()))
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    queued: bool,
    snapshot: DashboardSnapshot,
}

async fn refresh(State(state): State<AppState>) -> ApiResult<RefreshResponse> {
    let outcome = state.dashboard.refresh().await.map_err(upstream)?;
    Ok(Json(RefreshResponse {
        queued: outcome == RefreshOutcome::Queued,
        snapshot: state.dashboard.snapshot(),
    }))
}

#[derive(Debug, Deserialize)]
struct ProjectReq {
    #[serde(default)]
    project: String,
}

async fn select_project(State(state): State<AppState>, Json(body): Json<ProjectReq>) -> Json<DashboardSnapshot> {
    let dash = &state.dashboard;
    if dash.set_project(body.project.trim()) {
        if let Err(e) = dash.refresh().await {
            warn!("refresh after project change failed: {e:#}");
        }
    }
    Json(dash.snapshot())
}

#[derive(Debug, Serialize, Deserialize)]
struct PollingReq {
    paused: bool,
}

async fn polling(State(state): State<AppState>, Json(body): Json<PollingReq>) -> Json<PollingReq> {
    state.paused_tx.send_replace(body.paused);
    state.dashboard.set_paused(body.paused);
    Json(PollingReq {
        paused: state.dashboard.is_paused(),
    })
}

async fn settings(State(state): State<AppState>) -> ApiResult<SettingsView> {
    state
        .dashboard
        .settings()
        .map(Json)
        .ok_or((StatusCode::SERVICE_UNAVAILABLE, "config not loaded".to_string()))
}

async fn save_settings(State(state): State<AppState>, Json(form): Json<SettingsForm>) -> ApiResult<Option<SettingsView>> {
    state.dashboard.save_settings(&form).await.map_err(upstream)?;
    Ok(Json(state.dashboard.settings()))
}

#[derive(Debug, Default, Deserialize)]
struct SyncRunReq {
    #[serde(default)]
    address: Option<String>,
}

async fn sync_run(State(state): State<AppState>, body: Bytes) -> ApiResult<DashboardSnapshot> {
    // empty body means "sync with every peer"
    let req: SyncRunReq = if body.is_empty() {
        SyncRunReq::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    };
    let address = req.address.as_deref().map(str::trim).filter(|a| !a.is_empty());
    state.dashboard.trigger_sync(address).await.map_err(upstream)?;
    Ok(Json(state.dashboard.snapshot()))
}

async fn prefs(State(state): State<AppState>) -> Json<PrefsView> {
    Json(PrefsView::read(state.dashboard.prefs()))
}

async fn update_prefs(
    State(state): State<AppState>,
    Json(body): Json<BTreeMap<String, String>>,
) -> ApiResult<PrefsView> {
    if let Some(unknown) = body.keys().find(|k| !ALL_KEYS.contains(&k.as_str())) {
        return Err((StatusCode::BAD_REQUEST, format!("unknown preference: {unknown}")));
    }
    let prefs = state.dashboard.prefs();
    for (key, value) in &body {
        if key == THEME_KEY {
            prefs.set_theme(value);
        } else {
            prefs.set(key, value);
        }
    }
    Ok(Json(PrefsView::read(prefs)))
}
