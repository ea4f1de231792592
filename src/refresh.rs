//! Refresh cycle.
//!
//! One refresh runs at a time. A request that arrives while one is running
//! queues a single follow-up; further requests fold into that same follow-up.
//! A refresh future dropped mid-flight releases the gate and drops any queued
//! follow-up.
//! The polling loop drives `Dashboard::refresh` on a fixed interval and can be
//! paused through a `watch` channel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::ViewerApi;
use crate::feed::store::{FeedStore, FirstPageOutcome, NextPageOutcome};
use crate::health::HealthOverview;
use crate::prefs::{PrefsStore, Tab};
use crate::settings::{ConfigPayload, SettingsForm, SettingsView};
use crate::sync::{PairingView, SyncStatusPayload, SyncView};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct GateState {
    busy: bool,
    queued: bool,
}

/// Single-flight guard with at most one coalesced follow-up.
#[derive(Debug, Default)]
pub struct RefreshGate {
    inner: Mutex<GateState>,
}

impl RefreshGate {
    /// Claims the gate. When busy, marks a follow-up and returns `None`.
    pub fn try_begin(&self) -> Option<GatePermit<'_>> {
        let mut g = self.inner.lock();
        if g.busy {
            g.queued = true;
            return None;
        }
        g.busy = true;
        Some(GatePermit {
            gate: self,
            released: false,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.inner.lock().busy
    }

    pub fn is_queued(&self) -> bool {
        self.inner.lock().queued
    }
}

/// Held while a refresh runs. Dropping it unfinished frees the gate.
#[derive(Debug)]
pub struct GatePermit<'a> {
    gate: &'a RefreshGate,
    released: bool,
}

impl GatePermit<'_> {
    /// Ends a run. Returns true when a follow-up was queued; the permit then
    /// stays held for the caller's next run.
    pub fn finish(&mut self) -> bool {
        let mut g = self.gate.inner.lock();
        if g.queued {
            g.queued = false;
            return true;
        }
        g.busy = false;
        self.released = true;
        false
    }
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let mut g = self.gate.inner.lock();
        g.busy = false;
        g.queued = false;
    }
}

/// Puts the dashboard back to idle (or paused) if a cycle is abandoned.
struct CycleGuard<'a> {
    cache: &'a Mutex<Cache>,
    armed: bool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut cache = self.cache.lock();
        if cache.state == RefreshState::Refreshing {
            cache.state = if cache.paused {
                RefreshState::Paused
            } else {
                RefreshState::Idle
            };
        }
        debug!("refresh cancelled before completion");
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshState {
    #[default]
    Idle,
    Refreshing,
    Paused,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed,
    /// Another refresh was running; it will run once more when done.
    Queued,
}

/// Payloads and derived views from the last good cycle.
#[derive(Debug, Default)]
struct Cache {
    state: RefreshState,
    paused: bool,
    last_refresh_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    stats: Value,
    usage: Value,
    session: Value,
    raw_events: Value,
    config: Option<ConfigPayload>,
    sync: Option<SyncStatusPayload>,
    sync_view: Option<SyncView>,
    pairing: Option<Value>,
    overview: Option<HealthOverview>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrefsView {
    pub tab: Tab,
    pub feed_filter: String,
    pub theme: String,
    pub sync_diagnostics: bool,
    pub sync_pairing: bool,
    pub sync_redact: bool,
    pub details_open: bool,
}

impl PrefsView {
    pub fn read(prefs: &PrefsStore) -> Self {
        Self {
            tab: prefs.active_tab(),
            feed_filter: prefs.feed_filter().as_str().to_string(),
            theme: prefs.theme(false).id.to_string(),
            sync_diagnostics: prefs.sync_diagnostics_open(),
            sync_pairing: prefs.sync_pairing_open(),
            sync_redact: prefs.sync_redaction_enabled(),
            details_open: prefs.details_open(),
        }
    }
}

/// Everything the local API hands out in one response.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub state: RefreshState,
    pub project: String,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub prefs: PrefsView,
    pub health: Option<HealthOverview>,
    pub sync: SyncView,
    pub pairing: Option<PairingView>,
    pub settings: Option<SettingsView>,
    pub session: Value,
    pub feed_items: usize,
    pub feed_has_more: bool,
    pub feed_filtered: u64,
}

pub struct Dashboard {
    api: Arc<dyn ViewerApi>,
    feed: FeedStore,
    prefs: Arc<PrefsStore>,
    gate: RefreshGate,
    project: Mutex<String>,
    cache: Mutex<Cache>,
}

impl Dashboard {
    pub fn new(api: Arc<dyn ViewerApi>, prefs: Arc<PrefsStore>) -> Self {
        Self {
            feed: FeedStore::new(api.clone()),
            api,
            prefs,
            gate: RefreshGate::default(),
            project: Mutex::new(String::new()),
            cache: Mutex::new(Cache::default()),
        }
    }

    pub fn api(&self) -> &Arc<dyn ViewerApi> {
        &self.api
    }

    pub fn feed(&self) -> &FeedStore {
        &self.feed
    }

    pub fn prefs(&self) -> &PrefsStore {
        &self.prefs
    }

    pub fn project(&self) -> String {
        self.project.lock().clone()
    }

    /// Empty string means all projects. Returns true when it changed.
    pub fn set_project(&self, project: &str) -> bool {
        let mut current = self.project.lock();
        if *current == project {
            return false;
        }
        *current = project.to_string();
        drop(current);
        self.feed.set_project(project);
        info!(project, "project selected");
        true
    }

    pub fn state(&self) -> RefreshState {
        self.cache.lock().state
    }

    pub fn set_paused(&self, paused: bool) {
        let mut cache = self.cache.lock();
        cache.paused = paused;
        if paused {
            cache.state = RefreshState::Paused;
        } else if cache.state == RefreshState::Paused {
            cache.state = RefreshState::Idle;
        }
    }

    pub fn is_paused(&self) -> bool {
        self.cache.lock().paused
    }

    /// Runs one cycle, plus one follow-up if another request arrived meanwhile.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let Some(mut permit) = self.gate.try_begin() else {
            debug!("refresh already running; follow-up queued");
            return Ok(RefreshOutcome::Queued);
        };
        let mut guard = CycleGuard {
            cache: &self.cache,
            armed: true,
        };
        loop {
            self.cache.lock().state = RefreshState::Refreshing;
            let result = self.refresh_once().await;
            counter!("viewer_refresh_total").increment(1);
            {
                let mut cache = self.cache.lock();
                match &result {
                    Ok(()) => {
                        cache.last_error = None;
                        cache.state = if cache.paused {
                            RefreshState::Paused
                        } else {
                            RefreshState::Idle
                        };
                    }
                    Err(e) => {
                        counter!("viewer_refresh_errors_total").increment(1);
                        cache.last_error = Some(format!("{e:#}"));
                        cache.state = RefreshState::Error;
                    }
                }
            }
            if !permit.finish() {
                guard.armed = false;
                return result.map(|()| RefreshOutcome::Completed);
            }
            if let Err(e) = result {
                warn!("refresh failed before queued follow-up: {e:#}");
            }
        }
    }

    async fn refresh_once(&self) -> Result<()> {
        let project = self.project();
        let feed_epoch = self.feed.epoch();
        let api = &self.api;

        let (stats, usage, session, raw_events) = tokio::try_join!(
            api.stats(),
            api.usage(&project),
            api.session(&project),
            api.raw_events(&project),
        )
        .context("loading health data")?;

        let config = match api.config().await {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("config fetch failed: {e:#}");
                None
            }
        };

        let sync = match api.sync_status(self.prefs.sync_diagnostics_open()).await {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!("sync status unavailable: {e:#}");
                None
            }
        };

        // the feed only follows explicit project switches, never this cycle
        if self.prefs.active_tab() == Tab::Feed && feed_epoch.project() == project {
            match self.feed.refresh_first_page(&feed_epoch).await? {
                FirstPageOutcome::Applied { new_items } => debug!(new_items, "feed refreshed"),
                FirstPageOutcome::Stale => debug!("feed page discarded"),
            }
        }

        let pairing = if self.prefs.sync_pairing_open() {
            match api.pairing().await {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!("pairing fetch failed: {e:#}");
                    None
                }
            }
        } else {
            None
        };

        if self.project() != project {
            debug!(project, "project changed during refresh; discarding results");
            return Ok(());
        }

        let now = Utc::now();
        let overview = HealthOverview::from_payloads(&stats, &usage, &raw_events, sync.as_ref(), now);
        gauge!("viewer_health_risk_score").set(f64::from(overview.report.risk_score));

        let mut cache = self.cache.lock();
        cache.stats = stats;
        cache.usage = usage;
        cache.session = session;
        cache.raw_events = raw_events;
        if config.is_some() {
            cache.config = config;
        }
        match sync {
            Some(payload) => {
                cache.sync_view = Some(SyncView::build(&payload, self.prefs.sync_redaction_enabled(), now));
                cache.sync = Some(payload);
            }
            None => cache.sync_view = Some(SyncView::unavailable()),
        }
        cache.pairing = pairing;
        info!(
            risk_score = overview.report.risk_score,
            status = overview.report.status.label(),
            "refresh complete"
        );
        cache.overview = Some(overview);
        cache.last_refresh_at = Some(now);
        Ok(())
    }

    pub async fn load_more(&self) -> NextPageOutcome {
        self.feed.load_next_page().await
    }

    /// Asks the backend to sync now, then refreshes.
    pub async fn trigger_sync(&self, address: Option<&str>) -> Result<()> {
        self.api.trigger_sync(address).await?;
        if let Err(e) = self.refresh().await {
            warn!("refresh after sync trigger failed: {e:#}");
        }
        Ok(())
    }

    /// Saves the form; on success the next config view reflects the backend's copy.
    pub async fn save_settings(&self, form: &SettingsForm) -> Result<()> {
        self.api.save_config(&form.to_payload()).await?;
        match self.api.config().await {
            Ok(config) => self.cache.lock().config = Some(config),
            Err(e) => warn!("config reload after save failed: {e:#}"),
        }
        Ok(())
    }

    pub fn settings(&self) -> Option<SettingsView> {
        self.cache.lock().config.as_ref().map(SettingsView::build)
    }

    pub fn health(&self) -> Option<HealthOverview> {
        self.cache.lock().overview.clone()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        let feed = self.feed.snapshot();
        let cache = self.cache.lock();
        let pairing = if self.prefs.sync_pairing_open() {
            Some(PairingView::build(cache.pairing.as_ref()))
        } else {
            None
        };
        DashboardSnapshot {
            state: cache.state,
            project: self.project(),
            last_refresh_at: cache.last_refresh_at,
            last_error: cache.last_error.clone(),
            prefs: PrefsView::read(&self.prefs),
            health: cache.overview.clone(),
            sync: cache.sync_view.clone().unwrap_or_else(SyncView::loading),
            pairing,
            settings: cache.config.as_ref().map(SettingsView::build),
            session: cache.session.clone(),
            feed_items: feed.items.len(),
            feed_has_more: feed.has_more,
            feed_filtered: feed.filtered_count,
        }
    }
}

async fn run_cycle(dashboard: &Dashboard) {
    if let Err(e) = dashboard.refresh().await {
        warn!("refresh failed: {e:#}");
    }
}

/// Polls until the pause channel's sender is dropped.
pub async fn run_polling(dashboard: Arc<Dashboard>, every: Duration, mut paused_rx: watch::Receiver<bool>) {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_ms = every.as_millis() as u64, "polling started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if *paused_rx.borrow() {
                    dashboard.set_paused(true);
                    continue;
                }
                run_cycle(&dashboard).await;
            }
            changed = paused_rx.changed() => {
                if changed.is_err() {
                    info!("polling stopped");
                    return;
                }
                let paused = *paused_rx.borrow_and_update();
                dashboard.set_paused(paused);
                if !paused {
                    info!("polling resumed");
                    run_cycle(&dashboard).await;
                    ticker.reset();
                }
            }
        }
    }
}
