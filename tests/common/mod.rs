// tests/common/mod.rs
//
// In-memory `ViewerApi` used by the integration tests. Pages are keyed by
// (project, offset); anything not configured comes back empty.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;

use codemem_viewer::client::ViewerApi;
use codemem_viewer::feed::cursor::{Page, Pagination};
use codemem_viewer::feed::FeedItem;
use codemem_viewer::settings::ConfigPayload;
use codemem_viewer::sync::SyncStatusPayload;

pub fn obs(id: u64, created_at: &str, title: &str) -> FeedItem {
    serde_json::from_value(json!({
        "id": id,
        "kind": "discovery",
        "title": title,
        "body_text": format!("{title}: details about the change that was made"),
        "project": "codemem",
        "created_at": created_at,
        "tags": ["feed"],
    }))
    .expect("observation fixture")
}

pub fn low_signal(id: u64, created_at: &str) -> FeedItem {
    serde_json::from_value(json!({
        "id": id,
        "kind": "discovery",
        "title": "ls",
        "body_text": "",
        "created_at": created_at,
    }))
    .expect("low-signal fixture")
}

pub fn summary(id: u64, created_at: &str, request: &str) -> FeedItem {
    serde_json::from_value(json!({
        "id": id,
        "kind": "session_summary",
        "title": "Session summary",
        "body_text": "",
        "project": "codemem",
        "created_at": created_at,
        "metadata_json": {"request": request},
    }))
    .expect("summary fixture")
}

pub fn page(items: Vec<FeedItem>, has_more: Option<bool>, next_offset: Option<i64>) -> Page {
    let pagination = if has_more.is_none() && next_offset.is_none() {
        None
    } else {
        Some(Pagination {
            has_more,
            next_offset,
        })
    };
    Page { items, pagination }
}

/// Holds one matching `memories_page` call until released.
pub struct Block {
    pub project: String,
    pub offset: u64,
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[derive(Default)]
pub struct FakeApi {
    pub memories: Mutex<HashMap<(String, u64), Page>>,
    pub summaries: Mutex<HashMap<(String, u64), Page>>,
    pub calls: Mutex<Vec<String>>,
    pub fail_pages: AtomicBool,
    pub fail_stats: AtomicBool,
    pub block: Mutex<Option<Block>>,
    pub stats_block: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
    pub stats: Mutex<Value>,
    pub usage: Mutex<Value>,
    pub raw_events: Mutex<Value>,
    pub sync: Mutex<Option<SyncStatusPayload>>,
    pub pairing: Mutex<Option<Value>>,
    pub config: Mutex<Option<ConfigPayload>>,
    pub saved_configs: Mutex<Vec<Value>>,
    pub sync_runs: Mutex<Vec<Option<String>>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_memories(&self, project: &str, offset: u64, page: Page) {
        self.memories.lock().insert((project.to_string(), offset), page);
    }

    pub fn set_summaries(&self, project: &str, offset: u64, page: Page) {
        self.summaries.lock().insert((project.to_string(), offset), page);
    }

    /// Arms a block on `memories_page(project, _, offset)`; returns (entered, release).
    pub fn block_memories(&self, project: &str, offset: u64) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.block.lock() = Some(Block {
            project: project.to_string(),
            offset,
            entered: entered.clone(),
            release: release.clone(),
        });
        (entered, release)
    }

    /// Arms a block on the next `stats` call; returns (entered, release).
    pub fn block_stats(&self) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.stats_block.lock() = Some((entered.clone(), release.clone()));
        (entered, release)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn take_block(&self, project: &str, offset: u64) -> Option<Block> {
        let mut slot = self.block.lock();
        let hit = slot
            .as_ref()
            .is_some_and(|b| b.project == project && b.offset == offset);
        if hit {
            slot.take()
        } else {
            None
        }
    }
}

#[async_trait]
impl ViewerApi for FakeApi {
    async fn memories_page(&self, project: &str, limit: u64, offset: u64) -> Result<Page> {
        self.record(format!("memories:{project}:{limit}:{offset}"));
        if let Some(block) = self.take_block(project, offset) {
            block.entered.notify_one();
            block.release.notified().await;
        }
        if self.fail_pages.load(Ordering::SeqCst) {
            return Err(anyhow!("memories unavailable"));
        }
        Ok(self
            .memories
            .lock()
            .get(&(project.to_string(), offset))
            .cloned()
            .unwrap_or_default())
    }

    async fn summaries_page(&self, project: &str, limit: u64, offset: u64) -> Result<Page> {
        self.record(format!("summaries:{project}:{limit}:{offset}"));
        if self.fail_pages.load(Ordering::SeqCst) {
            return Err(anyhow!("summaries unavailable"));
        }
        Ok(self
            .summaries
            .lock()
            .get(&(project.to_string(), offset))
            .cloned()
            .unwrap_or_default())
    }

    async fn stats(&self) -> Result<Value> {
        self.record("stats".into());
        let block = self.stats_block.lock().take();
        if let Some((entered, release)) = block {
            entered.notify_one();
            release.notified().await;
        }
        if self.fail_stats.load(Ordering::SeqCst) {
            return Err(anyhow!("stats unavailable"));
        }
        Ok(self.stats.lock().clone())
    }

    async fn usage(&self, project: &str) -> Result<Value> {
        self.record(format!("usage:{project}"));
        Ok(self.usage.lock().clone())
    }

    async fn session(&self, project: &str) -> Result<Value> {
        self.record(format!("session:{project}"));
        Ok(json!({"total": 3, "memories": 2}))
    }

    async fn raw_events(&self, project: &str) -> Result<Value> {
        self.record(format!("raw_events:{project}"));
        Ok(self.raw_events.lock().clone())
    }

    async fn sync_status(&self, include_diagnostics: bool) -> Result<SyncStatusPayload> {
        self.record(format!("sync_status:{include_diagnostics}"));
        self.sync
            .lock()
            .clone()
            .ok_or_else(|| anyhow!("sync status unavailable"))
    }

    async fn pairing(&self) -> Result<Value> {
        self.record("pairing".into());
        self.pairing
            .lock()
            .clone()
            .ok_or_else(|| anyhow!("pairing unavailable"))
    }

    async fn config(&self) -> Result<ConfigPayload> {
        self.record("config".into());
        self.config
            .lock()
            .clone()
            .ok_or_else(|| anyhow!("config unavailable"))
    }

    async fn save_config(&self, payload: &Value) -> Result<()> {
        self.saved_configs.lock().push(payload.clone());
        Ok(())
    }

    async fn trigger_sync(&self, address: Option<&str>) -> Result<()> {
        self.sync_runs.lock().push(address.map(str::to_string));
        Ok(())
    }

    async fn projects(&self) -> Result<Vec<String>> {
        Ok(vec!["codemem".into()])
    }
}
