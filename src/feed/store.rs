//! Feed aggregation state.
//!
//! `FeedStore` owns both pagination cursors and the merged item list. Every
//! request carries a [`FeedEpoch`] (generation + project) captured before the
//! fetch; a response whose epoch is no longer current is dropped without
//! touching state. Requests are never aborted. Only [`FeedStore::set_project`]
//! (directly or through `load_first_page`) changes the project.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use super::cursor::{Page, PaginationCursor, OBSERVATION_PAGE_SIZE, SUMMARY_PAGE_SIZE};
use super::merge::{append_merge, new_keys, refresh_merge};
use super::{is_low_signal, FeedItem};
use crate::client::ViewerApi;

/// Generation and project a request was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEpoch {
    generation: u64,
    project: String,
}

impl FeedEpoch {
    pub fn project(&self) -> &str {
        &self.project
    }
}

#[derive(Debug, Default)]
struct FeedState {
    generation: u64,
    project: String,
    observations: PaginationCursor,
    summaries: PaginationCursor,
    items: Vec<FeedItem>,
    load_more_in_flight: bool,
    filtered_count: u64,
    new_keys: BTreeSet<String>,
}

impl FeedState {
    fn epoch(&self) -> FeedEpoch {
        FeedEpoch {
            generation: self.generation,
            project: self.project.clone(),
        }
    }

    fn is_current(&self, epoch: &FeedEpoch) -> bool {
        self.generation == epoch.generation && self.project == epoch.project
    }

    fn has_more(&self) -> bool {
        self.observations.has_more || self.summaries.has_more
    }

    /// Applies a merged list, records the keys it introduced and returns their count.
    fn replace_items(&mut self, merged: Vec<FeedItem>) -> usize {
        let fresh = new_keys(&self.items, &merged);
        let added = fresh.len();
        self.new_keys.extend(fresh);
        self.items = merged;
        gauge!("viewer_feed_items").set(self.items.len() as f64);
        added
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstPageOutcome {
    Applied { new_items: usize },
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPageOutcome {
    /// Another load is running or both cursors are exhausted.
    Skipped,
    Stale,
    /// The fetch failed; items are unchanged and a later call may retry.
    Failed,
    Applied { new_items: usize },
}

/// Point-in-time copy of the store for rendering.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedSnapshot {
    pub project: String,
    pub items: Vec<FeedItem>,
    pub observations: PaginationCursor,
    pub summaries: PaginationCursor,
    pub has_more: bool,
    pub filtered_count: u64,
    pub new_keys: BTreeSet<String>,
}

/// Drops low-signal observations, returning what is left and how many went.
fn split_low_signal(items: Vec<FeedItem>) -> (Vec<FeedItem>, u64) {
    let before = items.len();
    let kept: Vec<FeedItem> = items.into_iter().filter(|i| !is_low_signal(i)).collect();
    let dropped = (before - kept.len()) as u64;
    if dropped > 0 {
        counter!("viewer_feed_filtered_total").increment(dropped);
    }
    (kept, dropped)
}

pub struct FeedStore {
    api: Arc<dyn ViewerApi>,
    inner: Mutex<FeedState>,
}

impl FeedStore {
    pub fn new(api: Arc<dyn ViewerApi>) -> Self {
        Self {
            api,
            inner: Mutex::new(FeedState::default()),
        }
    }

    /// Switches the active project. A different project resets both cursors,
    /// empties the list and starts a new generation, invalidating in-flight
    /// responses.
    pub fn set_project(&self, project: &str) -> bool {
        let mut st = self.inner.lock();
        if st.project == project {
            return false;
        }
        st.project = project.to_string();
        st.generation += 1;
        st.observations.reset();
        st.summaries.reset();
        st.items.clear();
        st.filtered_count = 0;
        st.new_keys.clear();
        gauge!("viewer_feed_items").set(0.0);
        debug!(project, generation = st.generation, "feed project changed");
        true
    }

    /// Switches to `project` if needed, then loads its first page.
    pub async fn load_first_page(&self, project: &str) -> Result<FirstPageOutcome> {
        self.set_project(project);
        let epoch = self.epoch();
        self.refresh_first_page(&epoch).await
    }

    /// Reloads page one for `epoch` and refresh-merges it. An epoch that is
    /// already stale returns `Stale` without fetching.
    pub async fn refresh_first_page(&self, epoch: &FeedEpoch) -> Result<FirstPageOutcome> {
        if !self.inner.lock().is_current(epoch) {
            debug!(project = %epoch.project, generation = epoch.generation, "first page skipped for stale epoch");
            return Ok(FirstPageOutcome::Stale);
        }
        let project = epoch.project.as_str();

        let (observations, summaries) = tokio::try_join!(
            self.api.memories_page(project, OBSERVATION_PAGE_SIZE, 0),
            self.api.summaries_page(project, SUMMARY_PAGE_SIZE, 0),
        )
        .with_context(|| format!("loading first feed page for project {project:?}"))?;

        let mut st = self.inner.lock();
        if !st.is_current(epoch) {
            debug!(project, generation = epoch.generation, "discarding stale first page");
            return Ok(FirstPageOutcome::Stale);
        }

        let obs_returned = observations.items.len();
        let sum_returned = summaries.items.len();
        let (kept, dropped) = split_low_signal(observations.items);
        st.filtered_count = dropped;

        st.observations.advance(
            observations.pagination.as_ref(),
            0,
            obs_returned,
            OBSERVATION_PAGE_SIZE,
        );
        st.summaries.advance(
            summaries.pagination.as_ref(),
            0,
            sum_returned,
            SUMMARY_PAGE_SIZE,
        );

        let batch: Vec<FeedItem> = summaries.items.into_iter().chain(kept).collect();
        let merged = refresh_merge(st.items.clone(), batch);
        let new_items = st.replace_items(merged);
        Ok(FirstPageOutcome::Applied { new_items })
    }

    /// Fetches the next page of every collection that has one and
    /// append-merges the result. Failures are logged, never returned.
    pub async fn load_next_page(&self) -> NextPageOutcome {
        let (epoch, observations, summaries) = {
            let mut st = self.inner.lock();
            if st.load_more_in_flight || !st.has_more() {
                return NextPageOutcome::Skipped;
            }
            st.load_more_in_flight = true;
            (st.epoch(), st.observations, st.summaries)
        };
        let _guard = InFlightGuard { inner: &self.inner };
        let project = epoch.project.as_str();

        let fetched = tokio::try_join!(
            async {
                if observations.has_more {
                    self.api
                        .memories_page(project, OBSERVATION_PAGE_SIZE, observations.offset)
                        .await
                } else {
                    Ok(Page::exhausted(observations.offset))
                }
            },
            async {
                if summaries.has_more {
                    self.api
                        .summaries_page(project, SUMMARY_PAGE_SIZE, summaries.offset)
                        .await
                } else {
                    Ok(Page::exhausted(summaries.offset))
                }
            },
        );
        let (obs_page, sum_page) = match fetched {
            Ok(pages) => pages,
            Err(e) => {
                counter!("viewer_load_more_errors_total").increment(1);
                warn!("feed next page failed: {e:#}");
                return NextPageOutcome::Failed;
            }
        };

        let mut st = self.inner.lock();
        if !st.is_current(&epoch) {
            debug!(project, generation = epoch.generation, "discarding stale next page");
            return NextPageOutcome::Stale;
        }

        let obs_returned = obs_page.items.len();
        let sum_returned = sum_page.items.len();
        let (kept, dropped) = split_low_signal(obs_page.items);
        st.filtered_count += dropped;

        st.observations.advance(
            obs_page.pagination.as_ref(),
            observations.offset,
            obs_returned,
            OBSERVATION_PAGE_SIZE,
        );
        st.summaries.advance(
            sum_page.pagination.as_ref(),
            summaries.offset,
            sum_returned,
            SUMMARY_PAGE_SIZE,
        );

        let batch: Vec<FeedItem> = sum_page.items.into_iter().chain(kept).collect();
        let merged = append_merge(st.items.clone(), batch);
        let new_items = st.replace_items(merged);
        NextPageOutcome::Applied { new_items }
    }

    pub fn project(&self) -> String {
        self.inner.lock().project.clone()
    }

    pub fn epoch(&self) -> FeedEpoch {
        self.inner.lock().epoch()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn items(&self) -> Vec<FeedItem> {
        self.inner.lock().items.clone()
    }

    /// `(observations, summaries)`.
    pub fn cursors(&self) -> (PaginationCursor, PaginationCursor) {
        let st = self.inner.lock();
        (st.observations, st.summaries)
    }

    pub fn has_more(&self) -> bool {
        self.inner.lock().has_more()
    }

    pub fn filtered_count(&self) -> u64 {
        self.inner.lock().filtered_count
    }

    pub fn is_loading_more(&self) -> bool {
        self.inner.lock().load_more_in_flight
    }

    /// Keys introduced and not yet acknowledged, for "new item" highlighting.
    pub fn new_keys(&self) -> BTreeSet<String> {
        self.inner.lock().new_keys.clone()
    }

    /// Clears the highlight for `keys`; returns how many were still marked.
    pub fn acknowledge_new_keys<S: AsRef<str>>(&self, keys: &[S]) -> usize {
        let mut st = self.inner.lock();
        keys.iter().filter(|k| st.new_keys.remove(k.as_ref())).count()
    }

    /// Drains every new key at once.
    pub fn take_new_keys(&self) -> BTreeSet<String> {
        std::mem::take(&mut self.inner.lock().new_keys)
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let st = self.inner.lock();
        FeedSnapshot {
            project: st.project.clone(),
            items: st.items.clone(),
            observations: st.observations,
            summaries: st.summaries,
            has_more: st.has_more(),
            filtered_count: st.filtered_count,
            new_keys: st.new_keys.clone(),
        }
    }
}

struct InFlightGuard<'a> {
    inner: &'a Mutex<FeedState>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.inner.lock().load_more_in_flight = false;
    }
}
