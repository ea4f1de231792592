//! Per-collection pagination state and the page envelope both feed endpoints return.

use serde::{Deserialize, Serialize};

use super::{FeedItem, RawFeedItem};

pub const OBSERVATION_PAGE_SIZE: u64 = 20;
pub const SUMMARY_PAGE_SIZE: u64 = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub has_more: Option<bool>,
    #[serde(default)]
    pub next_offset: Option<i64>,
}

/// `{ items, pagination? }` as served by `/api/memories` and `/api/summaries`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Page {
    pub items: Vec<FeedItem>,
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawPage {
    #[serde(default)]
    pub items: Vec<RawFeedItem>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl RawPage {
    pub fn into_page(self, default_kind: Option<&str>) -> Page {
        let items = self
            .items
            .into_iter()
            .map(|raw| match default_kind {
                Some(kind) => raw.with_default_kind(kind),
                None => raw,
            })
            .map(FeedItem::from)
            .collect();
        Page {
            items,
            pagination: self.pagination,
        }
    }
}

impl Page {
    /// What a cursor without more pages contributes: nothing, and no request.
    pub fn exhausted(offset: u64) -> Self {
        Self {
            items: Vec::new(),
            pagination: Some(Pagination {
                has_more: Some(false),
                next_offset: i64::try_from(offset).ok(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationCursor {
    pub offset: u64,
    pub has_more: bool,
}

impl Default for PaginationCursor {
    fn default() -> Self {
        Self {
            offset: 0,
            has_more: true,
        }
    }
}

impl PaginationCursor {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advance from a page fetched at `base_offset`. `returned` is the raw item
    /// count before any client-side filtering.
    pub fn advance(&mut self, pagination: Option<&Pagination>, base_offset: u64, returned: usize, page_size: u64) {
        let returned = returned as u64;
        self.has_more = pagination
            .and_then(|p| p.has_more)
            .unwrap_or(returned >= page_size);
        self.offset = pagination
            .and_then(|p| p.next_offset)
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(base_offset + returned);
    }
}
