//! # Feed
//! Memory feed items as served by `/api/memories` and `/api/summaries`, their
//! identity rules, and the aggregation store that merges both paginated
//! collections into one reverse-chronological list.

pub mod cursor;
pub mod merge;
pub mod store;
pub mod view;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::format::{normalize, parse_json_array, timestamp_millis, value_as_string};

pub const SESSION_SUMMARY_KIND: &str = "session_summary";

/// Any of these may identify an item; the first non-null one wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Value>,
}

/// Fields shared by both item variants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemCore {
    #[serde(flatten)]
    pub ids: ItemIds,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body_text: String,
    #[serde(default)]
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_utc: Option<String>,
    #[serde(default, rename = "metadata_json", skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(flatten)]
    pub core: ItemCore,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub facts: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    #[serde(flatten)]
    pub core: ItemCore,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub summary: Value,
}

/// One row of the aggregated feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, from = "RawFeedItem")]
pub enum FeedItem {
    Observation(Observation),
    SessionSummary(SessionSummary),
}

/// Wire shape before the variant is decided. `tags`/`files` may arrive as
/// JSON arrays or JSON-encoded strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFeedItem {
    #[serde(flatten)]
    ids: ItemIds,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body_text: Option<String>,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    created_at_utc: Option<String>,
    #[serde(default, alias = "metadata")]
    metadata_json: Value,
    #[serde(default)]
    tags: Value,
    #[serde(default)]
    files: Value,
    #[serde(default)]
    subtitle: Option<String>,
    #[serde(default)]
    narrative: Option<String>,
    #[serde(default)]
    facts: Value,
    #[serde(default)]
    summary: Value,
}

impl RawFeedItem {
    /// `/api/summaries` rows don't always carry `kind`.
    pub fn with_default_kind(mut self, kind: &str) -> Self {
        if self.kind.as_deref().map_or(true, str::is_empty) {
            self.kind = Some(kind.to_string());
        }
        self
    }
}

fn string_list(value: &Value) -> Vec<String> {
    parse_json_array(value)
        .iter()
        .filter_map(|v| value_as_string(Some(v)))
        .collect()
}

impl From<RawFeedItem> for FeedItem {
    fn from(raw: RawFeedItem) -> Self {
        let kind = raw.kind.unwrap_or_default();
        let is_summary = kind.eq_ignore_ascii_case(SESSION_SUMMARY_KIND);
        let core = ItemCore {
            ids: raw.ids,
            kind,
            title: raw.title.unwrap_or_default(),
            body_text: raw.body_text.unwrap_or_default(),
            project: raw.project.unwrap_or_default(),
            created_at: raw.created_at,
            created_at_utc: raw.created_at_utc,
            metadata: raw.metadata_json,
        };
        if is_summary {
            FeedItem::SessionSummary(SessionSummary {
                core,
                summary: raw.summary,
            })
        } else {
            FeedItem::Observation(Observation {
                core,
                tags: string_list(&raw.tags),
                files: string_list(&raw.files),
                subtitle: raw.subtitle,
                narrative: raw.narrative,
                facts: raw.facts,
            })
        }
    }
}

impl FeedItem {
    pub fn core(&self) -> &ItemCore {
        match self {
            FeedItem::Observation(o) => &o.core,
            FeedItem::SessionSummary(s) => &s.core,
        }
    }

    pub fn is_summary(&self) -> bool {
        matches!(self, FeedItem::SessionSummary(_))
    }

    pub fn kind(&self) -> &str {
        &self.core().kind
    }

    pub fn tags(&self) -> &[String] {
        match self {
            FeedItem::Observation(o) => &o.tags,
            FeedItem::SessionSummary(_) => &[],
        }
    }

    pub fn files(&self) -> &[String] {
        match self {
            FeedItem::Observation(o) => &o.files,
            FeedItem::SessionSummary(_) => &[],
        }
    }

    /// First present of `id, memory_id, observation_id, session_id,
    /// created_at_utc, created_at`, as a string.
    pub fn signature(&self) -> String {
        let core = self.core();
        let ids = &core.ids;
        [&ids.id, &ids.memory_id, &ids.observation_id, &ids.session_id]
            .into_iter()
            .flatten()
            .find_map(|v| value_as_string(Some(v)))
            .or_else(|| core.created_at_utc.clone())
            .or_else(|| core.created_at.clone())
            .unwrap_or_default()
    }

    /// Identity across pages and refreshes: `kind:signature`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind().to_lowercase(), self.signature())
    }

    /// Sort key; unparseable or absent `created_at` is epoch 0.
    pub fn created_at_millis(&self) -> i64 {
        timestamp_millis(self.core().created_at.as_deref())
    }

    /// Timestamp used for display and change signatures.
    pub fn display_timestamp(&self) -> &str {
        let core = self.core();
        core.created_at_utc
            .as_deref()
            .or(core.created_at.as_deref())
            .unwrap_or("")
    }
}

/// Trivial observations (`ls` output, tree fragments, title-only echoes) are
/// kept out of the feed. Summaries are never low-signal.
pub fn is_low_signal(item: &FeedItem) -> bool {
    match item {
        FeedItem::SessionSummary(_) => false,
        FeedItem::Observation(o) => is_low_signal_text(&o.core.title, &o.core.body_text),
    }
}

pub fn is_low_signal_text(title: &str, body: &str) -> bool {
    let title = normalize(title);
    let body = normalize(body);
    if title.is_empty() && body.is_empty() {
        return true;
    }
    let combined = if body.is_empty() { &title } else { &body };
    let len = combined.chars().count();
    if len < 10 {
        return true;
    }
    if !title.is_empty() && !body.is_empty() && title == body && len < 40 {
        return true;
    }
    if matches!(title.chars().next(), Some('\u{2514}' | '\u{203a}')) && len < 40 {
        return true;
    }
    if title.starts_with("list ") && len < 20 {
        return true;
    }
    combined == "ls" || combined == "list ls"
}
