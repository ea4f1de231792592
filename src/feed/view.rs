//! Pure display derivations over the aggregated list: type/query filtering,
//! change signatures, the meta line and per-card view data.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{FeedItem, Observation, SessionSummary};
use crate::format::{
    format_file_list, format_relative_time, format_tag_label, format_timestamp, is_truthy, normalize,
    parse_json_array, to_title_label, value_as_string,
};

/// Keys a structured session summary is rendered in, before any others.
pub const SUMMARY_KEYS: [&str; 9] = [
    "request",
    "outcome",
    "plan",
    "completed",
    "learned",
    "investigated",
    "next",
    "next_steps",
    "notes",
];

const SUMMARY_CLAMP_CHARS: usize = 260;
const NARRATIVE_CLAMP_CHARS: usize = 320;
const MIN_SENTENCE_FACT_CHARS: usize = 18;
const SENTENCE_FACT_LIMIT: usize = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFilter {
    #[default]
    All,
    Observations,
    Summaries,
}

impl FeedFilter {
    /// Unknown values fall back to `All`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "observations" => FeedFilter::Observations,
            "summaries" => FeedFilter::Summaries,
            _ => FeedFilter::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedFilter::All => "all",
            FeedFilter::Observations => "observations",
            FeedFilter::Summaries => "summaries",
        }
    }

    fn meta_label(&self) -> &'static str {
        match self {
            FeedFilter::All => "",
            FeedFilter::Observations => " · observations",
            FeedFilter::Summaries => " · session summaries",
        }
    }
}

pub fn filter_by_type(items: &[FeedItem], filter: FeedFilter) -> Vec<&FeedItem> {
    items
        .iter()
        .filter(|item| match filter {
            FeedFilter::All => true,
            FeedFilter::Observations => !item.is_summary(),
            FeedFilter::Summaries => item.is_summary(),
        })
        .collect()
}

/// Case-insensitive, whitespace-collapsed substring match over
/// title, body, kind, tags and project.
pub fn filter_by_query<'a>(items: Vec<&'a FeedItem>, query: &str) -> Vec<&'a FeedItem> {
    let query = normalize(query);
    if query.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| haystack(item).contains(&query))
        .collect()
}

fn haystack(item: &FeedItem) -> String {
    let core = item.core();
    let tags = item
        .tags()
        .iter()
        .map(|t| normalize(t))
        .collect::<Vec<_>>()
        .join(" ");
    [
        normalize(&core.title),
        normalize(&core.body_text),
        normalize(&core.kind),
        tags,
        normalize(&core.project),
    ]
    .join(" ")
    .trim()
    .to_string()
}

pub fn visible_items<'a>(items: &'a [FeedItem], filter: FeedFilter, query: &str) -> Vec<&'a FeedItem> {
    filter_by_query(filter_by_type(items, filter), query)
}

/// `filter|project|key:kind:timestamp|...` over the visible list.
pub fn view_signature(filter: FeedFilter, project: &str, visible: &[&FeedItem]) -> String {
    let parts = visible
        .iter()
        .map(|item| format!("{}:{}:{}", item.key(), item.kind(), item.display_timestamp()))
        .collect::<Vec<_>>()
        .join("|");
    format!("{}|{}|{}", filter.as_str(), project, parts)
}

/// Remembers the last rendered signature.
#[derive(Debug, Default)]
pub struct RenderCache {
    last: Option<String>,
}

impl RenderCache {
    /// True when `signature` differs from the previous call's.
    pub fn changed(&mut self, signature: &str) -> bool {
        if self.last.as_deref() == Some(signature) {
            return false;
        }
        self.last = Some(signature.to_string());
        true
    }
}

pub fn feed_meta_line(visible: usize, filter: FeedFilter, query: &str, filtered_count: u64, has_more: bool) -> String {
    let query = query.trim();
    let query_label = if query.is_empty() {
        String::new()
    } else {
        format!(" · matching \"{query}\"")
    };
    let filtered_label = if query.is_empty() && filtered_count > 0 {
        format!(" · {filtered_count} observations filtered")
    } else {
        String::new()
    };
    let more_label = if has_more { " · scroll for more" } else { "" };
    format!(
        "{visible} items{}{query_label}{filtered_label}{more_label}",
        filter.meta_label()
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemViewMode {
    Summary,
    Facts,
    Narrative,
}

impl ItemViewMode {
    pub fn label(&self) -> &'static str {
        match self {
            ItemViewMode::Summary => "Summary",
            ItemViewMode::Facts => "Facts",
            ItemViewMode::Narrative => "Narrative",
        }
    }

    /// Line clamp applied when the body is collapsed.
    pub fn clamp_lines(&self) -> u8 {
        match self {
            ItemViewMode::Summary => 3,
            _ => 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObservationView {
    pub summary: String,
    pub narrative: String,
    pub facts: Vec<String>,
    pub has_summary: bool,
    pub has_facts: bool,
    pub has_narrative: bool,
}

impl ObservationView {
    pub fn from_observation(obs: &Observation) -> Self {
        let metadata = merge_metadata(&obs.core.metadata);
        let summary = obs
            .subtitle
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&obs.core.body_text)
            .trim()
            .to_string();
        let narrative = obs
            .narrative
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| metadata.get("narrative").and_then(|v| value_as_string(Some(v))))
            .unwrap_or_default()
            .trim()
            .to_string();
        let has_narrative = !narrative.is_empty() && normalize(&narrative) != normalize(&summary);

        let facts_value = if is_truthy(&obs.facts) {
            obs.facts.clone()
        } else {
            metadata.get("facts").cloned().unwrap_or(Value::Null)
        };
        let mut facts: Vec<String> = parse_json_array(&facts_value)
            .iter()
            .map(display_string)
            .collect();
        if facts.is_empty() {
            let source = if summary.is_empty() { &narrative } else { &summary };
            facts = extract_facts_from_body(source);
        }
        if facts.is_empty() {
            facts = sentence_facts(&summary, SENTENCE_FACT_LIMIT);
        }

        Self {
            has_summary: !summary.is_empty(),
            has_facts: !facts.is_empty(),
            has_narrative,
            summary,
            narrative,
            facts,
        }
    }

    pub fn modes(&self) -> Vec<ItemViewMode> {
        let mut modes = Vec::with_capacity(3);
        if self.has_summary {
            modes.push(ItemViewMode::Summary);
        }
        if self.has_facts {
            modes.push(ItemViewMode::Facts);
        }
        if self.has_narrative {
            modes.push(ItemViewMode::Narrative);
        }
        modes
    }

    pub fn default_mode(&self) -> ItemViewMode {
        if self.has_summary {
            ItemViewMode::Summary
        } else if self.has_facts {
            ItemViewMode::Facts
        } else {
            ItemViewMode::Narrative
        }
    }

    /// Facts never clamp; summary and narrative clamp past a length.
    pub fn should_clamp(&self, mode: ItemViewMode) -> bool {
        match mode {
            ItemViewMode::Facts => false,
            ItemViewMode::Summary => self.summary.chars().count() > SUMMARY_CLAMP_CHARS,
            ItemViewMode::Narrative => self.narrative.chars().count() > NARRATIVE_CLAMP_CHARS,
        }
    }
}

fn display_string(value: &Value) -> String {
    value_as_string(Some(value)).unwrap_or_else(|| value.to_string())
}

/// `import_metadata` fields are visible unless the item's own metadata overrides them.
pub fn merge_metadata(metadata: &Value) -> Map<String, Value> {
    let Some(own) = metadata.as_object() else {
        return Map::new();
    };
    match own.get("import_metadata").and_then(Value::as_object) {
        Some(imported) => {
            let mut merged = imported.clone();
            merged.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
            merged
        }
        None => own.clone(),
    }
}

fn bullet_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^[-*\u{2022}]\s+").expect("valid bullet regex"))
}

fn numbered_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.").expect("valid numbered regex"))
}

fn numbered_prefix_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\s+").expect("valid numbered prefix regex"))
}

/// Bullet (`-`, `*`, `•`) and numbered lines, with their markers stripped.
pub fn extract_facts_from_body(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| bullet_re().is_match(l) || numbered_re().is_match(l))
        .map(|l| {
            let l = bullet_re().replace(l, "");
            numbered_prefix_re().replace(&l, "").into_owned()
        })
        .collect()
}

/// Splits on whitespace following `.`, `!` or `?`; keeps sentences of at
/// least 18 chars, up to `limit`.
pub fn sentence_facts(text: &str, limit: usize) -> Vec<String> {
    let collapsed = normalize_whitespace(text);
    if collapsed.is_empty() {
        return Vec::new();
    }
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut chars = collapsed.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek() == Some(&' ') {
            chars.next();
            parts.push(std::mem::take(&mut current));
        }
    }
    parts.push(current);

    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| p.chars().count() >= MIN_SENTENCE_FACT_CHARS)
        .take(limit)
        .collect()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn looks_like_summary(value: &Value) -> bool {
    value.as_object().is_some_and(|obj| {
        SUMMARY_KEYS.iter().any(|k| {
            obj.get(*k)
                .and_then(Value::as_str)
                .is_some_and(|s| !s.trim().is_empty())
        })
    })
}

/// Structured summary for a session summary item. The typed `summary` field
/// wins; otherwise the metadata is scanned for summary-shaped objects.
pub fn summary_object(item: &SessionSummary) -> Option<Map<String, Value>> {
    if let Some(obj) = item.summary.as_object() {
        if let Some(inner) = obj.get("summary").and_then(Value::as_object) {
            if !SUMMARY_KEYS.iter().any(|k| obj.contains_key(*k)) {
                return Some(inner.clone());
            }
        }
        return Some(obj.clone());
    }
    let metadata = Value::Object(merge_metadata(&item.core.metadata));
    if looks_like_summary(&metadata) {
        return metadata.as_object().cloned();
    }
    metadata
        .get("summary")
        .filter(|v| looks_like_summary(v))
        .and_then(Value::as_object)
        .cloned()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummarySection {
    pub label: String,
    pub content: String,
}

/// Non-empty sections in preferred key order, then the remaining keys sorted.
pub fn summary_sections(summary: &Map<String, Value>) -> Vec<SummarySection> {
    let mut remaining: Vec<&String> = summary
        .keys()
        .filter(|k| !SUMMARY_KEYS.contains(&k.as_str()))
        .collect();
    remaining.sort();
    SUMMARY_KEYS
        .iter()
        .copied()
        .filter(|k| summary.contains_key(*k))
        .chain(remaining.into_iter().map(String::as_str))
        .filter_map(|key| {
            let content = summary.get(key).map(display_string).unwrap_or_default();
            let content = content.trim();
            (!content.is_empty() && content != "null").then(|| SummarySection {
                label: to_title_label(key),
                content: content.to_string(),
            })
        })
        .collect()
}

/// Title shown for an item; summaries prefer the recorded request.
pub fn display_title(item: &FeedItem) -> String {
    let core = item.core();
    if item.is_summary() {
        let metadata = merge_metadata(&core.metadata);
        if let Some(request) = metadata
            .get("request")
            .and_then(|v| value_as_string(Some(v)))
            .filter(|s| !s.is_empty())
        {
            return request;
        }
    }
    if core.title.is_empty() {
        "(untitled)".to_string()
    } else {
        core.title.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CardBody {
    Summary {
        sections: Vec<SummarySection>,
        fallback: String,
    },
    Observation {
        view: ObservationView,
        modes: Vec<ItemViewMode>,
        default_mode: ItemViewMode,
        clamp_default: bool,
    },
}

/// Everything a client needs to draw one feed row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedCard {
    pub key: String,
    pub kind_label: String,
    pub title: String,
    pub age: String,
    pub timestamp: String,
    pub meta: String,
    pub tags: Vec<String>,
    pub files: Vec<String>,
    pub is_new: bool,
    pub body: CardBody,
}

impl FeedCard {
    pub fn build(item: &FeedItem, is_new: bool, now: DateTime<Utc>) -> Self {
        let core = item.core();
        let kind = if core.kind.is_empty() {
            super::SESSION_SUMMARY_KIND.to_string()
        } else {
            core.kind.to_lowercase()
        };
        let created = core.created_at.as_deref().or(core.created_at_utc.as_deref());

        let tags: Vec<String> = item
            .tags()
            .iter()
            .map(|t| format_tag_label(t))
            .filter(|t| !t.is_empty())
            .collect();
        let files = item.files().to_vec();
        let project = if core.project.is_empty() {
            "Project: n/a".to_string()
        } else {
            format!("Project: {}", core.project)
        };
        let tag_part = if tags.is_empty() {
            String::new()
        } else {
            format!(" · {}", tags.join(", "))
        };
        let file_part = if files.is_empty() {
            String::new()
        } else {
            format!(" · {}", format_file_list(&files, 2))
        };

        let body = match item {
            FeedItem::SessionSummary(s) => CardBody::Summary {
                sections: summary_object(s).map(|o| summary_sections(&o)).unwrap_or_default(),
                fallback: core.body_text.trim().to_string(),
            },
            FeedItem::Observation(o) => {
                let view = ObservationView::from_observation(o);
                let default_mode = view.default_mode();
                CardBody::Observation {
                    modes: view.modes(),
                    clamp_default: view.should_clamp(default_mode),
                    default_mode,
                    view,
                }
            }
        };

        Self {
            key: item.key(),
            kind_label: kind.replace('_', " "),
            title: display_title(item),
            age: format_relative_time(created, now),
            timestamp: format_timestamp(created),
            meta: format!("{project}{tag_part}{file_part}"),
            tags,
            files,
            is_new,
            body,
        }
    }
}
