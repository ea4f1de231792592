//! Persisted viewer preferences.
//!
//! A flat JSON object of string values on disk. Reads fall back to defaults
//! on missing or invalid values; write failures are logged and swallowed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::warn;

use crate::feed::view::FeedFilter;

pub const TAB_KEY: &str = "codemem-tab";
pub const FEED_FILTER_KEY: &str = "codemem-feed-filter";
pub const THEME_KEY: &str = "codemem-theme";
pub const SYNC_DIAGNOSTICS_KEY: &str = "codemem-sync-diagnostics";
pub const SYNC_PAIRING_KEY: &str = "codemem-sync-pairing";
pub const SYNC_REDACT_KEY: &str = "codemem-sync-redact";
pub const DETAILS_OPEN_KEY: &str = "codemem-details-open";

pub const ALL_KEYS: [&str; 7] = [
    TAB_KEY,
    FEED_FILTER_KEY,
    THEME_KEY,
    SYNC_DIAGNOSTICS_KEY,
    SYNC_PAIRING_KEY,
    SYNC_REDACT_KEY,
    DETAILS_OPEN_KEY,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Feed,
    Health,
    Sync,
}

impl Tab {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "feed" => Some(Tab::Feed),
            "health" => Some(Tab::Health),
            "sync" => Some(Tab::Sync),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Feed => "feed",
            Tab::Health => "health",
            Tab::Sync => "sync",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThemeOption {
    pub id: &'static str,
    pub label: &'static str,
    pub mode: ThemeMode,
}

pub const THEME_OPTIONS: [ThemeOption; 2] = [
    ThemeOption {
        id: "light",
        label: "Light",
        mode: ThemeMode::Light,
    },
    ThemeOption {
        id: "dark",
        label: "Dark",
        mode: ThemeMode::Dark,
    },
];

/// Exact id match, else anything starting with `dark` is dark, else light.
pub fn resolve_theme(theme_id: &str) -> ThemeOption {
    if let Some(exact) = THEME_OPTIONS.iter().find(|t| t.id == theme_id) {
        return *exact;
    }
    let fallback = if theme_id.starts_with("dark") { "dark" } else { "light" };
    THEME_OPTIONS
        .iter()
        .copied()
        .find(|t| t.id == fallback)
        .unwrap_or(THEME_OPTIONS[0])
}

/// Key/value store backed by an optional JSON file.
pub struct PrefsStore {
    path: Option<PathBuf>,
    values: RwLock<BTreeMap<String, String>>,
}

impl PrefsStore {
    /// Memory-only store; nothing is persisted.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: RwLock::new(BTreeMap::new()),
        }
    }

    /// Opens `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match load_file(&path) {
            Ok(values) => values,
            Err(e) => {
                if path.exists() {
                    warn!("ignoring unreadable prefs file: {e:#}");
                }
                BTreeMap::new()
            }
        };
        Self {
            path: Some(path),
            values: RwLock::new(values),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: &str) {
        let snapshot = {
            let mut values = self.values.write();
            values.insert(key.to_string(), value.to_string());
            values.clone()
        };
        if let Some(path) = &self.path {
            if let Err(e) = save_file(path, &snapshot) {
                warn!("failed to persist preference {key}: {e:#}");
            }
        }
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).as_deref() == Some("1")
    }

    fn set_flag(&self, key: &str, on: bool) {
        self.set(key, if on { "1" } else { "0" });
    }

    pub fn active_tab(&self) -> Tab {
        self.get(TAB_KEY)
            .and_then(|v| Tab::parse(&v))
            .unwrap_or_default()
    }

    pub fn set_active_tab(&self, tab: Tab) {
        self.set(TAB_KEY, tab.as_str());
    }

    pub fn feed_filter(&self) -> FeedFilter {
        self.get(FEED_FILTER_KEY)
            .map(|v| FeedFilter::parse(&v))
            .unwrap_or_default()
    }

    pub fn set_feed_filter(&self, filter: FeedFilter) {
        self.set(FEED_FILTER_KEY, filter.as_str());
    }

    /// Saved theme, resolved; otherwise whatever the caller prefers.
    pub fn theme(&self, prefers_dark: bool) -> ThemeOption {
        match self.get(THEME_KEY).filter(|v| !v.is_empty()) {
            Some(saved) => resolve_theme(&saved),
            None => resolve_theme(if prefers_dark { "dark" } else { "light" }),
        }
    }

    pub fn set_theme(&self, theme_id: &str) -> ThemeOption {
        let selected = resolve_theme(theme_id);
        self.set(THEME_KEY, selected.id);
        selected
    }

    pub fn sync_diagnostics_open(&self) -> bool {
        self.flag(SYNC_DIAGNOSTICS_KEY)
    }

    pub fn set_sync_diagnostics_open(&self, open: bool) {
        self.set_flag(SYNC_DIAGNOSTICS_KEY, open);
    }

    pub fn sync_pairing_open(&self) -> bool {
        self.flag(SYNC_PAIRING_KEY)
    }

    pub fn set_sync_pairing_open(&self, open: bool) {
        self.set_flag(SYNC_PAIRING_KEY, open);
    }

    /// On unless explicitly `"0"`.
    pub fn sync_redaction_enabled(&self) -> bool {
        self.get(SYNC_REDACT_KEY).as_deref() != Some("0")
    }

    pub fn set_sync_redaction_enabled(&self, enabled: bool) {
        self.set_flag(SYNC_REDACT_KEY, enabled);
    }

    pub fn details_open(&self) -> bool {
        self.flag(DETAILS_OPEN_KEY)
    }

    pub fn set_details_open(&self, open: bool) {
        self.set_flag(DETAILS_OPEN_KEY, open);
    }
}

fn load_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading prefs from {}", path.display()))?;
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(&content)
        .with_context(|| format!("parsing prefs in {}", path.display()))?;
    // non-string values are dropped rather than coerced
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
        .collect())
}

fn save_file(path: &Path, values: &BTreeMap<String, String>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(values)?;
    fs::write(path, body).with_context(|| format!("writing prefs to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_empty() {
        let prefs = PrefsStore::in_memory();
        assert_eq!(prefs.active_tab(), Tab::Feed);
        assert_eq!(prefs.feed_filter(), FeedFilter::All);
        assert!(!prefs.sync_diagnostics_open());
        assert!(!prefs.sync_pairing_open());
        assert!(prefs.sync_redaction_enabled());
        assert!(!prefs.details_open());
        assert_eq!(prefs.theme(true).mode, ThemeMode::Dark);
        assert_eq!(prefs.theme(false).mode, ThemeMode::Light);
    }

    #[test]
    fn invalid_values_fall_back() {
        let prefs = PrefsStore::in_memory();
        prefs.set(TAB_KEY, "settings");
        prefs.set(FEED_FILTER_KEY, "everything");
        prefs.set(SYNC_REDACT_KEY, "no");
        assert_eq!(prefs.active_tab(), Tab::Feed);
        assert_eq!(prefs.feed_filter(), FeedFilter::All);
        assert!(prefs.sync_redaction_enabled());
        prefs.set_sync_redaction_enabled(false);
        assert!(!prefs.sync_redaction_enabled());
    }

    #[test]
    fn theme_resolution() {
        assert_eq!(resolve_theme("dark").id, "dark");
        assert_eq!(resolve_theme("dark-dim").mode, ThemeMode::Dark);
        assert_eq!(resolve_theme("solarized").id, "light");
        let prefs = PrefsStore::in_memory();
        assert_eq!(prefs.set_theme("dark-high-contrast").id, "dark");
        assert_eq!(prefs.get(THEME_KEY).as_deref(), Some("dark"));
        assert_eq!(prefs.theme(false).id, "dark");
    }

    #[test]
    fn persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");
        {
            let prefs = PrefsStore::open(&path);
            prefs.set_active_tab(Tab::Sync);
            prefs.set_feed_filter(FeedFilter::Summaries);
            prefs.set_sync_pairing_open(true);
        }
        let reopened = PrefsStore::open(&path);
        assert_eq!(reopened.active_tab(), Tab::Sync);
        assert_eq!(reopened.feed_filter(), FeedFilter::Summaries);
        assert!(reopened.sync_pairing_open());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "{not json").unwrap();
        let prefs = PrefsStore::open(&path);
        assert_eq!(prefs.active_tab(), Tab::Feed);
        prefs.set_details_open(true);
        assert!(PrefsStore::open(&path).details_open());
    }
}
