// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::refresh::DEFAULT_POLL_INTERVAL;

pub const ENV_PATH: &str = "CODEMEM_VIEWER_CONFIG";
const ENV_BASE_URL: &str = "CODEMEM_VIEWER_BASE_URL";
const ENV_LISTEN: &str = "CODEMEM_VIEWER_LISTEN";
const ENV_POLL_SECS: &str = "CODEMEM_VIEWER_POLL_SECS";
const ENV_PROJECT: &str = "CODEMEM_VIEWER_PROJECT";
const ENV_PREFS_PATH: &str = "CODEMEM_VIEWER_PREFS_PATH";
const ENV_LOG_JSON: &str = "CODEMEM_VIEWER_LOG_JSON";

/// Runtime settings for the viewer process.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Root of the codemem backend, e.g. `http://127.0.0.1:38888`.
    pub base_url: String,
    /// Address the local API binds to.
    pub listen: String,
    pub poll_secs: u64,
    /// Initial project filter; empty means all projects.
    pub project: String,
    /// Preferences file; none keeps preferences in memory.
    pub prefs_path: Option<PathBuf>,
    pub log_json: bool,
    pub metrics: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:38888".to_string(),
            listen: "127.0.0.1:38890".to_string(),
            poll_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            project: String::new(),
            prefs_path: Some(PathBuf::from("state/viewer_prefs.json")),
            log_json: false,
            metrics: true,
        }
    }
}

impl ViewerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_secs.max(1))
    }

    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading viewer config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing viewer config in {}", path.display()))
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $CODEMEM_VIEWER_CONFIG
    /// 2) config/viewer.toml
    /// 3) config/viewer.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let toml_p = PathBuf::from("config/viewer.toml");
            let json_p = PathBuf::from("config/viewer.json");
            if toml_p.exists() {
                Self::load_from(&toml_p)?
            } else if json_p.exists() {
                Self::load_from(&json_p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_value(ENV_BASE_URL) {
            self.base_url = v;
        }
        if let Some(v) = env_value(ENV_LISTEN) {
            self.listen = v;
        }
        if let Some(v) = env_value(ENV_POLL_SECS) {
            self.poll_secs = v
                .parse()
                .with_context(|| format!("{ENV_POLL_SECS} must be a whole number of seconds"))?;
        }
        if let Ok(v) = std::env::var(ENV_PROJECT) {
            self.project = v.trim().to_string();
        }
        if let Some(v) = env_value(ENV_PREFS_PATH) {
            self.prefs_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env_value(ENV_LOG_JSON) {
            self.log_json = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        self.base_url = self.base_url.trim_end_matches('/').to_string();
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<ViewerConfig> {
    // TOML first if hinted, then JSON, then TOML as a last resort.
    let try_toml = hint_ext == "toml";
    if try_toml {
        if let Ok(v) = toml::from_str::<ViewerConfig>(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = serde_json::from_str::<ViewerConfig>(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = toml::from_str::<ViewerConfig>(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported viewer config format"))
}
