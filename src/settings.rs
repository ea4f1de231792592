//! Observer and sync settings, bound to `GET`/`POST /api/config`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::format::{is_truthy, value_as_string};

/// `GET /api/config` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigPayload {
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub defaults: Map<String, Value>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub env_overrides: Value,
}

/// Editable form state. Numeric fields stay text until saved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsForm {
    pub observer_provider: String,
    pub observer_model: String,
    pub observer_max_chars: String,
    pub pack_observation_limit: String,
    pub pack_session_limit: String,
    pub sync_enabled: bool,
    pub sync_host: String,
    pub sync_port: String,
    pub sync_interval_s: String,
    pub sync_mdns: bool,
}

fn text(config: &Map<String, Value>, key: &str) -> String {
    config
        .get(key)
        .filter(|v| is_truthy(v))
        .and_then(|v| value_as_string(Some(v)))
        .unwrap_or_default()
}

fn flag(config: &Map<String, Value>, key: &str) -> bool {
    config.get(key).is_some_and(is_truthy)
}

/// Positive numbers are sent as numbers; zero, blank and junk become `""`.
fn number_or_blank(raw: &str) -> Value {
    let trimmed = raw.trim();
    let parsed = if trimmed.is_empty() {
        Some(0.0)
    } else {
        trimmed.parse::<f64>().ok()
    };
    match parsed.filter(|n| n.is_finite() && *n != 0.0) {
        Some(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => json!(n as i64),
        Some(n) => json!(n),
        None => json!(""),
    }
}

impl SettingsForm {
    pub fn from_config(config: &Map<String, Value>) -> Self {
        Self {
            observer_provider: text(config, "observer_provider"),
            observer_model: text(config, "observer_model"),
            observer_max_chars: text(config, "observer_max_chars"),
            pack_observation_limit: text(config, "pack_observation_limit"),
            pack_session_limit: text(config, "pack_session_limit"),
            sync_enabled: flag(config, "sync_enabled"),
            sync_host: text(config, "sync_host"),
            sync_port: text(config, "sync_port"),
            sync_interval_s: text(config, "sync_interval_s"),
            sync_mdns: flag(config, "sync_mdns"),
        }
    }

    /// Body for `POST /api/config`.
    pub fn to_payload(&self) -> Value {
        json!({
            "observer_provider": self.observer_provider,
            "observer_model": self.observer_model,
            "observer_max_chars": number_or_blank(&self.observer_max_chars),
            "pack_observation_limit": number_or_blank(&self.pack_observation_limit),
            "pack_session_limit": number_or_blank(&self.pack_session_limit),
            "sync_enabled": self.sync_enabled,
            "sync_host": self.sync_host,
            "sync_port": number_or_blank(&self.sync_port),
            "sync_interval_s": number_or_blank(&self.sync_interval_s),
            "sync_mdns": self.sync_mdns,
        })
    }
}

/// Form plus the labels shown around it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SettingsView {
    pub form: SettingsForm,
    pub path_label: String,
    pub max_chars_hint: String,
    pub effective_note: String,
    pub has_env_overrides: bool,
}

impl SettingsView {
    pub fn build(payload: &ConfigPayload) -> Self {
        let path_label = match payload.path.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => format!("Config path: {path}"),
            None => "Config path: n/a".to_string(),
        };
        let default_max = text(&payload.defaults, "observer_max_chars");
        let max_chars_hint = if default_max.is_empty() {
            String::new()
        } else {
            format!("Default: {default_max}")
        };
        let env_active = is_truthy(&payload.env_overrides);
        Self {
            form: SettingsForm::from_config(&payload.config),
            path_label,
            max_chars_hint,
            effective_note: if env_active {
                "Effective config differs (env overrides active)".to_string()
            } else {
                String::new()
            },
            has_env_overrides: flag(&payload.config, "has_env_overrides"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> ConfigPayload {
        serde_json::from_value(json!({
            "config": {
                "observer_provider": "openai",
                "observer_model": "gpt-4o-mini",
                "observer_max_chars": 12000,
                "pack_observation_limit": 0,
                "sync_enabled": true,
                "sync_port": 7337,
                "sync_mdns": false,
                "has_env_overrides": true
            },
            "defaults": {"observer_max_chars": 12000},
            "path": "/home/me/.config/codemem/config.json",
            "env_overrides": {"CODEMEM_OBSERVER_MODEL": "x"}
        }))
        .unwrap()
    }

    #[test]
    fn binds_config_into_form() {
        let view = SettingsView::build(&payload());
        let form = &view.form;
        assert_eq!(form.observer_provider, "openai");
        assert_eq!(form.observer_max_chars, "12000");
        assert_eq!(form.pack_observation_limit, "");
        assert_eq!(form.pack_session_limit, "");
        assert!(form.sync_enabled);
        assert!(!form.sync_mdns);
        assert_eq!(form.sync_port, "7337");
        assert_eq!(view.path_label, "Config path: /home/me/.config/codemem/config.json");
        assert_eq!(view.max_chars_hint, "Default: 12000");
        assert_eq!(view.effective_note, "Effective config differs (env overrides active)");
        assert!(view.has_env_overrides);
    }

    #[test]
    fn payload_blanks_zero_and_junk_numbers() {
        let form = SettingsForm {
            observer_max_chars: " 8000 ".into(),
            pack_observation_limit: "0".into(),
            pack_session_limit: "abc".into(),
            sync_port: "".into(),
            sync_interval_s: "2.5".into(),
            ..Default::default()
        };
        let p = form.to_payload();
        assert_eq!(p["observer_max_chars"], json!(8000));
        assert_eq!(p["pack_observation_limit"], json!(""));
        assert_eq!(p["pack_session_limit"], json!(""));
        assert_eq!(p["sync_port"], json!(""));
        assert_eq!(p["sync_interval_s"], json!(2.5));
        assert_eq!(p["sync_enabled"], json!(false));
        assert_eq!(p["observer_provider"], json!(""));
    }

    #[test]
    fn empty_payload_has_placeholders() {
        let view = SettingsView::build(&ConfigPayload::default());
        assert_eq!(view.path_label, "Config path: n/a");
        assert!(view.max_chars_hint.is_empty());
        assert!(view.effective_note.is_empty());
    }
}
