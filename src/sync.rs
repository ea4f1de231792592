//! Sync status, peers, attempts and pairing as shown in the sync panel.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::format::{
    format_age_short, format_timestamp, is_truthy, seconds_since, value_as_f64, value_as_string,
};
use crate::health::SyncDaemonState;

pub const MAX_SYNC_ACTIONS: usize = 2;

pub const PAIRING_HINT: &str =
    "Copy this command and run it on the other device. Use --include/--exclude to control which projects sync.";

/// `GET /api/sync/status` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatusPayload {
    #[serde(default, deserialize_with = "object_or_none")]
    pub status: Option<SyncStatus>,
    #[serde(default)]
    pub peers: Vec<SyncPeer>,
    #[serde(default)]
    pub attempts: Vec<SyncAttempt>,
}

fn object_or_none<'de, D>(deserializer: D) -> Result<Option<SyncStatus>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if !value.is_object() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeStatus {
    #[serde(default)]
    pub last_ping_at: Option<String>,
    #[serde(default)]
    pub seconds_since_last: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    #[serde(default)]
    pub daemon_state: SyncDaemonState,
    #[serde(default)]
    pub daemon_detail: Option<String>,
    #[serde(default)]
    pub enabled: Value,
    #[serde(default)]
    pub pending: Value,
    #[serde(default)]
    pub last_sync_at: Option<String>,
    #[serde(default)]
    pub last_sync_at_utc: Option<String>,
    #[serde(default)]
    pub last_ping_at: Option<String>,
    #[serde(default)]
    pub last_sync_error: Option<String>,
    #[serde(default)]
    pub last_ping_error: Option<String>,
    #[serde(default)]
    pub peers: Map<String, Value>,
    #[serde(default)]
    pub ping: ProbeStatus,
    #[serde(default)]
    pub sync: ProbeStatus,
}

impl SyncStatus {
    /// Only an explicit boolean counts.
    pub fn enabled(&self) -> Option<bool> {
        self.enabled.as_bool()
    }

    pub fn last_sync_at(&self) -> Option<&str> {
        non_empty(self.last_sync_at.as_deref()).or(non_empty(self.last_sync_at_utc.as_deref()))
    }

    pub fn last_ping_at(&self) -> Option<&str> {
        non_empty(self.ping.last_ping_at.as_deref()).or(non_empty(self.last_ping_at.as_deref()))
    }

    pub fn pending(&self) -> i64 {
        value_as_f64(Some(&self.pending)).unwrap_or(0.0) as i64
    }

    pub fn disabled(&self) -> bool {
        self.daemon_state == SyncDaemonState::Disabled || self.enabled() == Some(false)
    }

    /// Errors from the last sync and ping, joined.
    pub fn error_line(&self) -> Option<String> {
        let parts: Vec<&str> = [self.last_sync_error.as_deref(), self.last_ping_error.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" · "))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerStatus {
    #[serde(default)]
    pub sync_status: Option<String>,
    #[serde(default)]
    pub ping_status: Option<String>,
    #[serde(default)]
    pub last_sync_at: Option<String>,
    #[serde(default)]
    pub last_sync_at_utc: Option<String>,
    #[serde(default)]
    pub last_ping_at: Option<String>,
    #[serde(default)]
    pub last_ping_at_utc: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncPeer {
    #[serde(default)]
    pub peer_device_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub addresses: Vec<Value>,
    #[serde(default)]
    pub status: PeerStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncAttempt {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub started_at_utc: Option<String>,
}

fn ipv4_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,3}\.\d{1,3})\.\d{1,3}\.\d{1,3}\b").expect("static regex")
    })
}

/// Keeps the network prefix of IPv4 addresses: `192.168.1.20` → `192.168.#.#`.
pub fn redact_ip_octets(text: &str) -> String {
    ipv4_re().replace_all(text, "$1.#.#").into_owned()
}

fn maybe_redact(address: &str, redact: bool) -> String {
    if redact {
        redact_ip_octets(address)
    } else {
        address.to_string()
    }
}

/// Non-empty addresses, first occurrence wins.
pub fn unique_addresses(addresses: &[Value]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for addr in addresses.iter().filter_map(|v| value_as_string(Some(v))) {
        if !addr.is_empty() && !out.contains(&addr) {
            out.push(addr);
        }
    }
    out
}

pub fn primary_address(addresses: &[Value]) -> Option<String> {
    let first = addresses
        .iter()
        .find(|v| is_truthy(v))?;
    first.as_str().map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncAction {
    pub label: String,
    pub command: String,
}

impl SyncAction {
    fn new(label: &str, command: &str) -> Self {
        Self {
            label: label.to_string(),
            command: command.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticItem {
    pub label: String,
    pub value: String,
}

impl DiagnosticItem {
    fn new(label: &str, value: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerView {
    pub display_name: String,
    pub peer_device_id: Option<String>,
    pub online: bool,
    pub primary_address: Option<String>,
    pub address_line: String,
    pub meta: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptView {
    pub status: String,
    pub address: String,
    pub time: String,
}

/// Derived sync panel content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncView {
    pub state_label: String,
    pub meta: String,
    pub diagnostics: Vec<DiagnosticItem>,
    pub actions: Vec<SyncAction>,
    pub peers: Vec<PeerView>,
    pub attempts: Vec<AttemptView>,
}

impl SyncView {
    pub fn unavailable() -> Self {
        Self {
            state_label: "Unknown".to_string(),
            meta: "Sync unavailable".to_string(),
            diagnostics: Vec::new(),
            actions: Vec::new(),
            peers: Vec::new(),
            attempts: Vec::new(),
        }
    }

    pub fn loading() -> Self {
        Self {
            meta: "Loading sync status…".to_string(),
            ..Self::unavailable()
        }
    }

    pub fn build(payload: &SyncStatusPayload, redact: bool, now: DateTime<Utc>) -> Self {
        let peers = payload
            .peers
            .iter()
            .map(|p| peer_view(p, redact))
            .collect();
        let attempts = payload
            .attempts
            .iter()
            .map(|a| attempt_view(a, redact))
            .collect();
        let Some(status) = payload.status.as_ref() else {
            return Self {
                peers,
                attempts,
                ..Self::loading()
            };
        };

        let state = &status.daemon_state;
        let state_label = state.label();
        let disabled = status.disabled();
        let peer_count = status.peers.len();
        let no_peers = !disabled && peer_count == 0;
        let pending = status.pending();
        let ago = |ts: Option<&str>| match ts {
            Some(_) => format!("{} ago", format_age_short(seconds_since(ts, now))),
            None => "never".to_string(),
        };
        let last_sync = ago(status.last_sync_at());

        let mut meta_parts: Vec<String> = if disabled {
            vec!["State: Disabled".into(), "Sync is optional and currently off".into()]
        } else if no_peers {
            vec!["State: No peers".into(), "Add peers to enable replication".into()]
        } else {
            vec![
                format!("State: {state_label}"),
                format!("Peers: {peer_count}"),
                format!("Last sync: {last_sync}"),
            ]
        };
        if *state == SyncDaemonState::OfflinePeers {
            meta_parts.push("All peers are currently offline; sync will resume automatically".into());
        }
        if let Some(detail) = non_empty(status.daemon_detail.as_deref()) {
            if *state == SyncDaemonState::Stopped {
                meta_parts.push(format!("Detail: {detail}"));
            }
        }

        let mut diagnostics = if disabled {
            vec![
                DiagnosticItem::new("State", "Disabled"),
                DiagnosticItem::new("Mode", "Optional"),
                DiagnosticItem::new("Pending events", pending.to_string()),
                DiagnosticItem::new("Last sync", "n/a"),
            ]
        } else if no_peers {
            vec![
                DiagnosticItem::new("State", "No peers"),
                DiagnosticItem::new("Mode", "Idle"),
                DiagnosticItem::new("Pending events", pending.to_string()),
                DiagnosticItem::new("Last sync", "n/a"),
            ]
        } else {
            vec![
                DiagnosticItem::new("State", state_label.clone()),
                DiagnosticItem::new("Pending events", pending.to_string()),
                DiagnosticItem::new("Last sync", last_sync),
                DiagnosticItem::new("Last ping", ago(status.last_ping_at())),
            ]
        };
        let active = !disabled && !no_peers;
        let error_line = status.error_line();
        if active {
            if let Some(errors) = &error_line {
                diagnostics.push(DiagnosticItem::new(errors, "Errors"));
            }
            for (probe, label) in [(&status.sync, "Since last sync"), (&status.ping, "Since last ping")] {
                if let Some(secs) = value_as_f64(Some(&probe.seconds_since_last)).filter(|s| *s != 0.0) {
                    diagnostics.push(DiagnosticItem::new(label, format!("{secs}s")));
                }
            }
        }

        let mut actions = Vec::new();
        let quiet = no_peers || *state == SyncDaemonState::OfflinePeers;
        if quiet {
            // informational only
        } else if *state == SyncDaemonState::Stopped {
            actions.push(SyncAction::new("Sync daemon is stopped. Start it.", "uv run codemem sync start"));
            actions.push(SyncAction::new("Then run one immediate sync pass.", "uv run codemem sync once"));
        } else if error_line.is_some() || *state == SyncDaemonState::Error {
            actions.push(SyncAction::new(
                "Sync reports errors. Restart now.",
                "uv run codemem sync restart && uv run codemem sync once",
            ));
            actions.push(SyncAction::new("Then run doctor for root cause.", "uv run codemem sync doctor"));
        } else if active && pending > 0 {
            actions.push(SyncAction::new(
                "Pending sync work detected. Run one pass now.",
                "uv run codemem sync once",
            ));
        }
        actions.truncate(MAX_SYNC_ACTIONS);

        Self {
            state_label,
            meta: meta_parts.join(" · "),
            diagnostics,
            actions,
            peers,
            attempts,
        }
    }
}

fn peer_view(peer: &SyncPeer, redact: bool) -> PeerView {
    let peer_id = non_empty(peer.peer_device_id.as_deref()).map(str::to_string);
    let display_name = non_empty(peer.name.as_deref())
        .map(str::to_string)
        .or_else(|| peer_id.as_ref().map(|id| id.chars().take(8).collect()))
        .unwrap_or_else(|| "unknown".to_string());
    let status = &peer.status;
    let online = status.sync_status.as_deref() == Some("ok") || status.ping_status.as_deref() == Some("ok");

    let addresses = unique_addresses(&peer.addresses);
    let address_line = if addresses.is_empty() {
        "No addresses".to_string()
    } else {
        addresses
            .iter()
            .map(|a| maybe_redact(a, redact))
            .collect::<Vec<_>>()
            .join(" · ")
    };

    let last_sync = non_empty(status.last_sync_at.as_deref()).or(non_empty(status.last_sync_at_utc.as_deref()));
    let last_ping = non_empty(status.last_ping_at.as_deref()).or(non_empty(status.last_ping_at_utc.as_deref()));
    let meta = [
        last_sync.map_or("Sync: never".to_string(), |t| format!("Sync: {}", format_timestamp(Some(t)))),
        last_ping.map_or("Ping: never".to_string(), |t| format!("Ping: {}", format_timestamp(Some(t)))),
    ]
    .join(" · ");

    PeerView {
        display_name,
        peer_device_id: peer_id,
        online,
        primary_address: primary_address(&peer.addresses),
        address_line,
        meta,
    }
}

fn attempt_view(attempt: &SyncAttempt, redact: bool) -> AttemptView {
    let address = non_empty(attempt.address.as_deref());
    let address = match (address, redact) {
        (Some(a), true) => redact_ip_octets(a),
        (None, true) => String::new(),
        (Some(a), false) => a.to_string(),
        (None, false) => "n/a".to_string(),
    };
    let time = non_empty(attempt.started_at.as_deref())
        .or(non_empty(attempt.started_at_utc.as_deref()))
        .map(|t| format_timestamp(Some(t)))
        .unwrap_or_default();
    AttemptView {
        status: non_empty(attempt.status.as_deref()).unwrap_or("unknown").to_string(),
        address,
        time,
    }
}

/// What the pairing panel shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PairingView {
    Unavailable { message: String, hint: String },
    Hidden { message: String, hint: String },
    Ready { command: String, hint: String },
}

impl PairingView {
    pub fn build(payload: Option<&Value>) -> Self {
        let Some(obj) = payload.and_then(Value::as_object) else {
            return PairingView::Unavailable {
                message: "Pairing not available".into(),
                hint: "Enable sync and retry.".into(),
            };
        };
        if obj.get("redacted").is_some_and(is_truthy) {
            return PairingView::Hidden {
                message: "Pairing payload hidden".into(),
                hint: "Diagnostics are required to view the pairing payload.".into(),
            };
        }
        PairingView::Ready {
            command: pairing_command(obj),
            hint: PAIRING_HINT.into(),
        }
    }

    pub fn command(&self) -> Option<&str> {
        match self {
            PairingView::Ready { command, .. } => Some(command),
            _ => None,
        }
    }
}

/// `echo '<base64 json>' | base64 -d | codemem sync pair --accept-file -`,
/// with `addresses` forced to an array.
pub fn pairing_command(payload: &Map<String, Value>) -> String {
    let mut safe = payload.clone();
    if !safe.get("addresses").is_some_and(Value::is_array) {
        safe.insert("addresses".into(), Value::Array(Vec::new()));
    }
    let compact = Value::Object(safe).to_string();
    let b64 = BASE64.encode(compact.as_bytes());
    format!("echo '{b64}' | base64 -d | codemem sync pair --accept-file -")
}
