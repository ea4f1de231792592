//! # Health
//! Weighted risk score over pipeline, retrieval and sync signals, plus the
//! overview cards and remediation hints built on top of it.
//!
//! `scoring` is pure: identical inputs give byte-identical reports.

pub mod actions;
pub mod inputs;
pub mod scoring;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::format::{format_age_short, format_count, title_case};
use crate::sync::SyncStatusPayload;
pub use actions::{recommend, HealthAction};
pub use inputs::HealthInputs;
pub use scoring::score;

/// Daemon states the scorer distinguishes; anything else is carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum SyncDaemonState {
    Disabled,
    Stopped,
    Error,
    Degraded,
    OfflinePeers,
    Other(String),
}

impl Default for SyncDaemonState {
    fn default() -> Self {
        SyncDaemonState::Other("unknown".to_string())
    }
}

impl From<Option<String>> for SyncDaemonState {
    fn from(raw: Option<String>) -> Self {
        raw.map(Self::from).unwrap_or_default()
    }
}

impl From<String> for SyncDaemonState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "disabled" => SyncDaemonState::Disabled,
            "stopped" => SyncDaemonState::Stopped,
            "error" => SyncDaemonState::Error,
            "degraded" => SyncDaemonState::Degraded,
            "offline-peers" => SyncDaemonState::OfflinePeers,
            "" => SyncDaemonState::default(),
            _ => SyncDaemonState::Other(raw),
        }
    }
}

impl From<SyncDaemonState> for String {
    fn from(state: SyncDaemonState) -> Self {
        state.as_str().to_string()
    }
}

impl SyncDaemonState {
    pub fn as_str(&self) -> &str {
        match self {
            SyncDaemonState::Disabled => "disabled",
            SyncDaemonState::Stopped => "stopped",
            SyncDaemonState::Error => "error",
            SyncDaemonState::Degraded => "degraded",
            SyncDaemonState::OfflinePeers => "offline-peers",
            SyncDaemonState::Other(s) => s,
        }
    }

    /// `offline-peers` reads "Offline peers"; everything else is title-cased.
    pub fn label(&self) -> String {
        match self {
            SyncDaemonState::OfflinePeers => "Offline peers".to_string(),
            other => title_case(other.as_str()),
        }
    }
}

/// Scorer input. All fields default to "nothing wrong".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSignal {
    pub raw_pending: u64,
    pub errored_batches: u64,
    pub flush_success_rate: f64,
    pub dropped_rate: f64,
    pub sync_state: SyncDaemonState,
    /// Explicit `enabled` flag from the sync status, when reported.
    pub sync_enabled: Option<bool>,
    pub peer_count: usize,
    pub sync_age_secs: Option<i64>,
    pub reduction_percent: Option<f64>,
    pub pack_age_secs: Option<i64>,
}

impl Default for HealthSignal {
    fn default() -> Self {
        Self {
            raw_pending: 0,
            errored_batches: 0,
            flush_success_rate: 1.0,
            dropped_rate: 0.0,
            sync_state: SyncDaemonState::default(),
            sync_enabled: None,
            peer_count: 0,
            sync_age_secs: None,
            reduction_percent: None,
            pack_age_secs: None,
        }
    }
}

impl HealthSignal {
    pub fn sync_disabled(&self) -> bool {
        self.sync_state == SyncDaemonState::Disabled || self.sync_enabled == Some(false)
    }

    pub fn sync_no_peers(&self) -> bool {
        !self.sync_disabled() && self.peer_count == 0
    }

    /// Sync contributes to the score only when enabled and peered.
    pub fn sync_active(&self) -> bool {
        !self.sync_disabled() && self.peer_count > 0
    }

    pub fn sync_offline_peers(&self) -> bool {
        self.sync_state == SyncDaemonState::OfflinePeers
    }

    pub fn sync_looks_stale(&self) -> bool {
        self.sync_age_secs.is_some_and(|age| age > scoring::SYNC_STALE_SECS)
    }

    pub fn has_backlog(&self) -> bool {
        self.raw_pending >= scoring::BACKLOG_PENDING
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
    Attention,
}

impl HealthStatus {
    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "Healthy",
            HealthStatus::Degraded => "Degraded",
            HealthStatus::Attention => "Attention",
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "status-healthy",
            HealthStatus::Degraded => "status-degraded",
            HealthStatus::Attention => "status-attention",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub risk_score: u32,
    pub status: HealthStatus,
    pub drivers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCard {
    pub label: String,
    pub value: String,
    pub detail: String,
    pub title: String,
}

/// Everything the health panel shows for one refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthOverview {
    pub report: HealthReport,
    pub cards: Vec<HealthCard>,
    pub actions: Vec<HealthAction>,
    pub meta: String,
}

impl HealthOverview {
    pub fn build(inputs: &HealthInputs) -> Self {
        let signal = &inputs.signal;
        let report = score(signal);

        let sync_card_value = if signal.sync_disabled() {
            "Disabled".to_string()
        } else if signal.sync_no_peers() {
            "No peers".to_string()
        } else {
            signal.sync_state.label()
        };
        let sync_age = format_age_short(signal.sync_age_secs);
        let sync_detail = if signal.sync_disabled() {
            "Sync disabled".to_string()
        } else if signal.sync_no_peers() {
            "No peers configured".to_string()
        } else if signal.sync_offline_peers() {
            format!("{} peers offline · last sync {sync_age} ago", signal.peer_count)
        } else {
            format!("{} peers · last sync {sync_age} ago", signal.peer_count)
        };
        let pack_age = format_age_short(signal.pack_age_secs);

        let cards = vec![
            HealthCard {
                label: "Overall health".into(),
                value: report.status.label().into(),
                detail: format!("Weighted score {}", report.risk_score),
                title: if report.drivers.is_empty() {
                    "No major risk signals detected".into()
                } else {
                    format!("Main signals: {}", report.drivers.join(", "))
                },
            },
            HealthCard {
                label: "Pipeline health".into(),
                value: format!("{} pending", format_count(signal.raw_pending as i64)),
                detail: if signal.raw_pending > 0 {
                    "Queue is actively draining".into()
                } else {
                    "Queue is clear".into()
                },
                title: "Raw-event queue pressure and flush reliability".into(),
            },
            HealthCard {
                label: "Retrieval impact".into(),
                value: inputs.reduction_label.clone(),
                detail: format!("{} saved tokens", format_count(inputs.tokens_saved as i64)),
                title: "Reduction from memory reuse across recent usage".into(),
            },
            HealthCard {
                label: "Sync health".into(),
                value: sync_card_value,
                detail: sync_detail,
                title: "Daemon state and sync recency".into(),
            },
            HealthCard {
                label: "Data freshness".into(),
                value: pack_age.clone(),
                detail: format!("last pack {pack_age} ago"),
                title: "Recency of last memory pack activity".into(),
            },
        ];

        let meta = if report.drivers.is_empty() {
            "Healthy right now. Diagnostics stay available if you want details.".to_string()
        } else {
            format!("Why this status: {}.", report.drivers.join(", "))
        };

        Self {
            actions: recommend(signal, inputs.tags_coverage),
            report,
            cards,
            meta,
        }
    }

    /// Convenience over the raw payloads of one refresh cycle.
    pub fn from_payloads(
        stats: &serde_json::Value,
        usage: &serde_json::Value,
        raw_events: &serde_json::Value,
        sync: Option<&SyncStatusPayload>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::build(&HealthInputs::from_payloads(stats, usage, raw_events, sync, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_state_round_trips_known_and_unknown() {
        assert_eq!(SyncDaemonState::from("offline-peers".to_string()), SyncDaemonState::OfflinePeers);
        assert_eq!(SyncDaemonState::from(String::new()).as_str(), "unknown");
        let other = SyncDaemonState::from("running".to_string());
        assert_eq!(other.label(), "Running");
        assert_eq!(SyncDaemonState::OfflinePeers.label(), "Offline peers");
    }

    #[test]
    fn overview_for_quiet_system() {
        let inputs = HealthInputs {
            signal: HealthSignal {
                sync_state: SyncDaemonState::Disabled,
                pack_age_secs: Some(100),
                reduction_percent: Some(50.0),
                ..Default::default()
            },
            reduction_label: "50%".into(),
            tokens_saved: 1200.0,
            tags_coverage: 0.9,
        };
        let overview = HealthOverview::build(&inputs);
        assert_eq!(overview.report.status, HealthStatus::Healthy);
        assert!(overview.actions.is_empty());
        assert_eq!(
            overview.meta,
            "Healthy right now. Diagnostics stay available if you want details."
        );
        let labels: Vec<&str> = overview.cards.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Overall health", "Pipeline health", "Retrieval impact", "Sync health", "Data freshness"]
        );
        assert_eq!(overview.cards[2].detail, "1,200 saved tokens");
        assert_eq!(overview.cards[3].value, "Disabled");
        assert_eq!(overview.cards[4].detail, "last pack 1m ago");
    }

    #[test]
    fn overview_explains_drivers() {
        let inputs = HealthInputs {
            signal: HealthSignal {
                sync_state: SyncDaemonState::OfflinePeers,
                peer_count: 2,
                sync_age_secs: Some(8000),
                ..Default::default()
            },
            reduction_label: "n/a".into(),
            tokens_saved: 0.0,
            tags_coverage: 0.0,
        };
        let overview = HealthOverview::build(&inputs);
        assert_eq!(overview.report.risk_score, 8);
        assert_eq!(
            overview.meta,
            "Why this status: all peers currently offline, offline peers and sync not recent."
        );
        assert_eq!(overview.cards[3].detail, "2 peers offline · last sync 2h ago");
    }
}
