//! Remediation hints shown under the health overview.

use serde::Serialize;

use super::{HealthSignal, SyncDaemonState};

pub const MAX_ACTIONS: usize = 3;

/// Something the operator can do; `trigger_sync` marks actions that also
/// offer an immediate sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthAction {
    pub label: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_label: Option<String>,
    pub trigger_sync: bool,
}

impl HealthAction {
    fn command(label: &str, command: &str) -> Self {
        Self {
            label: label.to_string(),
            command: command.to_string(),
            action_label: None,
            trigger_sync: false,
        }
    }

    fn with_sync_now(mut self) -> Self {
        self.action_label = Some("Sync now".to_string());
        self.trigger_sync = true;
        self
    }
}

/// Backlog first, then a stopped daemon, then unhealthy sync, then stale
/// sync. Low tag coverage is appended while fewer than two hints exist.
pub fn recommend(signal: &HealthSignal, tags_coverage: f64) -> Vec<HealthAction> {
    let mut out = Vec::new();
    let sync_active = signal.sync_active();

    if signal.has_backlog() {
        out.push(HealthAction::command(
            "Pipeline needs attention. Check queue health first.",
            "uv run codemem raw-events-status",
        ));
        out.push(HealthAction::command(
            "Then retry failed batches for impacted sessions.",
            "uv run codemem raw-events-retry <opencode_session_id>",
        ));
    } else if signal.sync_state == SyncDaemonState::Stopped {
        out.push(HealthAction::command(
            "Sync daemon is stopped. Start the background service.",
            "uv run codemem sync start",
        ));
    } else if sync_active
        && matches!(signal.sync_state, SyncDaemonState::Error | SyncDaemonState::Degraded)
    {
        out.push(
            HealthAction::command(
                "Sync is unhealthy. Restart and run one immediate pass.",
                "uv run codemem sync restart",
            )
            .with_sync_now(),
        );
        out.push(HealthAction::command(
            "Then run doctor to see root cause details.",
            "uv run codemem sync doctor",
        ));
    } else if sync_active && signal.sync_looks_stale() {
        out.push(
            HealthAction::command(
                "Sync is stale. Run one immediate sync pass.",
                "uv run codemem sync once",
            )
            .with_sync_now(),
        );
    }

    if tags_coverage > 0.0 && tags_coverage < 0.7 && out.len() < 2 {
        out.push(HealthAction::command(
            "Tag coverage is low. Preview backfill impact.",
            "uv run codemem backfill-tags --dry-run",
        ));
    }

    out.truncate(MAX_ACTIONS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands(actions: &[HealthAction]) -> Vec<&str> {
        actions.iter().map(|a| a.command.as_str()).collect()
    }

    #[test]
    fn backlog_takes_precedence() {
        let s = HealthSignal {
            raw_pending: 300,
            sync_state: SyncDaemonState::Stopped,
            ..Default::default()
        };
        let actions = recommend(&s, 0.5);
        assert_eq!(
            commands(&actions),
            vec!["uv run codemem raw-events-status", "uv run codemem raw-events-retry <opencode_session_id>"]
        );
    }

    #[test]
    fn stopped_daemon_even_without_peers() {
        let s = HealthSignal {
            sync_state: SyncDaemonState::Stopped,
            ..Default::default()
        };
        let actions = recommend(&s, 0.5);
        assert_eq!(
            commands(&actions),
            vec!["uv run codemem sync start", "uv run codemem backfill-tags --dry-run"]
        );
    }

    #[test]
    fn unhealthy_sync_offers_sync_now() {
        let s = HealthSignal {
            sync_state: SyncDaemonState::Degraded,
            peer_count: 1,
            ..Default::default()
        };
        let actions = recommend(&s, 0.1);
        assert_eq!(actions.len(), 2);
        assert!(actions[0].trigger_sync);
        assert_eq!(actions[0].action_label.as_deref(), Some("Sync now"));
        assert!(!actions[1].trigger_sync);
    }

    #[test]
    fn stale_sync_and_tag_coverage() {
        let s = HealthSignal {
            peer_count: 1,
            sync_age_secs: Some(9_000),
            ..Default::default()
        };
        let actions = recommend(&s, 0.3);
        assert_eq!(
            commands(&actions),
            vec!["uv run codemem sync once", "uv run codemem backfill-tags --dry-run"]
        );
        assert!(recommend(&HealthSignal::default(), 0.0).is_empty());
    }
}
