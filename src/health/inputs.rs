//! Maps the free-form backend payloads onto a [`HealthSignal`].

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{HealthSignal, SyncDaemonState};
use crate::format::{format_reduction_percent, parse_percent_value, seconds_since, value_as_f64};
use crate::sync::SyncStatusPayload;

/// Scorer input plus the display-only values the overview cards need.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthInputs {
    pub signal: HealthSignal,
    pub reduction_label: String,
    pub tokens_saved: f64,
    pub tags_coverage: f64,
}

fn path<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(value, |v, k| v.get(*k))
}

fn number(value: &Value, keys: &[&str]) -> f64 {
    value_as_f64(path(value, keys)).unwrap_or(0.0)
}

/// `totals_filtered`, then `totals`, then `totals_global`, then `stats.usage.totals`.
pub fn usage_totals<'a>(usage: &'a Value, stats: &'a Value) -> Option<&'a Value> {
    ["totals_filtered", "totals", "totals_global"]
        .iter()
        .filter_map(|k| usage.get(*k))
        .chain(path(stats, &["usage", "totals"]))
        .find(|v| v.is_object())
}

/// `created_at` of the most recent pack, if any.
pub fn last_pack_at(usage: &Value) -> Option<&str> {
    usage
        .get("recent_packs")
        .and_then(Value::as_array)
        .and_then(|packs| packs.first())
        .and_then(|pack| pack.get("created_at"))
        .and_then(Value::as_str)
}

impl HealthInputs {
    pub fn from_payloads(
        stats: &Value,
        usage: &Value,
        raw_events: &Value,
        sync: Option<&SyncStatusPayload>,
        now: DateTime<Utc>,
    ) -> Self {
        let totals = usage_totals(usage, stats).cloned().unwrap_or(Value::Null);
        let saved = number(&totals, &["tokens_saved"]);
        let read = number(&totals, &["tokens_read"]);
        let reduction_label = format_reduction_percent(saved, read);

        let status = sync.and_then(|s| s.status.as_ref());
        let last_sync_at = status.and_then(|s| s.last_sync_at());

        let signal = HealthSignal {
            raw_pending: number(raw_events, &["pending"]).max(0.0) as u64,
            errored_batches: number(stats, &["reliability", "counts", "errored_batches"]).max(0.0) as u64,
            flush_success_rate: value_as_f64(path(stats, &["reliability", "rates", "flush_success_rate"]))
                .unwrap_or(1.0),
            dropped_rate: number(stats, &["reliability", "rates", "dropped_event_rate"]),
            sync_state: status
                .map(|s| s.daemon_state.clone())
                .unwrap_or_else(SyncDaemonState::default),
            sync_enabled: status.and_then(|s| s.enabled()),
            peer_count: sync.map_or(0, |s| s.peers.len()),
            sync_age_secs: seconds_since(last_sync_at, now),
            reduction_percent: parse_percent_value(&reduction_label),
            pack_age_secs: seconds_since(last_pack_at(usage), now),
        };

        Self {
            signal,
            reduction_label,
            tokens_saved: saved,
            tags_coverage: number(stats, &["database", "tags_coverage"]),
        }
    }
}
