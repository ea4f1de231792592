//! Additive risk scoring.
//!
//! Each rule adds points and pushes its driver phrase; drivers keep rule order.
//! Only the rules chained with `else` are mutually exclusive.

use super::{HealthReport, HealthSignal, HealthStatus, SyncDaemonState};

pub const BACKLOG_PENDING: u64 = 200;
pub const HIGH_BACKLOG_PENDING: u64 = 1_000;
pub const SYNC_STALE_SECS: i64 = 7_200;
pub const SYNC_NOT_RECENT_SECS: i64 = 1_800;
pub const PACK_OLD_SECS: i64 = 86_400;

pub const ATTENTION_THRESHOLD: u32 = 60;
pub const DEGRADED_THRESHOLD: u32 = 25;

#[derive(Default)]
struct Tally {
    score: u32,
    drivers: Vec<String>,
}

impl Tally {
    fn add(&mut self, points: u32, driver: &str) {
        self.score += points;
        self.drivers.push(driver.to_string());
    }
}

pub fn status_for(score: u32) -> HealthStatus {
    if score >= ATTENTION_THRESHOLD {
        HealthStatus::Attention
    } else if score >= DEGRADED_THRESHOLD {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

pub fn score(signal: &HealthSignal) -> HealthReport {
    let mut t = Tally::default();

    if signal.raw_pending >= HIGH_BACKLOG_PENDING {
        t.add(40, "high raw-event backlog");
    } else if signal.raw_pending >= BACKLOG_PENDING {
        t.add(24, "growing raw-event backlog");
    }

    // errored batches only count while a backlog exists
    if signal.errored_batches > 0 && signal.has_backlog() {
        let points = if signal.errored_batches >= 5 { 10 } else { 6 };
        t.add(points, "batch errors during backlog pressure");
    }

    if signal.flush_success_rate < 0.95 {
        t.add(20, "lower flush success");
    }

    if signal.dropped_rate > 0.02 {
        t.add(24, "high dropped-event rate");
    } else if signal.dropped_rate > 0.005 {
        t.add(10, "non-trivial dropped-event rate");
    }

    if signal.sync_active() {
        match signal.sync_state {
            SyncDaemonState::Error => t.add(36, "sync daemon reports errors"),
            SyncDaemonState::Stopped => t.add(22, "sync daemon stopped"),
            SyncDaemonState::Degraded => t.add(20, "sync daemon degraded"),
            _ => {}
        }
        if signal.sync_offline_peers() {
            t.add(4, "all peers currently offline");
            if signal.sync_looks_stale() {
                t.add(4, "offline peers and sync not recent");
            }
        } else if signal.sync_looks_stale() {
            t.add(26, "sync looks stale");
        } else if signal.sync_age_secs.is_some_and(|age| age > SYNC_NOT_RECENT_SECS) {
            t.add(12, "sync not recent");
        }
    }

    if signal.reduction_percent.is_some_and(|pct| pct < 10.0) {
        t.add(8, "low retrieval reduction");
    }

    if signal.pack_age_secs.is_some_and(|age| age > PACK_OLD_SECS) {
        t.add(12, "memory pack activity is old");
    }

    HealthReport {
        risk_score: t.score,
        status: status_for(t.score),
        drivers: t.drivers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(state: SyncDaemonState) -> HealthSignal {
        HealthSignal {
            sync_state: state,
            peer_count: 2,
            ..Default::default()
        }
    }

    #[test]
    fn thresholds() {
        assert_eq!(status_for(0), HealthStatus::Healthy);
        assert_eq!(status_for(24), HealthStatus::Healthy);
        assert_eq!(status_for(25), HealthStatus::Degraded);
        assert_eq!(status_for(59), HealthStatus::Degraded);
        assert_eq!(status_for(60), HealthStatus::Attention);
    }

    #[test]
    fn backlog_tiers_and_batch_errors() {
        let mut s = HealthSignal {
            raw_pending: 250,
            errored_batches: 2,
            ..Default::default()
        };
        let r = score(&s);
        assert_eq!(r.risk_score, 30);
        assert_eq!(
            r.drivers,
            vec!["growing raw-event backlog", "batch errors during backlog pressure"]
        );

        // no backlog, no batch-error points
        s.raw_pending = 199;
        assert_eq!(score(&s).risk_score, 0);
    }

    #[test]
    fn dropped_rate_tiers() {
        let s = HealthSignal {
            dropped_rate: 0.03,
            flush_success_rate: 0.9,
            ..Default::default()
        };
        let r = score(&s);
        assert_eq!(r.risk_score, 44);
        assert_eq!(r.drivers, vec!["lower flush success", "high dropped-event rate"]);

        let s = HealthSignal {
            dropped_rate: 0.01,
            ..Default::default()
        };
        assert_eq!(score(&s).drivers, vec!["non-trivial dropped-event rate"]);
    }

    #[test]
    fn sync_rules_need_peers_and_enabled() {
        let mut s = active(SyncDaemonState::Stopped);
        s.peer_count = 0;
        assert_eq!(score(&s).risk_score, 0);

        let mut s = active(SyncDaemonState::Error);
        s.sync_enabled = Some(false);
        assert_eq!(score(&s).risk_score, 0);
    }

    #[test]
    fn stale_and_not_recent_sync() {
        let mut s = active(SyncDaemonState::Other("idle".into()));
        s.sync_age_secs = Some(7_201);
        assert_eq!(score(&s).drivers, vec!["sync looks stale"]);
        s.sync_age_secs = Some(1_801);
        assert_eq!(score(&s).risk_score, 12);
        s.sync_age_secs = Some(1_800);
        assert_eq!(score(&s).risk_score, 0);
    }

    #[test]
    fn stopped_and_stale_stack() {
        let mut s = active(SyncDaemonState::Stopped);
        s.sync_age_secs = Some(10_000);
        let r = score(&s);
        assert_eq!(r.risk_score, 48);
        assert_eq!(r.status, HealthStatus::Degraded);
        assert_eq!(r.drivers, vec!["sync daemon stopped", "sync looks stale"]);
    }

    #[test]
    fn retrieval_and_pack_age() {
        let s = HealthSignal {
            reduction_percent: Some(9.0),
            pack_age_secs: Some(90_000),
            ..Default::default()
        };
        let r = score(&s);
        assert_eq!(r.risk_score, 20);
        assert_eq!(r.drivers, vec!["low retrieval reduction", "memory pack activity is old"]);
    }

    #[test]
    fn everything_at_once_reaches_attention() {
        let s = HealthSignal {
            raw_pending: 5_000,
            errored_batches: 9,
            flush_success_rate: 0.5,
            dropped_rate: 0.5,
            ..active(SyncDaemonState::Error)
        };
        let r = score(&s);
        assert_eq!(r.risk_score, 40 + 10 + 20 + 24 + 36);
        assert_eq!(r.status, HealthStatus::Attention);
        assert_eq!(score(&s), r);
    }
}
