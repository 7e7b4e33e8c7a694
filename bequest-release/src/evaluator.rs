//! Pure trigger evaluation.
//!
//! `evaluate` is a function of its inputs only: the bundle snapshot, the
//! distinct-confirmation count, and a caller-supplied clock. The hourly
//! sweep, on-demand checks, and tests all share one code path.
//! Applying the result happens elsewhere, through the store's
//! compare-and-set.

use crate::bundle::{Bundle, ReleaseMode, ReleaseStatus};
use chrono::{DateTime, Utc};

/// Computes the next status for a bundle, or `None` when nothing changes.
///
/// Idempotent by construction: terminal, paused, and draft bundles always
/// evaluate to `None`. Re-checking a released bundle is a no-op, never an
/// error.
pub fn evaluate(bundle: &Bundle, confirmed: usize, now: DateTime<Utc>) -> Option<ReleaseStatus> {
    match bundle.status {
        ReleaseStatus::WaitingTimeLock => match bundle.mode {
            ReleaseMode::TimeLock { release_at } if now >= release_at => {
                Some(gate_target(bundle, confirmed))
            }
            _ => None,
        },
        ReleaseStatus::WaitingHeartbeat => {
            let due = bundle.heartbeat.as_ref().is_some_and(|hb| hb.is_due(now));
            due.then(|| gate_target(bundle, confirmed))
        }
        ReleaseStatus::PendingConfirmation => bundle
            .condition
            .satisfied(confirmed, bundle.trustees.len())
            .then_some(ReleaseStatus::Released),
        // Draft bundles are not armed; paused bundles accrue nothing;
        // terminal bundles stay put.
        ReleaseStatus::Draft
        | ReleaseStatus::Paused
        | ReleaseStatus::Released
        | ReleaseStatus::Cancelled => None,
    }
}

/// Where a fired trigger lands: straight to `Released` when there is no
/// gate (or the gate is already satisfied by early confirmations),
/// otherwise `PendingConfirmation`.
fn gate_target(bundle: &Bundle, confirmed: usize) -> ReleaseStatus {
    if bundle.condition.satisfied(confirmed, bundle.trustees.len()) {
        ReleaseStatus::Released
    } else {
        ReleaseStatus::PendingConfirmation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{HeartbeatState, ReleaseCondition};
    use bequest_types::{Trustee, UserId};
    use chrono::Duration;

    fn time_lock_bundle(release_at: DateTime<Utc>, condition: ReleaseCondition) -> Bundle {
        let now = Utc::now();
        let mut bundle = Bundle::new(
            UserId::new(),
            "b",
            ReleaseMode::TimeLock { release_at },
            condition,
            "token".into(),
            now,
        );
        bundle.status = ReleaseStatus::WaitingTimeLock;
        bundle.trustees = vec![
            Trustee::new("a@example.com"),
            Trustee::new("b@example.com"),
        ];
        bundle
    }

    #[test]
    fn time_lock_fires_at_release_date() {
        let now = Utc::now();
        let bundle = time_lock_bundle(now - Duration::hours(1), ReleaseCondition::None);
        assert_eq!(evaluate(&bundle, 0, now), Some(ReleaseStatus::Released));

        let not_yet = time_lock_bundle(now + Duration::hours(1), ReleaseCondition::None);
        assert_eq!(evaluate(&not_yet, 0, now), None);
    }

    #[test]
    fn trigger_with_gate_goes_to_pending() {
        let now = Utc::now();
        let bundle = time_lock_bundle(now - Duration::hours(1), ReleaseCondition::All);
        assert_eq!(evaluate(&bundle, 0, now), Some(ReleaseStatus::PendingConfirmation));
    }

    #[test]
    fn trigger_with_satisfied_gate_skips_pending() {
        // Early confirmations count at gate time.
        let now = Utc::now();
        let bundle = time_lock_bundle(now - Duration::hours(1), ReleaseCondition::Any);
        assert_eq!(evaluate(&bundle, 1, now), Some(ReleaseStatus::Released));
    }

    #[test]
    fn heartbeat_fires_past_cadence() {
        let now = Utc::now();
        let mut bundle = Bundle::new(
            UserId::new(),
            "b",
            ReleaseMode::Heartbeat { cadence_days: 30 },
            ReleaseCondition::None,
            "token".into(),
            now,
        );
        bundle.status = ReleaseStatus::WaitingHeartbeat;
        bundle.heartbeat = Some(HeartbeatState {
            cadence_days: 30,
            last_check_in: now - Duration::days(31),
            paused_at: None,
        });

        assert_eq!(evaluate(&bundle, 0, now), Some(ReleaseStatus::Released));
    }

    #[test]
    fn terminal_states_never_evaluate() {
        let now = Utc::now();
        for status in [ReleaseStatus::Released, ReleaseStatus::Cancelled, ReleaseStatus::Paused] {
            let mut bundle = time_lock_bundle(now - Duration::hours(1), ReleaseCondition::None);
            bundle.status = status;
            assert_eq!(evaluate(&bundle, 5, now), None);
        }
    }
}
