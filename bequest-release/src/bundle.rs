//! Release bundle model: status, trigger mode, confirmation condition and
//! heartbeat bookkeeping.

use crate::error::{ReleaseError, ReleaseResult};
use bequest_crypto::{EncryptedData, KeyEnvelope};
use bequest_types::{BundleId, ItemId, Trustee, TrusteeId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle status of a release bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    /// Built but not armed; tier policy has not been consulted yet.
    Draft,
    /// Armed, waiting for the fixed release date.
    WaitingTimeLock,
    /// Armed, waiting for a missed heartbeat check-in.
    WaitingHeartbeat,
    /// Trigger fired; waiting for trustee confirmations.
    PendingConfirmation,
    /// Heartbeat evaluation suspended by the owner.
    Paused,
    /// Trustees may access the bundle. Terminal.
    Released,
    /// Revoked by the owner. Terminal.
    Cancelled,
}

impl ReleaseStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Released | Self::Cancelled)
    }

    /// The legal transition table. The evaluator and engine only ever
    /// propose transitions this permits; the store's compare-and-set
    /// guards against racing proposers.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ReleaseStatus::*;
        match (self, next) {
            (Draft, WaitingTimeLock | WaitingHeartbeat) => true,
            (WaitingTimeLock, PendingConfirmation | Released) => true,
            (WaitingHeartbeat, PendingConfirmation | Released | Paused) => true,
            (Paused, WaitingHeartbeat) => true,
            (PendingConfirmation, Released) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::WaitingTimeLock => "waiting-time-lock",
            Self::WaitingHeartbeat => "waiting-heartbeat",
            Self::PendingConfirmation => "pending-confirmation",
            Self::Paused => "paused",
            Self::Released => "released",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What triggers a bundle's release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ReleaseMode {
    /// Release at a fixed date.
    TimeLock { release_at: DateTime<Utc> },
    /// Release when the owner misses a check-in past the cadence.
    Heartbeat { cadence_days: u32 },
}

/// Optional multi-trustee confirmation gate between trigger and release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "n")]
pub enum ReleaseCondition {
    /// No gate: trigger releases directly.
    None,
    /// Every trustee must confirm.
    All,
    /// Any single trustee confirmation suffices.
    Any,
    /// At least N distinct trustees must confirm.
    Count(u32),
}

impl ReleaseCondition {
    /// Number of distinct confirmations required, or `None` when there is
    /// no gate.
    pub fn required(self, trustee_count: usize) -> Option<usize> {
        match self {
            Self::None => None,
            Self::All => Some(trustee_count),
            Self::Any => Some(1),
            Self::Count(n) => Some(n as usize),
        }
    }

    /// Whether `confirmed` distinct confirmations satisfy the gate.
    pub fn satisfied(self, confirmed: usize, trustee_count: usize) -> bool {
        match self.required(trustee_count) {
            None => true,
            Some(required) => confirmed >= required,
        }
    }
}

/// Heartbeat bookkeeping for a heartbeat-mode bundle.
///
/// Invariant: the next deadline is `last_check_in + cadence`; while paused
/// there is no deadline at all, and resuming restarts the window from the
/// resume timestamp so paused time never accrues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatState {
    pub cadence_days: u32,
    pub last_check_in: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
}

impl HeartbeatState {
    pub fn start(cadence_days: u32, now: DateTime<Utc>) -> Self {
        Self {
            cadence_days,
            last_check_in: now,
            paused_at: None,
        }
    }

    /// `None` while paused; a paused bundle has no deadline.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        if self.paused_at.is_some() {
            return None;
        }
        Some(self.last_check_in + Duration::days(i64::from(self.cadence_days)))
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_deadline().is_some_and(|deadline| now >= deadline)
    }

    pub fn check_in(&mut self, now: DateTime<Utc>) {
        self.last_check_in = now;
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        self.paused_at = Some(now);
    }

    /// Clears the pause and restarts the cadence window at `now`.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        self.paused_at = None;
        self.last_check_in = now;
    }
}

/// A release bundle: a named set of re-wrapped item keys, the trustees who
/// receive them, and the trigger that decides when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub id: BundleId,
    pub owner: UserId,
    pub name: String,
    pub status: ReleaseStatus,
    pub mode: ReleaseMode,
    pub condition: ReleaseCondition,
    pub trustees: Vec<Trustee>,
    /// Item content keys re-wrapped under the bundle key. The item
    /// ciphertext itself lives in object storage, untouched.
    pub wrapped_keys: HashMap<ItemId, KeyEnvelope>,
    /// Owner's note to trustees, encrypted under the bundle key.
    pub note: Option<EncryptedData>,
    /// Heartbeat bookkeeping; populated at arm time for heartbeat mode.
    pub heartbeat: Option<HeartbeatState>,
    /// Encoded release token, kept as an opaque delivery credential for
    /// the trustees' release links. The core never derives a key from it.
    pub release_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bundle {
    pub fn new(
        owner: UserId,
        name: impl Into<String>,
        mode: ReleaseMode,
        condition: ReleaseCondition,
        release_token: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BundleId::new(),
            owner,
            name: name.into(),
            status: ReleaseStatus::Draft,
            mode,
            condition,
            trustees: Vec::new(),
            wrapped_keys: HashMap::new(),
            note: None,
            heartbeat: None,
            release_token,
            created_at: now,
            updated_at: now,
        }
    }

    /// The waiting status this bundle enters when armed.
    pub fn waiting_status(&self) -> ReleaseStatus {
        match self.mode {
            ReleaseMode::TimeLock { .. } => ReleaseStatus::WaitingTimeLock,
            ReleaseMode::Heartbeat { .. } => ReleaseStatus::WaitingHeartbeat,
        }
    }

    /// Owner mutations are allowed only before the trigger fires.
    pub fn is_mutable(&self) -> bool {
        matches!(
            self.status,
            ReleaseStatus::Draft | ReleaseStatus::WaitingTimeLock | ReleaseStatus::WaitingHeartbeat
        )
    }

    fn ensure_mutable(&self) -> ReleaseResult<()> {
        if self.is_mutable() {
            Ok(())
        } else {
            Err(ReleaseError::NotMutable(self.status))
        }
    }

    pub fn add_trustee(&mut self, trustee: Trustee) -> ReleaseResult<()> {
        self.ensure_mutable()?;
        if !self.trustees.iter().any(|t| t.id == trustee.id) {
            self.trustees.push(trustee);
        }
        Ok(())
    }

    pub fn remove_trustee(&mut self, trustee_id: TrusteeId) -> ReleaseResult<()> {
        self.ensure_mutable()?;
        self.trustees.retain(|t| t.id != trustee_id);
        Ok(())
    }

    pub fn add_item(&mut self, item_id: ItemId, wrapped_key: KeyEnvelope) -> ReleaseResult<()> {
        self.ensure_mutable()?;
        self.wrapped_keys.insert(item_id, wrapped_key);
        Ok(())
    }

    pub fn remove_item(&mut self, item_id: ItemId) -> ReleaseResult<()> {
        self.ensure_mutable()?;
        self.wrapped_keys.remove(&item_id);
        Ok(())
    }

    pub fn has_trustee(&self, trustee_id: TrusteeId) -> bool {
        self.trustees.iter().any(|t| t.id == trustee_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn terminal_states_accept_no_transitions() {
        use ReleaseStatus::*;
        for next in [
            Draft,
            WaitingTimeLock,
            WaitingHeartbeat,
            PendingConfirmation,
            Paused,
            Released,
            Cancelled,
        ] {
            assert!(!Released.can_transition_to(next));
            assert!(!Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn cancel_reachable_from_all_non_terminal_states() {
        use ReleaseStatus::*;
        for from in [Draft, WaitingTimeLock, WaitingHeartbeat, PendingConfirmation, Paused] {
            assert!(from.can_transition_to(Cancelled));
        }
    }

    #[test]
    fn paused_heartbeat_has_no_deadline() {
        let t0 = now();
        let mut hb = HeartbeatState::start(30, t0);
        assert!(hb.next_deadline().is_some());

        hb.pause(t0);
        assert_eq!(hb.next_deadline(), None);
        assert!(!hb.is_due(t0 + Duration::days(365)));
    }

    #[test]
    fn resume_restarts_cadence_from_resume_time() {
        let t0 = now();
        let mut hb = HeartbeatState::start(30, t0);
        hb.pause(t0 + Duration::days(5));

        // Resume long past the original deadline
        let resume_at = t0 + Duration::days(90);
        hb.resume(resume_at);

        assert_eq!(hb.next_deadline(), Some(resume_at + Duration::days(30)));
        assert!(!hb.is_due(resume_at + Duration::days(29)));
        assert!(hb.is_due(resume_at + Duration::days(30)));
    }

    #[test]
    fn condition_thresholds() {
        assert_eq!(ReleaseCondition::None.required(5), None);
        assert_eq!(ReleaseCondition::All.required(5), Some(5));
        assert_eq!(ReleaseCondition::Any.required(5), Some(1));
        assert_eq!(ReleaseCondition::Count(3).required(5), Some(3));

        assert!(ReleaseCondition::Count(3).satisfied(3, 5));
        assert!(!ReleaseCondition::Count(3).satisfied(2, 5));
    }

    #[test]
    fn mutations_rejected_after_trigger() {
        let mut bundle = Bundle::new(
            UserId::new(),
            "estate",
            ReleaseMode::Heartbeat { cadence_days: 30 },
            ReleaseCondition::None,
            "token".into(),
            now(),
        );
        bundle.status = ReleaseStatus::PendingConfirmation;

        let err = bundle.add_trustee(Trustee::new("heir@example.com")).unwrap_err();
        assert!(matches!(err, ReleaseError::NotMutable(ReleaseStatus::PendingConfirmation)));
    }
}
