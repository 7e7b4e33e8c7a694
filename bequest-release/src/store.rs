//! Bundle persistence seam and the in-memory reference implementation.
//!
//! The one primitive everything races through is
//! [`BundleStore::update_status`]: transition a bundle's status only if
//! the current status matches the expected pre-state. Confirmation
//! recording is an idempotent upsert keyed by `(bundle, trustee)`, and
//! delivery claims are a one-shot flag with the same key.

use crate::bundle::{Bundle, ReleaseStatus};
use crate::error::{ReleaseError, ReleaseResult};
use bequest_types::{BundleId, TrusteeId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Persistence contract for release bundles.
pub trait BundleStore: Send + Sync {
    fn get(&self, id: BundleId) -> ReleaseResult<Bundle>;

    /// Creates or replaces a bundle unconditionally. Used for initial
    /// persistence of a fully-built bundle, never for racing transitions.
    fn insert(&self, bundle: Bundle) -> ReleaseResult<()>;

    /// Replaces a bundle's record only if its stored status equals
    /// `expected`. Returns false when the guard fails. Used for mutations
    /// that touch more than the status field (heartbeat bookkeeping).
    fn save_if_status(&self, bundle: &Bundle, expected: ReleaseStatus) -> ReleaseResult<bool>;

    /// The compare-and-set primitive: transition `id` from `expected` to
    /// `new`, returning false if the stored status no longer matches.
    fn update_status(
        &self,
        id: BundleId,
        expected: ReleaseStatus,
        new: ReleaseStatus,
    ) -> ReleaseResult<bool>;

    /// Records a trustee confirmation. Idempotent: recording the same
    /// `(bundle, trustee)` twice is a no-op, never a double count.
    fn record_confirmation(&self, id: BundleId, trustee: TrusteeId) -> ReleaseResult<()>;

    /// Number of distinct trustees that have confirmed.
    fn confirmed_count(&self, id: BundleId) -> ReleaseResult<usize>;

    /// Claims the one delivery slot for `(bundle, trustee)`. Returns true
    /// exactly once per pair; callers only notify on true.
    fn claim_delivery(&self, id: BundleId, trustee: TrusteeId) -> ReleaseResult<bool>;

    /// Bundles the periodic sweep should evaluate: everything armed and
    /// not paused.
    fn sweep_candidates(&self) -> ReleaseResult<Vec<BundleId>>;

    /// Number of armed (non-draft, non-terminal) bundles an owner has.
    /// Consulted by tier policy at arm time.
    fn armed_bundle_count(&self, owner: UserId) -> ReleaseResult<usize>;

    /// Looks up a bundle by its encoded release token, for release-link
    /// resolution.
    fn find_by_release_token(&self, encoded: &str) -> ReleaseResult<Option<Bundle>>;
}

/// In-memory store used by tests and single-process deployments.
#[derive(Default)]
pub struct MemoryBundleStore {
    bundles: RwLock<HashMap<BundleId, Bundle>>,
    confirmations: RwLock<HashMap<BundleId, HashSet<TrusteeId>>>,
    delivered: RwLock<HashSet<(BundleId, TrusteeId)>>,
}

impl MemoryBundleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BundleStore for MemoryBundleStore {
    fn get(&self, id: BundleId) -> ReleaseResult<Bundle> {
        self.bundles
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(ReleaseError::NotFound(id))
    }

    fn insert(&self, bundle: Bundle) -> ReleaseResult<()> {
        self.bundles.write().unwrap().insert(bundle.id, bundle);
        Ok(())
    }

    fn save_if_status(&self, bundle: &Bundle, expected: ReleaseStatus) -> ReleaseResult<bool> {
        let mut bundles = self.bundles.write().unwrap();
        let stored = bundles
            .get_mut(&bundle.id)
            .ok_or(ReleaseError::NotFound(bundle.id))?;
        if stored.status != expected {
            return Ok(false);
        }
        *stored = bundle.clone();
        Ok(true)
    }

    fn update_status(
        &self,
        id: BundleId,
        expected: ReleaseStatus,
        new: ReleaseStatus,
    ) -> ReleaseResult<bool> {
        let mut bundles = self.bundles.write().unwrap();
        let stored = bundles.get_mut(&id).ok_or(ReleaseError::NotFound(id))?;
        if stored.status != expected {
            return Ok(false);
        }
        stored.status = new;
        Ok(true)
    }

    fn record_confirmation(&self, id: BundleId, trustee: TrusteeId) -> ReleaseResult<()> {
        if !self.bundles.read().unwrap().contains_key(&id) {
            return Err(ReleaseError::NotFound(id));
        }
        self.confirmations
            .write()
            .unwrap()
            .entry(id)
            .or_default()
            .insert(trustee);
        Ok(())
    }

    fn confirmed_count(&self, id: BundleId) -> ReleaseResult<usize> {
        Ok(self
            .confirmations
            .read()
            .unwrap()
            .get(&id)
            .map_or(0, HashSet::len))
    }

    fn claim_delivery(&self, id: BundleId, trustee: TrusteeId) -> ReleaseResult<bool> {
        Ok(self.delivered.write().unwrap().insert((id, trustee)))
    }

    fn sweep_candidates(&self) -> ReleaseResult<Vec<BundleId>> {
        Ok(self
            .bundles
            .read()
            .unwrap()
            .values()
            .filter(|b| {
                matches!(
                    b.status,
                    ReleaseStatus::WaitingTimeLock
                        | ReleaseStatus::WaitingHeartbeat
                        | ReleaseStatus::PendingConfirmation
                )
            })
            .map(|b| b.id)
            .collect())
    }

    fn armed_bundle_count(&self, owner: UserId) -> ReleaseResult<usize> {
        Ok(self
            .bundles
            .read()
            .unwrap()
            .values()
            .filter(|b| {
                b.owner == owner && b.status != ReleaseStatus::Draft && !b.status.is_terminal()
            })
            .count())
    }

    fn find_by_release_token(&self, encoded: &str) -> ReleaseResult<Option<Bundle>> {
        Ok(self
            .bundles
            .read()
            .unwrap()
            .values()
            .find(|b| b.release_token == encoded)
            .cloned())
    }
}
