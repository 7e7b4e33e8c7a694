//! Tier policy seam.
//!
//! Billing and quota rules live outside this crate; the engine only asks
//! two questions before arming a bundle.

use bequest_types::UserId;

/// Limits supplied by the external billing/tier system. `None` means
/// unlimited.
pub trait TierPolicy: Send + Sync {
    fn max_armed_bundles(&self, owner: UserId) -> Option<u32>;
    fn max_trustees_per_bundle(&self, owner: UserId) -> Option<u32>;
}

/// No limits. The default for deployments without billing.
pub struct UnlimitedTier;

impl TierPolicy for UnlimitedTier {
    fn max_armed_bundles(&self, _owner: UserId) -> Option<u32> {
        None
    }

    fn max_trustees_per_bundle(&self, _owner: UserId) -> Option<u32> {
        None
    }
}

/// Fixed limits for every owner.
pub struct FixedTier {
    pub max_armed_bundles: u32,
    pub max_trustees_per_bundle: u32,
}

impl TierPolicy for FixedTier {
    fn max_armed_bundles(&self, _owner: UserId) -> Option<u32> {
        Some(self.max_armed_bundles)
    }

    fn max_trustees_per_bundle(&self, _owner: UserId) -> Option<u32> {
        Some(self.max_trustees_per_bundle)
    }
}
