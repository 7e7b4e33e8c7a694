//! Release lifecycle error types.

use crate::bundle::ReleaseStatus;
use bequest_types::BundleId;
use thiserror::Error;

/// Result type for release operations.
pub type ReleaseResult<T> = Result<T, ReleaseError>;

/// Errors that can occur in the release lifecycle.
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("bundle not found: {0}")]
    NotFound(BundleId),

    /// A status precondition failed or a concurrent transition won the
    /// compare-and-set. Re-read and re-evaluate; not fatal.
    #[error("state conflict: expected {expected}, found {actual}")]
    StateConflict {
        expected: ReleaseStatus,
        actual: ReleaseStatus,
    },

    #[error("bundle already released")]
    AlreadyReleased,

    #[error("bundle is not mutable in status {0}")]
    NotMutable(ReleaseStatus),

    /// Trustee-facing: the release link resolves to nothing accessible.
    /// Deliberately neutral; it does not reveal whether the bundle
    /// exists.
    #[error("release not available")]
    NotAvailable,

    #[error("trustee is not a member of this bundle")]
    UnknownTrustee,

    #[error("invalid release condition: {0}")]
    InvalidCondition(String),

    #[error("plan limit reached: {0}")]
    PolicyDenied(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("sweeper channel closed")]
    ChannelClosed,
}
