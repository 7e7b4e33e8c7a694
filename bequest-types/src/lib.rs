//! Shared identifiers and core types for Bequest.
//!
//! Every id is a uuid newtype so the compiler catches a bundle id being
//! passed where an item id belongs.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a vault owner account.
    UserId
);
uuid_id!(
    /// Unique identifier for a vault item (file, note, credential).
    ItemId
);
uuid_id!(
    /// Unique identifier for a release bundle.
    BundleId
);
uuid_id!(
    /// Unique identifier for a trustee (distinct from UserId; trustees
    /// need no account of their own).
    TrusteeId
);

/// What kind of payload a vault item holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    File,
    Note,
    Credential,
}

/// A designated recipient of a release bundle.
///
/// Trustees are referenced by bundles, never owners of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trustee {
    pub id: TrusteeId,
    pub email: String,
    pub name: Option<String>,
}

impl Trustee {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: TrusteeId::new(),
            email: email.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
