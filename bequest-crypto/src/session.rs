//! Account key provisioning and unlock sessions.
//!
//! The server persists only `{ salt, wrapped data key }` per account. An
//! [`UnlockedSession`] is an explicit object passed to every crypto call,
//! never a process-wide singleton, so concurrent unlock/lock cycles don't
//! interfere.

use crate::envelope::{unwrap_key, wrap_key, KeyEnvelope};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_master_key, ExtractableKey, KdfParams, OpaqueKey, Salt};
use bequest_types::UserId;
use serde::{Deserialize, Serialize};

/// The only account key material that ever persists.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountRecord {
    pub user_id: UserId,
    pub kdf_salt: Salt,
    pub kdf_params: KdfParams,
    pub wrapped_data_key: KeyEnvelope,
}

/// An unlocked account: the data key held in memory for the lifetime of
/// one session. Dropping the session re-locks the account.
pub struct UnlockedSession {
    user_id: UserId,
    data_key: OpaqueKey,
}

impl UnlockedSession {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The data key, usable for encrypt/decrypt/wrap only.
    pub fn data_key(&self) -> &OpaqueKey {
        &self.data_key
    }
}

impl std::fmt::Debug for UnlockedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockedSession")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// Provisions a new account: random salt, derive the master key, generate
/// a fresh data key, wrap it. Returns the record to persist and an
/// already-unlocked session.
pub fn provision_account(
    user_id: UserId,
    passphrase: &str,
    params: KdfParams,
) -> CryptoResult<(AccountRecord, UnlockedSession)> {
    let salt = Salt::random();
    let master_key = derive_master_key(passphrase, &salt, &params)?;

    let data_key = ExtractableKey::generate();
    let wrapped_data_key = wrap_key(&data_key, &master_key)?;

    let record = AccountRecord {
        user_id,
        kdf_salt: salt,
        kdf_params: params,
        wrapped_data_key,
    };
    let session = UnlockedSession {
        user_id,
        data_key: data_key.into_opaque(),
    };
    Ok((record, session))
}

/// Unlocks an account: derive the master key, unwrap the data key.
///
/// Every failure surfaces as the generic [`CryptoError::AccessDenied`]
/// ("wrong passphrase"), regardless of the underlying cause.
pub fn unlock_account(record: &AccountRecord, passphrase: &str) -> CryptoResult<UnlockedSession> {
    let master_key = derive_master_key(passphrase, &record.kdf_salt, &record.kdf_params)?;
    let data_key =
        unwrap_key(&record.wrapped_data_key, &master_key).map_err(|_| CryptoError::AccessDenied)?;

    Ok(UnlockedSession {
        user_id: record.user_id,
        data_key,
    })
}

/// Runs the full unlock workload against a throwaway record and always
/// denies.
///
/// Called for unknown account ids so a probe cannot tell "no such user"
/// from "wrong passphrase" by timing: both paths pay one KDF derivation
/// and one unwrap attempt.
pub fn decoy_unlock(passphrase: &str, params: &KdfParams) -> CryptoError {
    let salt = Salt::random();
    let decoy_wrapping = ExtractableKey::generate().into_opaque();
    let decoy_payload = ExtractableKey::generate();

    // The wrapped key is discarded either way; errors here cannot surface.
    if let (Ok(master_key), Ok(envelope)) = (
        derive_master_key(passphrase, &salt, params),
        wrap_key(&decoy_payload, &decoy_wrapping),
    ) {
        let _ = unwrap_key(&envelope, &master_key);
    }

    CryptoError::AccessDenied
}
