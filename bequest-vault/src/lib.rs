//! Account sessions and item/bundle orchestration.
//!
//! Ties the crypto core to the persistence seams: signup and unlock
//! produce an [`UnlockedSession`], items are sealed and opened through it,
//! and release bundles are built all-or-nothing before anything persists.
//! Encryption keys never leave the session; stores only ever see
//! ciphertext and wrapped-key envelopes.

use bequest_crypto::{
    create_item, decoy_unlock, decrypt, derive_bundle_key, open_bundle_note, open_item,
    provision_account, reencrypt_item_content, unlock_account, wrap_bundle_note,
    wrap_item_for_bundle, AccountRecord, CryptoError, KdfParams, ReleaseToken, SealedItem,
    UnlockedSession,
};
use bequest_release::{Bundle, ReleaseCondition, ReleaseError, ReleaseMode, ReleaseStatus};
use bequest_types::{ItemId, ItemKind, Trustee, UserId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};

// ============================================================================
// Error types
// ============================================================================

const MIN_PASSPHRASE_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("passphrase too short (min {MIN_PASSPHRASE_LEN} characters)")]
    PassphraseTooShort,
    #[error("account already provisioned")]
    AlreadyProvisioned,
    /// Wrong passphrase, unknown account, or an item the session does not
    /// own: deliberately the same error for all three.
    #[error("access denied")]
    AccessDenied,
    #[error("missing key material for item {0}")]
    MissingKeyMaterial(ItemId),
    /// Trustee-facing: the bundle is not (or not yet) accessible. Neutral
    /// on whether it exists at all.
    #[error("release not available")]
    NotAvailable,
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("release error: {0}")]
    Release(#[from] ReleaseError),
    #[error("storage error: {0}")]
    Storage(String),
}

pub type VaultResult<T> = Result<T, VaultError>;

// ============================================================================
// Persistence seams
// ============================================================================

/// Account record persistence. Only salt and wrapped key material ever
/// cross this boundary.
pub trait AccountStore: Send + Sync {
    fn get(&self, user_id: UserId) -> VaultResult<Option<AccountRecord>>;
    fn insert(&self, record: AccountRecord) -> VaultResult<()>;
}

/// One persisted vault item: sealed content plus bookkeeping.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct StoredItem {
    pub id: ItemId,
    pub owner: UserId,
    pub kind: ItemKind,
    pub version: u32,
    pub sealed: SealedItem,
}

/// Item persistence. Ciphertext and envelopes only.
pub trait ItemStore: Send + Sync {
    fn get(&self, item_id: ItemId) -> VaultResult<Option<StoredItem>>;
    fn save(&self, item: StoredItem) -> VaultResult<()>;
}

/// In-memory account store for tests and single-process use.
#[derive(Default)]
pub struct MemoryAccountStore {
    records: RwLock<HashMap<UserId, AccountRecord>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for MemoryAccountStore {
    fn get(&self, user_id: UserId) -> VaultResult<Option<AccountRecord>> {
        Ok(self.records.read().unwrap().get(&user_id).cloned())
    }

    fn insert(&self, record: AccountRecord) -> VaultResult<()> {
        self.records.write().unwrap().insert(record.user_id, record);
        Ok(())
    }
}

/// In-memory item store for tests and single-process use.
#[derive(Default)]
pub struct MemoryItemStore {
    items: RwLock<HashMap<ItemId, StoredItem>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ItemStore for MemoryItemStore {
    fn get(&self, item_id: ItemId) -> VaultResult<Option<StoredItem>> {
        Ok(self.items.read().unwrap().get(&item_id).cloned())
    }

    fn save(&self, item: StoredItem) -> VaultResult<()> {
        self.items.write().unwrap().insert(item.id, item);
        Ok(())
    }
}

// ============================================================================
// Vault — session and item orchestration
// ============================================================================

/// What goes into a new release bundle.
#[derive(Debug, Clone)]
pub struct BundleSpec {
    pub name: String,
    pub item_ids: Vec<ItemId>,
    pub trustees: Vec<Trustee>,
    pub mode: ReleaseMode,
    pub condition: ReleaseCondition,
    /// Owner's message to trustees; encrypted under the bundle key.
    pub note: Option<String>,
}

/// The vault façade: accounts, sessions, items, and bundle building.
pub struct Vault<A, I> {
    accounts: A,
    items: I,
    kdf_params: KdfParams,
}

impl<A: AccountStore, I: ItemStore> Vault<A, I> {
    pub fn new(accounts: A, items: I) -> Self {
        Self {
            accounts,
            items,
            kdf_params: KdfParams::default(),
        }
    }

    /// Overrides the KDF cost profile (tests use the cheap one).
    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf_params = params;
        self
    }

    pub fn items(&self) -> &I {
        &self.items
    }

    // ------------------------------------------------------------------
    // Accounts and sessions
    // ------------------------------------------------------------------

    /// Provisions a new account and returns an already-unlocked session.
    pub fn signup(&self, user_id: UserId, passphrase: &str) -> VaultResult<UnlockedSession> {
        if passphrase.len() < MIN_PASSPHRASE_LEN {
            return Err(VaultError::PassphraseTooShort);
        }
        if self.accounts.get(user_id)?.is_some() {
            return Err(VaultError::AlreadyProvisioned);
        }

        let (record, session) = provision_account(user_id, passphrase, self.kdf_params.clone())?;
        self.accounts.insert(record)?;
        info!(user = %user_id, "account provisioned");
        Ok(session)
    }

    /// Unlocks an account with its passphrase.
    ///
    /// Unknown accounts take the decoy path (the same KDF work as a real
    /// unlock) so response timing does not reveal whether the account
    /// exists. Either way the caller sees only [`VaultError::AccessDenied`].
    pub fn unlock(&self, user_id: UserId, passphrase: &str) -> VaultResult<UnlockedSession> {
        match self.accounts.get(user_id)? {
            Some(record) => {
                unlock_account(&record, passphrase).map_err(|_| VaultError::AccessDenied)
            }
            None => {
                let _ = decoy_unlock(passphrase, &self.kdf_params);
                Err(VaultError::AccessDenied)
            }
        }
    }

    // ------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------

    /// Seals a new item under the session's data key and persists it.
    pub fn create_item(
        &self,
        session: &UnlockedSession,
        kind: ItemKind,
        plaintext: &[u8],
    ) -> VaultResult<ItemId> {
        let sealed = create_item(plaintext, session.data_key())?;
        let item = StoredItem {
            id: ItemId::new(),
            owner: session.user_id(),
            kind,
            version: 1,
            sealed,
        };
        let id = item.id;
        self.items.save(item)?;
        debug!(user = %session.user_id(), item = %id, "item created");
        Ok(id)
    }

    /// Opens an item the session owns.
    pub fn open_item(&self, session: &UnlockedSession, item_id: ItemId) -> VaultResult<Vec<u8>> {
        let item = self.fetch_owned(session, item_id)?;
        open_item(&item.sealed, session.data_key()).map_err(|e| match e {
            CryptoError::AccessDenied => VaultError::AccessDenied,
            other => VaultError::Crypto(other),
        })
    }

    /// Replaces an item's content, reusing its content key so existing
    /// bundle wrappings stay valid. Bumps the version.
    pub fn update_item_content(
        &self,
        session: &UnlockedSession,
        item_id: ItemId,
        new_plaintext: &[u8],
    ) -> VaultResult<()> {
        let mut item = self.fetch_owned(session, item_id)?;
        item.sealed = reencrypt_item_content(&item.sealed, new_plaintext, session.data_key())?;
        item.version += 1;
        self.items.save(item)
    }

    fn fetch_owned(&self, session: &UnlockedSession, item_id: ItemId) -> VaultResult<StoredItem> {
        let item = self
            .items
            .get(item_id)?
            .ok_or(VaultError::MissingKeyMaterial(item_id))?;
        if item.owner != session.user_id() {
            return Err(VaultError::AccessDenied);
        }
        Ok(item)
    }

    // ------------------------------------------------------------------
    // Bundles
    // ------------------------------------------------------------------

    /// Builds a release bundle: every selected item's content key is
    /// re-wrapped under a fresh bundle key derived from a fresh release
    /// token.
    ///
    /// All-or-nothing: every item envelope is fetched and re-wrapped
    /// before anything is returned for persistence, so a partially
    /// wrapped bundle can never be observed. Any missing item fails the
    /// whole operation with [`VaultError::MissingKeyMaterial`].
    ///
    /// The returned bundle is in `Draft`; persist it and arm it through
    /// the release engine. The token must reach the trustees through the
    /// owner's delivery links, since it is the only way to derive the
    /// bundle key.
    pub fn build_bundle(
        &self,
        session: &UnlockedSession,
        spec: BundleSpec,
        now: DateTime<Utc>,
    ) -> VaultResult<(Bundle, ReleaseToken)> {
        // Fetch first, fail fast: no crypto work happens unless every
        // referenced item is present and owned.
        let mut fetched = Vec::with_capacity(spec.item_ids.len());
        for item_id in &spec.item_ids {
            fetched.push(self.fetch_owned(session, *item_id)?);
        }

        let token = ReleaseToken::generate();
        let bundle_key = derive_bundle_key(&token)?;

        let mut bundle = Bundle::new(
            session.user_id(),
            spec.name,
            spec.mode,
            spec.condition,
            token.encode(),
            now,
        );
        for trustee in spec.trustees {
            bundle.add_trustee(trustee)?;
        }
        for item in &fetched {
            let wrapped =
                wrap_item_for_bundle(&item.sealed.key_envelope, session.data_key(), &bundle_key)?;
            bundle.add_item(item.id, wrapped)?;
        }
        if let Some(note) = &spec.note {
            bundle.note = Some(wrap_bundle_note(note, &bundle_key)?);
        }

        info!(
            user = %session.user_id(),
            bundle = %bundle.id,
            items = bundle.wrapped_keys.len(),
            "bundle built"
        );
        Ok((bundle, token))
    }

    // ------------------------------------------------------------------
    // Trustee access
    // ------------------------------------------------------------------

    /// Opens one item from a released bundle using the trustee's token.
    ///
    /// Anything short of a released bundle with a matching wrapped key is
    /// the neutral [`VaultError::NotAvailable`] or a generic
    /// [`VaultError::AccessDenied`]; probing reveals nothing about the
    /// bundle's contents or trustee list.
    pub fn trustee_open_item(
        &self,
        bundle: &Bundle,
        item_id: ItemId,
        token: &ReleaseToken,
    ) -> VaultResult<Vec<u8>> {
        if bundle.status != ReleaseStatus::Released {
            return Err(VaultError::NotAvailable);
        }
        let envelope = bundle
            .wrapped_keys
            .get(&item_id)
            .ok_or(VaultError::MissingKeyMaterial(item_id))?;
        let item = self
            .items
            .get(item_id)?
            .ok_or(VaultError::MissingKeyMaterial(item_id))?;

        let bundle_key = derive_bundle_key(token)?;
        let content_key = bequest_crypto::unwrap_key(envelope, &bundle_key)
            .map_err(|_| VaultError::AccessDenied)?;
        decrypt(&content_key, &item.sealed.ciphertext)
            .map_err(|_| VaultError::Crypto(CryptoError::CorruptData))
    }

    /// Decrypts the owner's note from a released bundle.
    pub fn trustee_open_note(
        &self,
        bundle: &Bundle,
        token: &ReleaseToken,
    ) -> VaultResult<Option<String>> {
        if bundle.status != ReleaseStatus::Released {
            return Err(VaultError::NotAvailable);
        }
        let Some(sealed) = &bundle.note else {
            return Ok(None);
        };
        let bundle_key = derive_bundle_key(token)?;
        let note = open_bundle_note(sealed, &bundle_key).map_err(|_| VaultError::AccessDenied)?;
        Ok(Some(note))
    }
}
