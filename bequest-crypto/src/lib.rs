//! Key hierarchy and envelope encryption for Bequest.
//!
//! Provides the zero-knowledge crypto core:
//! - Argon2id for key derivation from passphrases and release tokens
//! - ChaCha20-Poly1305 for authenticated encryption
//! - Envelope wrapping so every key is individually re-wrappable
//!
//! # Architecture
//!
//! Four tiers of keys, top to bottom:
//!
//! 1. **Master key**: derived from the owner's passphrase. Never stored;
//!    re-derived on every unlock.
//!
//! 2. **Data key**: one per account, generated at signup. Persisted only as
//!    an envelope wrapped under the master key.
//!
//! 3. **Content key**: one per item, generated at item creation. Persisted
//!    only as an envelope wrapped under the data key.
//!
//! 4. **Bundle key**: derived from a random release token. Item content
//!    keys are re-wrapped under it when a release bundle is built, without
//!    touching item ciphertext.
//!
//! This layout allows changing the passphrase without re-encrypting data,
//! and handing trustees access to a chosen subset of items by sharing only
//! the release token.
//!
//! Everything here is synchronous and pure: no I/O, no global state, no
//! logging of key material. Key capability is typed: [`OpaqueKey`] can
//! only encrypt/decrypt, while [`ExtractableKey`] is the sole handle whose
//! raw bytes can surface, and only the bundle re-wrap path produces one
//! from stored data.

pub mod bundle;
mod cipher;
mod envelope;
mod error;
mod key;
pub mod item;
pub mod session;
mod wire;

pub use bundle::{
    derive_bundle_key, open_bundle_note, wrap_bundle_note, wrap_item_for_bundle, ReleaseToken,
    TOKEN_SIZE,
};
pub use cipher::{decrypt, encrypt, EncryptedData, NONCE_SIZE, TAG_SIZE};
pub use envelope::{unwrap_key, unwrap_key_extractable, wrap_key, KeyEnvelope};
pub use error::{CryptoError, CryptoResult};
pub use item::{create_item, encrypt_item, open_item, reencrypt_item_content, SealedItem};
pub use key::{
    derive_master_key, ExtractableKey, KdfParams, OpaqueKey, Salt, KEY_SIZE, SALT_SIZE,
};
pub use session::{decoy_unlock, provision_account, unlock_account, AccountRecord, UnlockedSession};
