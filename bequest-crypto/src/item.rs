//! Per-item encryption.
//!
//! Each item gets one fresh content key. The payload is AEAD-encrypted
//! under it, and the content key is wrapped under the owner's data key.
//! Persisting ciphertext and envelope is the caller's job; nothing here
//! touches storage.

use crate::cipher::{decrypt, encrypt, EncryptedData};
use crate::envelope::{unwrap_key, wrap_key, KeyEnvelope};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{ExtractableKey, OpaqueKey};
use serde::{Deserialize, Serialize};

/// Everything that persists for one encrypted item: the content
/// ciphertext and the content key wrapped under the data key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedItem {
    pub ciphertext: EncryptedData,
    pub key_envelope: KeyEnvelope,
}

/// Encrypts an item payload under an already-unwrapped content key.
pub fn encrypt_item(plaintext: &[u8], content_key: &OpaqueKey) -> CryptoResult<EncryptedData> {
    encrypt(content_key, plaintext)
}

/// Creates a sealed item: fresh content key, encrypt, wrap under the data
/// key. The content key never leaves this function unwrapped.
pub fn create_item(plaintext: &[u8], data_key: &OpaqueKey) -> CryptoResult<SealedItem> {
    let content_key = ExtractableKey::generate();
    let ciphertext = encrypt(content_key.as_opaque(), plaintext)?;
    let key_envelope = wrap_key(&content_key, data_key)?;
    Ok(SealedItem {
        ciphertext,
        key_envelope,
    })
}

/// Opens a sealed item: unwrap the content key, then decrypt.
///
/// A failed unwrap means the caller's data key does not own this item,
/// surfaced as [`CryptoError::AccessDenied`]. A failed decrypt after a
/// good unwrap means the stored ciphertext is damaged, surfaced as
/// [`CryptoError::CorruptData`].
pub fn open_item(sealed: &SealedItem, data_key: &OpaqueKey) -> CryptoResult<Vec<u8>> {
    let content_key = unwrap_key(&sealed.key_envelope, data_key).map_err(|e| match e {
        CryptoError::DecryptionFailed => CryptoError::AccessDenied,
        other => other,
    })?;

    decrypt(&content_key, &sealed.ciphertext).map_err(|e| match e {
        CryptoError::DecryptionFailed => CryptoError::CorruptData,
        other => other,
    })
}

/// Re-encrypts new content for an existing item, reusing its content key.
///
/// Reuse is safe because every encryption draws a fresh nonce; the key
/// envelope is carried over unchanged so the item's bundle wrappings stay
/// valid.
pub fn reencrypt_item_content(
    sealed: &SealedItem,
    new_plaintext: &[u8],
    data_key: &OpaqueKey,
) -> CryptoResult<SealedItem> {
    let content_key = unwrap_key(&sealed.key_envelope, data_key).map_err(|e| match e {
        CryptoError::DecryptionFailed => CryptoError::AccessDenied,
        other => other,
    })?;

    let ciphertext = encrypt(&content_key, new_plaintext)?;
    Ok(SealedItem {
        ciphertext,
        key_envelope: sealed.key_envelope.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_key() -> OpaqueKey {
        ExtractableKey::generate().into_opaque()
    }

    #[test]
    fn create_open_roundtrip() {
        let key = data_key();
        let sealed = create_item(b"my will and testament", &key).unwrap();
        assert_eq!(open_item(&sealed, &key).unwrap(), b"my will and testament");
    }

    #[test]
    fn wrong_data_key_is_access_denied() {
        let sealed = create_item(b"secret", &data_key()).unwrap();
        assert_eq!(
            open_item(&sealed, &data_key()).unwrap_err(),
            CryptoError::AccessDenied
        );
    }

    #[test]
    fn damaged_ciphertext_is_corrupt_data() {
        let key = data_key();
        let mut sealed = create_item(b"secret", &key).unwrap();
        sealed.ciphertext.ciphertext[0] ^= 0xFF;
        assert_eq!(open_item(&sealed, &key).unwrap_err(), CryptoError::CorruptData);
    }

    #[test]
    fn explicit_content_key_path_roundtrips() {
        let content_key = ExtractableKey::generate();
        let data = encrypt_item(b"re-upload", content_key.as_opaque()).unwrap();
        assert_eq!(
            decrypt(content_key.as_opaque(), &data).unwrap(),
            b"re-upload"
        );
    }

    #[test]
    fn reencrypt_keeps_envelope_and_key() {
        let key = data_key();
        let sealed = create_item(b"v1", &key).unwrap();
        let updated = reencrypt_item_content(&sealed, b"v2", &key).unwrap();

        assert_eq!(updated.key_envelope, sealed.key_envelope);
        assert_ne!(updated.ciphertext.nonce, sealed.ciphertext.nonce);
        assert_eq!(open_item(&updated, &key).unwrap(), b"v2");
    }
}
