//! Per-release-bundle encryption.
//!
//! A bundle key is derived from a random release token: whoever holds the
//! token can derive the key, and the token travels only in the trustees'
//! release links. Building a bundle re-wraps the chosen item content keys
//! under the bundle key without touching any item ciphertext.

use crate::cipher::{decrypt, encrypt, EncryptedData};
use crate::envelope::{unwrap_key_extractable, wrap_key, KeyEnvelope};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_raw, KdfParams, OpaqueKey};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Release token size in bytes (256-bit entropy).
pub const TOKEN_SIZE: usize = 32;

/// Domain-separated fixed salt for bundle key derivation. Public by
/// design: the token itself carries the entropy.
const BUNDLE_KEY_SALT: &[u8; 16] = b"bequest-release\0";

/// KDF cost pinned independently of [`KdfParams::default`] so existing
/// release links survive a default-parameter bump.
const BUNDLE_KDF: KdfParams = KdfParams {
    memory_kib: 19 * 1024,
    iterations: 2,
    parallelism: 1,
};

/// The secret a trustee receives via their release link: proof of
/// authorization and the sole seed of the bundle key.
///
/// No `Display`/`Debug` output of the raw value; encoding is explicit via
/// [`encode`](Self::encode).
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ReleaseToken([u8; TOKEN_SIZE]);

impl ReleaseToken {
    /// Generates a fresh random token.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// URL-safe unpadded base64, suitable for a release link path segment.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Parses an encoded token, rejecting anything that is not exactly
    /// [`TOKEN_SIZE`] bytes of the URL-safe alphabet.
    pub fn decode(encoded: &str) -> CryptoResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| CryptoError::InvalidReleaseToken)?;
        let bytes: [u8; TOKEN_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidReleaseToken)?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for ReleaseToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ReleaseToken(..)")
    }
}

/// Derives the bundle key from a release token.
///
/// Same primitive as passphrase derivation, keyed by the token with a
/// fixed public domain salt. Deterministic: link holders re-derive the
/// same key forever.
pub fn derive_bundle_key(token: &ReleaseToken) -> CryptoResult<OpaqueKey> {
    let bytes = derive_raw(&token.0, BUNDLE_KEY_SALT, &BUNDLE_KDF)?;
    Ok(OpaqueKey::from_bytes(bytes))
}

/// Re-wraps one item's content key for a bundle.
///
/// Unwraps the stored envelope with the owner's data key (the one code
/// path that surfaces an extractable key) and immediately wraps it under
/// the bundle key. The intermediate key zeroizes on drop; item ciphertext
/// is untouched.
pub fn wrap_item_for_bundle(
    item_envelope: &KeyEnvelope,
    data_key: &OpaqueKey,
    bundle_key: &OpaqueKey,
) -> CryptoResult<KeyEnvelope> {
    let content_key = unwrap_key_extractable(item_envelope, data_key)?;
    wrap_key(&content_key, bundle_key)
}

/// Encrypts the owner's note to trustees under the bundle key.
pub fn wrap_bundle_note(note: &str, bundle_key: &OpaqueKey) -> CryptoResult<EncryptedData> {
    encrypt(bundle_key, note.as_bytes())
}

/// Decrypts a bundle note.
pub fn open_bundle_note(data: &EncryptedData, bundle_key: &OpaqueKey) -> CryptoResult<String> {
    let bytes = decrypt(bundle_key, data)?;
    String::from_utf8(bytes).map_err(|_| CryptoError::InvalidNote)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_encode_decode_roundtrip() {
        let token = ReleaseToken::generate();
        let encoded = token.encode();
        assert_eq!(ReleaseToken::decode(&encoded).unwrap(), token);
    }

    #[test]
    fn token_is_url_safe() {
        let token = ReleaseToken::generate();
        let encoded = token.encode();
        assert!(encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn short_token_rejected() {
        let short = URL_SAFE_NO_PAD.encode([0u8; 8]);
        assert_eq!(
            ReleaseToken::decode(&short).unwrap_err(),
            CryptoError::InvalidReleaseToken
        );
    }

    #[test]
    fn bundle_key_is_deterministic_per_token() {
        let token = ReleaseToken::generate();
        let k1 = derive_bundle_key(&token).unwrap();
        let k2 = derive_bundle_key(&ReleaseToken::decode(&token.encode()).unwrap()).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());

        let other = derive_bundle_key(&ReleaseToken::generate()).unwrap();
        assert_ne!(k1.as_bytes(), other.as_bytes());
    }
}
