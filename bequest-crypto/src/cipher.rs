//! ChaCha20-Poly1305 authenticated encryption.
//!
//! Every call generates a fresh 96-bit nonce; the nonce travels inside
//! [`EncryptedData`] so decryption needs no side channel.

use crate::error::{CryptoError, CryptoResult};
use crate::key::OpaqueKey;
use crate::wire;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// AEAD nonce size in bytes (96-bit).
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag size in bytes. The tag is appended to the ciphertext.
pub const TAG_SIZE: usize = 16;

/// An AEAD ciphertext with its nonce. Serializes as hex strings on the
/// wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    #[serde(with = "wire::hex_array")]
    pub nonce: [u8; NONCE_SIZE],
    #[serde(with = "wire::hex_vec")]
    pub ciphertext: Vec<u8>,
}

/// Encrypts `plaintext` under `key` with a fresh random nonce.
pub fn encrypt(key: &OpaqueKey, plaintext: &[u8]) -> CryptoResult<EncryptedData> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(EncryptedData { nonce, ciphertext })
}

/// Decrypts `data` under `key`.
///
/// Fails with [`CryptoError::DecryptionFailed`] on any tag mismatch;
/// wrong key and corrupted data are indistinguishable, so there is no
/// oracle to probe.
pub fn decrypt(key: &OpaqueKey, data: &EncryptedData) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(&data.nonce), data.ciphertext.as_ref())
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::ExtractableKey;

    fn key() -> OpaqueKey {
        ExtractableKey::generate().into_opaque()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = key();
        let data = encrypt(&key, b"the quick brown fox").unwrap();
        assert_eq!(decrypt(&key, &data).unwrap(), b"the quick brown fox");
    }

    #[test]
    fn wrong_key_fails_generically() {
        let data = encrypt(&key(), b"payload").unwrap();
        assert_eq!(decrypt(&key(), &data), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn tampered_ciphertext_fails_generically() {
        let key = key();
        let mut data = encrypt(&key, b"payload").unwrap();
        data.ciphertext[0] ^= 0xFF;
        assert_eq!(decrypt(&key, &data), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let key = key();
        let a = encrypt(&key, b"same plaintext").unwrap();
        let b = encrypt(&key, b"same plaintext").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn serde_is_hex() {
        let key = key();
        let data = encrypt(&key, b"x").unwrap();
        let json = serde_json::to_value(&data).unwrap();
        let nonce_hex = json["nonce"].as_str().unwrap();
        assert_eq!(nonce_hex.len(), NONCE_SIZE * 2);
        assert!(nonce_hex.chars().all(|c| c.is_ascii_hexdigit()));

        let back: EncryptedData = serde_json::from_value(json).unwrap();
        assert_eq!(decrypt(&key, &back).unwrap(), b"x");
    }
}
