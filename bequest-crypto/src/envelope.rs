//! Key envelopes: wrap/unwrap a symmetric key under another symmetric key.
//!
//! Everything above this module (item keys under the data key, the data
//! key under the master key, item keys under a bundle key) is built from
//! these three functions.

use crate::cipher::{decrypt, encrypt, EncryptedData, NONCE_SIZE, TAG_SIZE};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{ExtractableKey, OpaqueKey, KEY_SIZE};
use crate::wire;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// An AEAD-wrapped key: ciphertext of the raw key bytes plus the nonce
/// used to wrap them. Hex strings on the wire, like all envelopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEnvelope {
    #[serde(with = "wire::hex_array")]
    pub nonce: [u8; NONCE_SIZE],
    #[serde(with = "wire::hex_vec")]
    pub ciphertext: Vec<u8>,
}

/// Exact ciphertext length of a wrapped key: raw key plus the AEAD tag.
const WRAPPED_LEN: usize = KEY_SIZE + TAG_SIZE;

/// Wraps `payload` under `wrapping` with a fresh nonce.
pub fn wrap_key(payload: &ExtractableKey, wrapping: &OpaqueKey) -> CryptoResult<KeyEnvelope> {
    let data = encrypt(wrapping, payload.export_bytes())?;
    Ok(KeyEnvelope {
        nonce: data.nonce,
        ciphertext: data.ciphertext,
    })
}

/// Unwraps an envelope into an encrypt/decrypt-only key.
///
/// Fails with [`CryptoError::DecryptionFailed`] if `wrapping` is not the
/// key the envelope was wrapped under, or if the envelope was tampered
/// with; the two cases are indistinguishable.
pub fn unwrap_key(envelope: &KeyEnvelope, wrapping: &OpaqueKey) -> CryptoResult<OpaqueKey> {
    let bytes = unwrap_raw(envelope, wrapping)?;
    Ok(opaque_from(bytes))
}

/// Unwraps an envelope into a re-wrappable key.
///
/// This is the single deliberate key-extraction path in the system; it
/// exists so a stored item key can be re-wrapped for a release bundle.
pub fn unwrap_key_extractable(
    envelope: &KeyEnvelope,
    wrapping: &OpaqueKey,
) -> CryptoResult<ExtractableKey> {
    let bytes = unwrap_raw(envelope, wrapping)?;
    Ok(extractable_from(bytes))
}

fn unwrap_raw(envelope: &KeyEnvelope, wrapping: &OpaqueKey) -> CryptoResult<Vec<u8>> {
    // Length check before any crypto op: a malformed envelope is a caller
    // bug, not a decryption failure.
    if envelope.ciphertext.len() != WRAPPED_LEN {
        return Err(CryptoError::InvalidEnvelopeLength {
            expected: WRAPPED_LEN,
            actual: envelope.ciphertext.len(),
        });
    }

    decrypt(
        wrapping,
        &EncryptedData {
            nonce: envelope.nonce,
            ciphertext: envelope.ciphertext.clone(),
        },
    )
}

fn opaque_from(mut bytes: Vec<u8>) -> OpaqueKey {
    let mut arr = [0u8; KEY_SIZE];
    arr.copy_from_slice(&bytes);
    bytes.zeroize();
    OpaqueKey::from_bytes(arr)
}

fn extractable_from(mut bytes: Vec<u8>) -> ExtractableKey {
    let mut arr = [0u8; KEY_SIZE];
    arr.copy_from_slice(&bytes);
    bytes.zeroize();
    ExtractableKey::from_bytes(arr)
}
