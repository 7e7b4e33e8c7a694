//! Key types and Argon2id derivation.
//!
//! Key capability is part of the type: an [`OpaqueKey`] can only be used
//! for encrypt/decrypt/wrap/unwrap, while an [`ExtractableKey`] is the one
//! handle whose raw bytes may leave this crate. Both zeroize on drop.

use crate::error::{CryptoError, CryptoResult};
use crate::wire;
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Symmetric key size in bytes (256-bit).
pub const KEY_SIZE: usize = 32;

/// KDF salt size in bytes.
pub const SALT_SIZE: usize = 16;

/// Random per-account KDF salt. Salts are not secret and persist in the
/// clear alongside the wrapped data key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Salt(#[serde(with = "wire::hex_array")] [u8; SALT_SIZE]);

impl Salt {
    /// Generates a fresh random salt.
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Builds a salt from a slice, rejecting anything but exactly
    /// [`SALT_SIZE`] bytes before any KDF work happens.
    pub fn try_from_slice(slice: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; SALT_SIZE] =
            slice
                .try_into()
                .map_err(|_| CryptoError::InvalidSaltLength {
                    expected: SALT_SIZE,
                    actual: slice.len(),
                })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }
}

/// Argon2id cost parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// Interactive-login parameters (OWASP recommendation).
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Deliberately weak profile so test suites don't spend their time in
    /// Argon2. Never use outside tests.
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// A symmetric key usable only for encryption and decryption.
///
/// There is no public accessor for the raw bytes; code outside this crate
/// cannot export, persist, or log the key material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct OpaqueKey([u8; KEY_SIZE]);

impl OpaqueKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for OpaqueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OpaqueKey(..)")
    }
}

/// A symmetric key that may additionally be re-wrapped under another key.
///
/// This is the one deliberate key-extraction boundary in the system: only
/// fresh generation and [`crate::unwrap_key_extractable`] produce one, and
/// only [`crate::wrap_key`] and [`export_bytes`](Self::export_bytes)
/// consume the capability.
pub struct ExtractableKey(OpaqueKey);

impl ExtractableKey {
    /// Generates a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self(OpaqueKey(bytes))
    }

    pub(crate) fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(OpaqueKey(bytes))
    }

    /// Raw key bytes, for wrapping under another key.
    pub fn export_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0 .0
    }

    /// Borrows the key for encrypt/decrypt use.
    pub fn as_opaque(&self) -> &OpaqueKey {
        &self.0
    }

    /// Drops extractability, leaving an encrypt/decrypt-only handle.
    pub fn into_opaque(self) -> OpaqueKey {
        self.0
    }
}

impl std::fmt::Debug for ExtractableKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ExtractableKey(..)")
    }
}

/// Derives the master key from a passphrase and per-account salt.
///
/// Deterministic: the same passphrase and salt always yield the same key.
/// No I/O, no side effects.
pub fn derive_master_key(
    passphrase: &str,
    salt: &Salt,
    params: &KdfParams,
) -> CryptoResult<OpaqueKey> {
    let bytes = derive_raw(passphrase.as_bytes(), salt.as_bytes(), params)?;
    Ok(OpaqueKey(bytes))
}

/// Argon2id over arbitrary secret bytes and salt bytes. Shared by master
/// key and bundle key derivation.
pub(crate) fn derive_raw(
    secret: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> CryptoResult<[u8; KEY_SIZE]> {
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut out = [0u8; KEY_SIZE];
    argon
        .hash_password_into(secret, salt, &mut out)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(out)
}
