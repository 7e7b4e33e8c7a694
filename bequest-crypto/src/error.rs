//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in crypto operations.
///
/// `DecryptionFailed` is deliberately detail-free: a wrong key and a
/// tampered ciphertext are indistinguishable to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid salt length: expected {expected}, got {actual}")]
    InvalidSaltLength { expected: usize, actual: usize },

    #[error("invalid envelope length: expected {expected}, got {actual}")]
    InvalidEnvelopeLength { expected: usize, actual: usize },

    #[error("invalid release token")]
    InvalidReleaseToken,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("access denied")]
    AccessDenied,

    #[error("corrupt item data")]
    CorruptData,

    #[error("decrypted note is not valid utf-8")]
    InvalidNote,
}
