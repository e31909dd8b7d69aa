//! Error types for envelope encryption.

use thiserror::Error;

use crate::keystore::KeyError;

/// Errors raised by the encryption engine.
///
/// `AuthenticationFailed` means the envelope must be treated as untrusted;
/// callers must not attempt any fallback decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Plaintext was empty.
    #[error("Plaintext cannot be empty")]
    EmptyInput,

    /// The envelope is not valid base64 or is too short to hold an IV and tag.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Tag verification failed: tampering, corruption or the wrong key.
    #[error("Envelope failed authentication")]
    AuthenticationFailed,

    /// The master key could not be obtained.
    #[error("Master key unavailable: {0}")]
    KeyUnavailable(#[from] KeyError),

    /// The key refused an IV that was never randomized.
    #[error("Refusing to encrypt with a predictable IV")]
    PredictableNonce,

    /// The cipher rejected the input (oversized plaintext).
    #[error("Encryption failed")]
    EncryptionFailed,
}

/// Result type alias for encryption operations.
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;
