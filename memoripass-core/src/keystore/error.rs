//! Error types for master key custody.

use thiserror::Error;

/// Errors raised by the key custodian and the secure store backends.
///
/// None of these are transient: callers must not retry them automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// No master key is present in the secure store.
    /// Callers should provision one (or report that the vault was reset).
    #[error("Master key not found")]
    NotFound,

    /// The secure store could not be queried or written.
    #[error("Secure storage unavailable: {0}")]
    StoreUnavailable(String),

    /// The secure store refused to create the key.
    #[error("Master key generation failed: {0}")]
    GenerationFailed(String),
}

impl KeyError {
    /// Classify a failure that happened while creating a key.
    ///
    /// Store outages and generation failures pass through untouched; anything
    /// else becomes `GenerationFailed` carrying the original message.
    pub(crate) fn during_generation(self) -> Self {
        match self {
            e @ (KeyError::StoreUnavailable(_) | KeyError::GenerationFailed(_)) => e,
            other => KeyError::GenerationFailed(other.to_string()),
        }
    }
}

/// Result type alias for key custody operations.
pub type KeyResult<T> = std::result::Result<T, KeyError>;
