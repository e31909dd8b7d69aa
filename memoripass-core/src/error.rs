use thiserror::Error;

use crate::crypto::CryptoError;
use crate::keystore::KeyError;
use crate::session::SessionError;

/// Umbrella error for callers that use the whole vault core.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Key store error: {0}")]
    Key(#[from] KeyError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// The session is locked; authenticate first.
    #[error("Vault is locked")]
    Locked,

    #[error("Configuration error: {0}")]
    Config(String),

    /// A blocking crypto worker panicked or was cancelled.
    #[error("Worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Stable code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Key(KeyError::NotFound) => "KEY_NOT_FOUND",
            CoreError::Key(_) => "KEY_STORE_UNAVAILABLE",
            CoreError::Crypto(CryptoError::EmptyInput) => "EMPTY_INPUT",
            CoreError::Crypto(CryptoError::MalformedEnvelope(_)) => "MALFORMED_ENVELOPE",
            CoreError::Crypto(CryptoError::AuthenticationFailed) => "AUTHENTICATION_FAILED",
            CoreError::Crypto(CryptoError::KeyUnavailable(_)) => "KEY_UNAVAILABLE",
            CoreError::Crypto(_) => "ENCRYPTION_ERROR",
            CoreError::Session(SessionError::AuthenticatorUnavailable(_)) => {
                "AUTHENTICATOR_UNAVAILABLE"
            }
            CoreError::Session(SessionError::PromptInFlight) => "PROMPT_IN_FLIGHT",
            CoreError::Session(SessionError::Closed) => "SESSION_CLOSED",
            CoreError::Locked => "LOCKED",
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::Worker(_) => "WORKER_ERROR",
            CoreError::Io(_) => "IO_ERROR",
            CoreError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Short message suitable for showing to the user.
    ///
    /// Never includes key material or envelope contents.
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Crypto(CryptoError::MalformedEnvelope(_))
            | CoreError::Crypto(CryptoError::AuthenticationFailed) => {
                "Cannot read this entry".into()
            }
            CoreError::Key(_) | CoreError::Crypto(CryptoError::KeyUnavailable(_)) => {
                "Secure storage unavailable".into()
            }
            CoreError::Crypto(CryptoError::EmptyInput) => "Nothing to encrypt".into(),
            CoreError::Session(SessionError::AuthenticatorUnavailable(status)) => {
                format!("Cannot authenticate: {}", status)
            }
            CoreError::Locked => "Unlock the vault first".into(),
            other => other.to_string(),
        }
    }
}

impl serde::Serialize for CoreError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("CoreError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
