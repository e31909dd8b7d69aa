//! Error types for the session guard.

use thiserror::Error;

use super::auth::AuthStatus;

/// Errors raised by the session guard. Authentication results themselves
/// are reported as [`AuthOutcome`](super::AuthOutcome), not as errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The device offers no usable authenticator; the prompt was never shown.
    #[error("Authentication unavailable: {0}")]
    AuthenticatorUnavailable(AuthStatus),

    /// Another authentication prompt is still open.
    #[error("An authentication prompt is already in progress")]
    PromptInFlight,

    /// The session owner task has stopped.
    #[error("Session guard has shut down")]
    Closed,
}

/// Result type alias for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;
