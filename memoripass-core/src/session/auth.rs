//! Authentication types for unlocking the vault session.
//!
//! The platform prompt (biometric or device credential) sits behind the
//! [`Authenticator`] trait; its result is one of exactly four
//! [`AuthOutcome`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audit::AuditEvent;

/// Authenticator classes a prompt may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authenticators {
    /// Class 3 biometrics (fingerprint, secure face unlock).
    pub biometric_strong: bool,
    /// PIN, pattern or password of the device.
    pub device_credential: bool,
}

impl Authenticators {
    /// Strong biometric OR device credential.
    pub const STRONG_OR_CREDENTIAL: Self = Self {
        biometric_strong: true,
        device_credential: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.biometric_strong && !self.device_credential
    }
}

impl Default for Authenticators {
    fn default() -> Self {
        Self::STRONG_OR_CREDENTIAL
    }
}

/// Whether the device can authenticate with the requested classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Available,
    /// No biometric hardware on the device.
    NoHardware,
    /// Hardware present but currently unusable.
    HardwareUnavailable,
    /// Nothing enrolled (no fingerprint, no device credential).
    NoneEnrolled,
    /// A security patch is required before the sensor may be used.
    SecurityUpdateRequired,
    /// The requested classes are not supported on this OS version.
    Unsupported,
    Unknown,
}

impl AuthStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

impl std::fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "authentication available"),
            Self::NoHardware => write!(f, "no biometric hardware available"),
            Self::HardwareUnavailable => write!(f, "biometric hardware currently unavailable"),
            Self::NoneEnrolled => write!(f, "no credentials enrolled"),
            Self::SecurityUpdateRequired => write!(f, "security update required"),
            Self::Unsupported => write!(f, "authentication unsupported"),
            Self::Unknown => write!(f, "authentication status unknown"),
        }
    }
}

/// Result of one authentication request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "reason", rename_all = "snake_case")]
pub enum AuthOutcome {
    /// The user authenticated; the session is now unlocked.
    Success,
    /// The sample did not match. The user may retry.
    Failed,
    /// The user dismissed the prompt. The unlock attempt should end.
    Cancelled,
    /// Hardware or policy failure, distinct from a user decision.
    /// Must not be retried silently.
    Error(String),
}

impl AuthOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Only a non-matching sample is worth another prompt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed)
    }

    pub fn audit_event(&self) -> AuditEvent {
        match self {
            Self::Success => AuditEvent::AuthSuccess,
            Self::Failed => AuditEvent::AuthFailed,
            Self::Cancelled => AuditEvent::AuthCancelled,
            Self::Error(_) => AuditEvent::AuthError,
        }
    }

    /// Classify an error reported by a platform prompt.
    ///
    /// The negative button and explicit user cancellation are `Cancelled`;
    /// everything else (lockout, hardware, timeout) is an `Error`.
    pub fn from_platform_error(code: &str, message: &str) -> Self {
        let code = code.to_ascii_uppercase();
        if code.contains("NEGATIVE_BUTTON")
            || code.contains("USER_CANCELED")
            || code.contains("USER_CANCELLED")
        {
            Self::Cancelled
        } else {
            Self::Error(message.to_string())
        }
    }
}

/// Text shown by the platform prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptInfo {
    pub title: String,
    pub subtitle: String,
    pub description: String,
}

impl Default for PromptInfo {
    fn default() -> Self {
        Self {
            title: "Memoripass".into(),
            subtitle: "Authenticate to access your passwords".into(),
            description: "Use biometrics or your device credential".into(),
        }
    }
}

/// The platform authentication service.
///
/// Implementations wrap BiometricPrompt, LocalAuthentication, Windows Hello
/// or similar. At most one `authenticate` call is in flight at a time; the
/// session guard enforces this. Dropping the returned future must dismiss
/// the prompt.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Check whether `allowed` can be used right now, without prompting.
    fn status(&self, allowed: Authenticators) -> AuthStatus;

    /// Show the prompt and wait for the user.
    async fn authenticate(&self, prompt: &PromptInfo, allowed: Authenticators) -> AuthOutcome;
}
