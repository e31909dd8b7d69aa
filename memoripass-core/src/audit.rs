//! Audit event labels handed to the audit-log collaborator.
//!
//! Events carry no secrets; callers add their own timestamp and context.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    AuthSuccess,
    AuthFailed,
    AuthCancelled,
    AuthError,
    KeyRotated,
    KeyDeleted,
    SessionLocked,
    SessionAutolocked,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthSuccess => "auth_success",
            Self::AuthFailed => "auth_failed",
            Self::AuthCancelled => "auth_cancelled",
            Self::AuthError => "auth_error",
            Self::KeyRotated => "key_rotated",
            Self::KeyDeleted => "key_deleted",
            Self::SessionLocked => "session_locked",
            Self::SessionAutolocked => "session_autolocked",
        }
    }
}

impl std::fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
