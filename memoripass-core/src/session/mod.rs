//! Vault session: locked until the user authenticates, relocked on demand
//! or after a period in the background.

pub mod auth;
pub mod error;
pub mod guard;
mod owner;

pub use auth::{AuthOutcome, AuthStatus, Authenticator, Authenticators, PromptInfo};
pub use error::{SessionError, SessionResult};
pub use guard::{SessionGuard, SessionOptions, DEFAULT_AUTOLOCK_SECS, MAX_AUTOLOCK_SECS};
pub use owner::{LockReason, SessionEvent, SessionSnapshot, SessionState};
