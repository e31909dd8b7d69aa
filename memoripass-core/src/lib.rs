//! Memoripass vault core.
//!
//! Three parts, layered bottom-up:
//! - [`keystore`]: custody of the single AES-256 master key inside a secure store
//! - [`crypto`]: AES-256-GCM envelopes for individual secrets
//! - [`session`]: the locked/unlocked state, user authentication and autolock
//!
//! [`VaultCore`] bundles them for callers that want one service object.

pub mod audit;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keystore;
pub mod session;
pub mod vault;

pub use audit::AuditEvent;
pub use config::{load_config, save_config, VaultConfig};
pub use crypto::{CryptoError, EncryptionEngine, Envelope};
pub use error::{CoreError, Result};
pub use keystore::{KeyCustodian, KeyError, MemoryStore, SecureStore};
pub use session::{AuthOutcome, Authenticator, SessionGuard};
pub use vault::VaultCore;
