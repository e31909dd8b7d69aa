//! Master key custody.
//!
//! The vault has exactly one long-lived AES-256 key. It lives in a
//! [`SecureStore`] and is reachable only through the [`KeyCustodian`].

pub mod custodian;
#[cfg(any(target_os = "macos", target_os = "windows", target_os = "linux"))]
pub mod desktop;
pub mod error;
pub mod handle;
pub mod memory;
pub mod store;

pub use custodian::{KeyCustodian, KeyStoreInfo, MASTER_KEY_ALIAS};
#[cfg(any(target_os = "macos", target_os = "windows", target_os = "linux"))]
pub use desktop::KeyringStore;
pub use error::{KeyError, KeyResult};
pub use handle::KeyHandle;
pub use memory::MemoryStore;
pub use store::{KeyMaterial, KeyMetadata, KeyPolicy, KeyProtection, KeyPurpose, SecureStore, StoredKey};
