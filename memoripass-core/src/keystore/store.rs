//! The secure store abstraction that holds the master key.
//!
//! A [`SecureStore`] plays the role of the device enclave: it creates key
//! material, keeps it across restarts and hands it back only to the
//! custodian. Backends:
//! - [`MemoryStore`](super::MemoryStore): process-local, used by tests and ephemeral sessions
//! - [`KeyringStore`](super::KeyringStore): OS keyring on desktop platforms
//!
//! Platform bridges (Android KeyStore, iOS Keychain) implement the same trait.

use std::sync::Arc;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::error::{KeyError, KeyResult};
use crate::session::Authenticators;

/// Master key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Default window, in seconds, during which a successful authentication
/// keeps the key usable without a fresh prompt.
pub const DEFAULT_AUTH_GRACE_SECS: u32 = 30;

/// Where the key material lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyProtection {
    /// Dedicated secure hardware (StrongBox, Secure Enclave, TPM).
    Hardware,
    /// OS-managed software store.
    Software,
}

impl std::fmt::Display for KeyProtection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hardware => write!(f, "hardware"),
            Self::Software => write!(f, "software"),
        }
    }
}

/// Operations a key is allowed to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPurpose {
    Encrypt,
    Decrypt,
}

/// Cipher block mode bound to the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockMode {
    #[serde(rename = "GCM")]
    Gcm,
}

/// Padding scheme bound to the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Padding {
    #[serde(rename = "NoPadding")]
    None,
}

/// Usage policy recorded with the master key at generation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPolicy {
    pub purposes: Vec<KeyPurpose>,
    pub block_mode: BlockMode,
    pub padding: Padding,
    pub key_size_bits: u16,
    /// Authentication is required only at this application-level window,
    /// not per cipher operation.
    pub auth_grace_secs: u32,
    pub authenticators: Authenticators,
    pub per_operation_auth: bool,
    /// The cipher refuses predictable IVs even though the engine always
    /// supplies fresh random ones.
    pub randomized_encryption_required: bool,
}

impl KeyPolicy {
    /// Policy for the vault master key.
    pub fn master(auth_grace_secs: u32) -> Self {
        Self {
            purposes: vec![KeyPurpose::Encrypt, KeyPurpose::Decrypt],
            block_mode: BlockMode::Gcm,
            padding: Padding::None,
            key_size_bits: (KEY_LEN * 8) as u16,
            auth_grace_secs,
            authenticators: Authenticators::STRONG_OR_CREDENTIAL,
            per_operation_auth: false,
            randomized_encryption_required: true,
        }
    }

    pub fn allows(&self, purpose: KeyPurpose) -> bool {
        self.purposes.contains(&purpose)
    }
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self::master(DEFAULT_AUTH_GRACE_SECS)
    }
}

/// 256-bit key material, erased from memory on drop.
///
/// Bytes are only readable inside this crate; store implementations outside
/// it can create material but never read it back.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    bytes: [u8; KEY_LEN],
}

impl KeyMaterial {
    /// Fresh random key material from the OS-seeded CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Wrap key bytes loaded from a backend.
    pub fn from_bytes(slice: &[u8]) -> KeyResult<Self> {
        if slice.len() != KEY_LEN {
            return Err(KeyError::StoreUnavailable(format!(
                "stored key has {} bytes, expected {}",
                slice.len(),
                KEY_LEN
            )));
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(slice);
        Ok(Self { bytes })
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A key as returned by a backend.
#[derive(Debug)]
pub struct StoredKey {
    pub(crate) material: KeyMaterial,
    pub policy: KeyPolicy,
    pub protection: KeyProtection,
}

impl StoredKey {
    pub fn new(material: KeyMaterial, policy: KeyPolicy, protection: KeyProtection) -> Self {
        Self {
            material,
            policy,
            protection,
        }
    }
}

/// What a backend records about a key, without the key itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyMetadata {
    pub policy: KeyPolicy,
    pub protection: KeyProtection,
}

/// Secure key storage backend.
///
/// Implementations must be safe to share across threads; the custodian
/// serializes lifecycle calls but `contains`/`load` may run concurrently.
pub trait SecureStore: Send + Sync {
    /// Short backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Whether the backend can place keys in dedicated secure hardware.
    fn hardware_backing_available(&self) -> bool;

    fn contains(&self, alias: &str) -> KeyResult<bool>;

    /// Create and persist a new key under `alias`.
    ///
    /// Must fail rather than overwrite if `alias` is taken, and must fail
    /// if `protection` is `Hardware` and hardware cannot take the key.
    fn generate(&self, alias: &str, policy: &KeyPolicy, protection: KeyProtection)
        -> KeyResult<()>;

    /// Load the key under `alias`, or `None` if there is none.
    fn load(&self, alias: &str) -> KeyResult<Option<StoredKey>>;

    /// Policy and protection of the key under `alias`, or `None` if there is
    /// none. Must not materialize the key bytes.
    fn metadata(&self, alias: &str) -> KeyResult<Option<KeyMetadata>>;

    /// Remove the key under `alias`. Returns whether a key was removed.
    fn delete(&self, alias: &str) -> KeyResult<bool>;
}

impl<S: SecureStore + ?Sized> SecureStore for Arc<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn hardware_backing_available(&self) -> bool {
        (**self).hardware_backing_available()
    }

    fn contains(&self, alias: &str) -> KeyResult<bool> {
        (**self).contains(alias)
    }

    fn generate(
        &self,
        alias: &str,
        policy: &KeyPolicy,
        protection: KeyProtection,
    ) -> KeyResult<()> {
        (**self).generate(alias, policy, protection)
    }

    fn load(&self, alias: &str) -> KeyResult<Option<StoredKey>> {
        (**self).load(alias)
    }

    fn metadata(&self, alias: &str) -> KeyResult<Option<KeyMetadata>> {
        (**self).metadata(alias)
    }

    fn delete(&self, alias: &str) -> KeyResult<bool> {
        (**self).delete(alias)
    }
}
