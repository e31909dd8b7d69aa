//! KeyCustodian - lifecycle of the single vault master key.
//!
//! The custodian is the only component that talks to the secure store. It
//! handles:
//! - Existence checks (failures read as "no key")
//! - Lazy generation, preferring hardware and falling back to software
//! - Handing out opaque [`KeyHandle`]s to the encryption engine
//! - Deletion and rotation, both of which destroy every existing envelope

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::error::{KeyError, KeyResult};
use super::handle::KeyHandle;
use super::store::{KeyPolicy, KeyProtection, SecureStore};

/// Default alias of the master key inside the secure store.
pub const MASTER_KEY_ALIAS: &str = "memoripass_master_key";

/// Diagnostic snapshot of the key store. Contains no key material.
#[derive(Debug, Clone, Serialize)]
pub struct KeyStoreInfo {
    pub store: &'static str,
    pub alias: String,
    pub key_exists: bool,
    pub hardware_available: bool,
    pub protection: Option<KeyProtection>,
    pub policy: Option<KeyPolicy>,
}

/// Owns the master key's existence, generation, retrieval and destruction.
pub struct KeyCustodian {
    store: Box<dyn SecureStore>,
    alias: String,
    policy: KeyPolicy,
    prefer_hardware: bool,
    /// Serializes generate/delete/rotate so they never interleave.
    lifecycle: Mutex<()>,
}

impl KeyCustodian {
    /// Create a custodian over `store` with the default alias and policy.
    pub fn new(store: impl SecureStore + 'static) -> Self {
        Self::with_options(store, MASTER_KEY_ALIAS, KeyPolicy::default(), true)
    }

    pub fn with_options(
        store: impl SecureStore + 'static,
        alias: &str,
        policy: KeyPolicy,
        prefer_hardware: bool,
    ) -> Self {
        debug!("Key custodian using {} store", store.name());
        Self {
            store: Box::new(store),
            alias: alias.to_string(),
            policy,
            prefer_hardware,
            lifecycle: Mutex::new(()),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Check whether a master key is present.
    ///
    /// Never fails: if the store cannot be queried the key is treated as
    /// absent.
    pub fn exists(&self) -> bool {
        match self.store.contains(&self.alias) {
            Ok(exists) => {
                debug!("Master key exists: {}", exists);
                exists
            }
            Err(e) => {
                error!("Failed to check master key existence: {}", e);
                false
            }
        }
    }

    /// Generate the master key if none exists.
    ///
    /// An existing key is never overwritten; that would orphan every
    /// envelope sealed with it.
    pub fn generate(&self) -> KeyResult<()> {
        let _guard = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        self.generate_locked()
    }

    fn generate_locked(&self) -> KeyResult<()> {
        if self.store.contains(&self.alias)? {
            warn!("Master key already exists");
            return Ok(());
        }

        if self.prefer_hardware && self.store.hardware_backing_available() {
            match self
                .store
                .generate(&self.alias, &self.policy, KeyProtection::Hardware)
            {
                Ok(()) => {
                    info!("Master key generated in secure hardware");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Hardware-backed key generation failed, falling back to software: {}",
                        e
                    );
                }
            }
        }

        self.store
            .generate(&self.alias, &self.policy, KeyProtection::Software)
            .map_err(|e| {
                error!("Failed to generate master key: {}", e);
                e.during_generation()
            })?;
        info!("Master key generated in software-backed storage");
        Ok(())
    }

    /// Load the master key.
    pub fn get(&self) -> KeyResult<KeyHandle> {
        match self.store.load(&self.alias) {
            Ok(Some(stored)) => {
                debug!("Master key retrieved ({})", stored.protection);
                Ok(KeyHandle::new(stored))
            }
            Ok(None) => Err(KeyError::NotFound),
            Err(e) => {
                error!("Failed to retrieve master key: {}", e);
                Err(e)
            }
        }
    }

    /// Delete the master key. Deleting a missing key succeeds.
    ///
    /// # Warning
    /// Every envelope produced under the key becomes permanently
    /// undecryptable. Callers must obtain explicit user confirmation first.
    pub fn delete(&self) -> KeyResult<()> {
        let _guard = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        self.delete_locked()
    }

    fn delete_locked(&self) -> KeyResult<()> {
        match self.store.delete(&self.alias) {
            Ok(true) => {
                info!("Master key deleted");
                Ok(())
            }
            Ok(false) => {
                warn!("Master key does not exist");
                Ok(())
            }
            Err(e) => {
                error!("Failed to delete master key: {}", e);
                Err(e)
            }
        }
    }

    /// Replace the master key with a fresh one.
    ///
    /// # Warning
    /// Destroys all existing data; never call from automated recovery.
    pub fn rotate(&self) -> KeyResult<()> {
        let _guard = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        warn!("Rotating master key - all encrypted data will be lost!");
        self.delete_locked()?;
        self.generate_locked()?;
        info!("Master key rotated");
        Ok(())
    }

    /// Whether the current key lives in secure hardware.
    ///
    /// Informational only: a software-backed key is a valid fallback.
    pub fn is_hardware_backed(&self) -> bool {
        match self.store.metadata(&self.alias) {
            Ok(Some(metadata)) => metadata.protection == KeyProtection::Hardware,
            Ok(None) => false,
            Err(e) => {
                debug!("Cannot read key protection: {}", e);
                false
            }
        }
    }

    /// Whether the store can hold keys in secure hardware at all.
    pub fn hardware_available(&self) -> bool {
        self.store.hardware_backing_available()
    }

    pub fn info(&self) -> KeyStoreInfo {
        let metadata = self.store.metadata(&self.alias).ok().flatten();
        KeyStoreInfo {
            store: self.store.name(),
            alias: self.alias.clone(),
            key_exists: metadata.is_some(),
            hardware_available: self.store.hardware_backing_available(),
            protection: metadata.as_ref().map(|m| m.protection),
            policy: metadata.map(|m| m.policy),
        }
    }
}

impl std::fmt::Debug for KeyCustodian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCustodian")
            .field("store", &self.store.name())
            .field("alias", &self.alias)
            .finish()
    }
}
