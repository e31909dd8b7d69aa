//! In-process secure store.
//!
//! Keys live only as long as the store does. Useful for tests, for ephemeral
//! vaults, and as the reference behaviour for platform backends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;
use zeroize::Zeroizing;

use super::error::{KeyError, KeyResult};
use super::store::{
    KeyMaterial, KeyMetadata, KeyPolicy, KeyProtection, SecureStore, StoredKey, KEY_LEN,
};

struct MemoryRecord {
    bytes: Zeroizing<[u8; KEY_LEN]>,
    policy: KeyPolicy,
    protection: KeyProtection,
}

/// Secure store backed by a process-local map.
pub struct MemoryStore {
    records: Mutex<HashMap<String, MemoryRecord>>,
    hardware: bool,
    hardware_rejects_keys: bool,
    offline: AtomicBool,
}

impl MemoryStore {
    /// A software-only store.
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            hardware: false,
            hardware_rejects_keys: false,
            offline: AtomicBool::new(false),
        }
    }

    /// A store that reports (simulated) secure hardware.
    pub fn with_hardware() -> Self {
        Self {
            hardware: true,
            ..Self::new()
        }
    }

    /// A store that reports hardware but fails every hardware generation,
    /// like a device advertising StrongBox that cannot take the key.
    pub fn with_unusable_hardware() -> Self {
        Self {
            hardware: true,
            hardware_rejects_keys: true,
            ..Self::new()
        }
    }

    /// Make every operation fail with `StoreUnavailable` until reset.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn records(&self) -> KeyResult<MutexGuard<'_, HashMap<String, MemoryRecord>>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(KeyError::StoreUnavailable("memory store is offline".into()));
        }
        Ok(self.records.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn hardware_backing_available(&self) -> bool {
        self.hardware
    }

    fn contains(&self, alias: &str) -> KeyResult<bool> {
        Ok(self.records()?.contains_key(alias))
    }

    fn generate(
        &self,
        alias: &str,
        policy: &KeyPolicy,
        protection: KeyProtection,
    ) -> KeyResult<()> {
        let mut records = self.records()?;
        if records.contains_key(alias) {
            return Err(KeyError::GenerationFailed(format!(
                "alias '{}' already holds a key",
                alias
            )));
        }
        if protection == KeyProtection::Hardware && (!self.hardware || self.hardware_rejects_keys)
        {
            return Err(KeyError::GenerationFailed(
                "secure hardware cannot hold this key".into(),
            ));
        }

        let material = KeyMaterial::generate();
        records.insert(
            alias.to_string(),
            MemoryRecord {
                bytes: Zeroizing::new(*material.as_bytes()),
                policy: policy.clone(),
                protection,
            },
        );
        debug!("Stored {} key under alias {}", protection, alias);
        Ok(())
    }

    fn load(&self, alias: &str) -> KeyResult<Option<StoredKey>> {
        let records = self.records()?;
        match records.get(alias) {
            Some(record) => Ok(Some(StoredKey::new(
                KeyMaterial::from_bytes(&record.bytes[..])?,
                record.policy.clone(),
                record.protection,
            ))),
            None => Ok(None),
        }
    }

    fn metadata(&self, alias: &str) -> KeyResult<Option<KeyMetadata>> {
        Ok(self.records()?.get(alias).map(|record| KeyMetadata {
            policy: record.policy.clone(),
            protection: record.protection,
        }))
    }

    fn delete(&self, alias: &str) -> KeyResult<bool> {
        Ok(self.records()?.remove(alias).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_refuses_overwrite() {
        let store = MemoryStore::new();
        let policy = KeyPolicy::default();
        store
            .generate("master", &policy, KeyProtection::Software)
            .unwrap();
        let err = store
            .generate("master", &policy, KeyProtection::Software)
            .unwrap_err();
        assert!(matches!(err, KeyError::GenerationFailed(_)));
    }

    #[test]
    fn test_software_store_rejects_hardware_request() {
        let store = MemoryStore::new();
        let err = store
            .generate("master", &KeyPolicy::default(), KeyProtection::Hardware)
            .unwrap_err();
        assert!(matches!(err, KeyError::GenerationFailed(_)));
        assert!(!store.contains("master").unwrap());
    }

    #[test]
    fn test_load_returns_same_material() {
        let store = MemoryStore::with_hardware();
        store
            .generate("master", &KeyPolicy::default(), KeyProtection::Hardware)
            .unwrap();
        let a = store.load("master").unwrap().unwrap();
        let b = store.load("master").unwrap().unwrap();
        assert_eq!(a.material.as_bytes(), b.material.as_bytes());
        assert_eq!(a.protection, KeyProtection::Hardware);
    }

    #[test]
    fn test_metadata_matches_stored_key() {
        let store = MemoryStore::with_hardware();
        assert_eq!(store.metadata("master").unwrap(), None);

        let policy = KeyPolicy::master(10);
        store
            .generate("master", &policy, KeyProtection::Hardware)
            .unwrap();
        let metadata = store.metadata("master").unwrap().unwrap();
        assert_eq!(metadata.protection, KeyProtection::Hardware);
        assert_eq!(metadata.policy, policy);

        store.set_offline(true);
        assert!(matches!(
            store.metadata("master"),
            Err(KeyError::StoreUnavailable(_))
        ));
    }

    #[test]
    fn test_offline_store_fails() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.contains("master"),
            Err(KeyError::StoreUnavailable(_))
        ));
        store.set_offline(false);
        assert!(!store.contains("master").unwrap());
    }

    #[test]
    fn test_delete_reports_removal() {
        let store = MemoryStore::new();
        assert!(!store.delete("master").unwrap());
        store
            .generate("master", &KeyPolicy::default(), KeyProtection::Software)
            .unwrap();
        assert!(store.delete("master").unwrap());
    }
}
