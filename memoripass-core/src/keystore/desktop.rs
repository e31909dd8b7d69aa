//! Desktop secure store using the OS keyring.
//!
//! - **macOS**: Keychain Access
//! - **Windows**: Credential Manager
//! - **Linux**: Secret Service API (GNOME Keyring, KWallet)
//!
//! None of these place the key in dedicated hardware, so every key created
//! here is recorded as software-backed.

use base64::Engine;
use keyring::Entry;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use super::error::{KeyError, KeyResult};
use super::store::{KeyMaterial, KeyMetadata, KeyPolicy, KeyProtection, SecureStore, StoredKey};

/// Default service name for keyring entries.
pub const DEFAULT_SERVICE_NAME: &str = "com.memoripass.vault";

/// Layout of the keyring entry. The key is stored as base64 since keyring
/// APIs expect strings.
#[derive(Serialize, Deserialize)]
struct KeyRecord {
    key: String,
    policy: KeyPolicy,
    protection: KeyProtection,
}

/// The same entry read without its `key` field, so the key is never decoded.
#[derive(Deserialize)]
struct KeyRecordHeader {
    policy: KeyPolicy,
    protection: KeyProtection,
}

impl Drop for KeyRecord {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.key.zeroize();
    }
}

/// Secure store backed by the platform keyring.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(DEFAULT_SERVICE_NAME)
    }

    /// Use a custom service name (isolates test or per-profile vaults).
    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, alias: &str) -> KeyResult<Entry> {
        Entry::new(&self.service, alias).map_err(|e| {
            error!("Failed to create keyring entry: {}", e);
            map_keyring_error(e)
        })
    }

    fn read_record(&self, alias: &str) -> KeyResult<Option<KeyRecord>> {
        self.read_entry(alias)
    }

    fn read_entry<T: DeserializeOwned>(&self, alias: &str) -> KeyResult<Option<T>> {
        let entry = self.entry(alias)?;
        let encoded = match entry.get_password() {
            Ok(password) => Zeroizing::new(password),
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => {
                error!("Failed to read key from keyring: {:?}", e);
                return Err(map_keyring_error(e));
            }
        };

        let record: T = serde_json::from_str(&encoded).map_err(|e| {
            error!("Keyring entry for {} is not a key record: {}", alias, e);
            KeyError::StoreUnavailable(format!("corrupted keyring entry: {}", e))
        })?;
        Ok(Some(record))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureStore for KeyringStore {
    fn name(&self) -> &'static str {
        platform_store_name()
    }

    fn hardware_backing_available(&self) -> bool {
        false
    }

    fn contains(&self, alias: &str) -> KeyResult<bool> {
        let entry = self.entry(alias)?;
        match entry.get_password() {
            Ok(password) => {
                drop(Zeroizing::new(password));
                Ok(true)
            }
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => {
                warn!("Keyring not accessible: {:?}", e);
                Err(map_keyring_error(e))
            }
        }
    }

    fn generate(
        &self,
        alias: &str,
        policy: &KeyPolicy,
        protection: KeyProtection,
    ) -> KeyResult<()> {
        if protection == KeyProtection::Hardware {
            return Err(KeyError::GenerationFailed(
                "OS keyring has no hardware-backed storage".into(),
            ));
        }
        if self.contains(alias)? {
            return Err(KeyError::GenerationFailed(format!(
                "alias '{}' already holds a key",
                alias
            )));
        }

        let material = KeyMaterial::generate();
        let record = KeyRecord {
            key: base64::engine::general_purpose::STANDARD.encode(material.as_bytes()),
            policy: policy.clone(),
            protection,
        };
        let encoded = Zeroizing::new(
            serde_json::to_string(&record)
                .map_err(|e| KeyError::GenerationFailed(format!("encode key record: {}", e)))?,
        );

        let entry = self.entry(alias)?;
        entry.set_password(&encoded).map_err(|e| {
            error!("Failed to store key in keyring: {:?}", e);
            map_keyring_error(e).during_generation()
        })?;

        // Read back through a fresh Entry so we are not looking at a cached value
        match self.read_record(alias)? {
            Some(readback) if readback.key == record.key => {
                info!("Master key stored in {} (alias {})", self.name(), alias);
                Ok(())
            }
            _ => {
                error!("Keyring verification failed for alias {}", alias);
                Err(KeyError::GenerationFailed(
                    "keyring verification failed: data mismatch".into(),
                ))
            }
        }
    }

    fn load(&self, alias: &str) -> KeyResult<Option<StoredKey>> {
        let Some(record) = self.read_record(alias)? else {
            debug!("No key under alias {}", alias);
            return Ok(None);
        };

        let bytes = Zeroizing::new(
            base64::engine::general_purpose::STANDARD
                .decode(&record.key)
                .map_err(|e| {
                    error!("Failed to decode key from base64: {}", e);
                    KeyError::StoreUnavailable(format!("corrupted key encoding: {}", e))
                })?,
        );

        Ok(Some(StoredKey::new(
            KeyMaterial::from_bytes(&bytes)?,
            record.policy.clone(),
            record.protection,
        )))
    }

    fn metadata(&self, alias: &str) -> KeyResult<Option<KeyMetadata>> {
        let header: Option<KeyRecordHeader> = self.read_entry(alias)?;
        Ok(header.map(|header| KeyMetadata {
            policy: header.policy,
            protection: header.protection,
        }))
    }

    fn delete(&self, alias: &str) -> KeyResult<bool> {
        let entry = self.entry(alias)?;
        // delete_credential errors when the entry is missing; deletion is idempotent here
        match entry.delete_credential() {
            Ok(()) => {
                info!("Key {} deleted from OS keyring", alias);
                Ok(true)
            }
            Err(keyring::Error::NoEntry) => {
                debug!("No key to delete (already gone)");
                Ok(false)
            }
            Err(e) => {
                error!("Failed to delete key from keyring: {:?}", e);
                Err(map_keyring_error(e))
            }
        }
    }
}

fn platform_store_name() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "macos-keychain"
    }
    #[cfg(target_os = "windows")]
    {
        "windows-credential-manager"
    }
    #[cfg(target_os = "linux")]
    {
        "linux-secret-service"
    }
}

fn map_keyring_error(err: keyring::Error) -> KeyError {
    match err {
        keyring::Error::NoEntry => KeyError::NotFound,
        keyring::Error::Ambiguous(_) => {
            KeyError::StoreUnavailable("multiple keyring entries found".into())
        }
        keyring::Error::NoStorageAccess(e) => {
            KeyError::StoreUnavailable(format!("keyring access denied: {:?}", e))
        }
        keyring::Error::PlatformFailure(e) => {
            let msg = format!("{:?}", e);
            if msg.contains("Dbus") || msg.contains("dbus") || msg.contains("D-Bus") {
                KeyError::StoreUnavailable(format!(
                    "system keyring not available (D-Bus error): {}",
                    msg
                ))
            } else {
                KeyError::StoreUnavailable(format!("keyring error: {}", msg))
            }
        }
        keyring::Error::BadEncoding(_) => {
            KeyError::StoreUnavailable("keyring entry has a bad encoding".into())
        }
        other => KeyError::StoreUnavailable(format!("keyring error: {}", other)),
    }
}
