//! Vault configuration, stored as pretty JSON.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::keystore::{KeyPolicy, MASTER_KEY_ALIAS};
use crate::session::{
    Authenticators, PromptInfo, SessionOptions, DEFAULT_AUTOLOCK_SECS,
    MAX_AUTOLOCK_SECS,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VaultConfig {
    pub keystore: KeystoreSettings,
    pub session: SessionSettings,
    pub prompt: PromptInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoreSettings {
    /// Keyring service name the key is filed under.
    pub service: String,
    pub alias: String,
    /// Try secure hardware first, falling back to software.
    pub prefer_hardware: bool,
}

impl Default for KeystoreSettings {
    fn default() -> Self {
        Self {
            service: "com.memoripass.vault".into(),
            alias: MASTER_KEY_ALIAS.into(),
            prefer_hardware: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub autolock_secs: u64,
    /// Key-use window after a successful authentication.
    pub auth_grace_secs: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            autolock_secs: DEFAULT_AUTOLOCK_SECS,
            auth_grace_secs: crate::keystore::store::DEFAULT_AUTH_GRACE_SECS,
        }
    }
}

impl VaultConfig {
    pub fn validate(&self) -> Result<()> {
        if self.keystore.service.trim().is_empty() {
            return Err(CoreError::Config("keystore.service must not be empty".into()));
        }
        if self.keystore.alias.trim().is_empty() {
            return Err(CoreError::Config("keystore.alias must not be empty".into()));
        }
        if self.session.autolock_secs == 0 {
            return Err(CoreError::Config(
                "session.autolock_secs must be at least 1".into(),
            ));
        }
        if self.session.autolock_secs > MAX_AUTOLOCK_SECS {
            return Err(CoreError::Config(format!(
                "session.autolock_secs must be at most {}",
                MAX_AUTOLOCK_SECS
            )));
        }
        Ok(())
    }

    pub fn key_policy(&self) -> KeyPolicy {
        KeyPolicy::master(self.session.auth_grace_secs)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            autolock_delay: Duration::from_secs(self.session.autolock_secs),
            allowed: Authenticators::STRONG_OR_CREDENTIAL,
            prompt: self.prompt.clone(),
        }
    }
}

/// Load the configuration at `path`, or defaults when the file is missing.
pub fn load_config(path: &Path) -> Result<VaultConfig> {
    if !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        return Ok(VaultConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: VaultConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &VaultConfig) -> Result<()> {
    config.validate()?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
