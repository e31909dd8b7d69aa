//! VaultCore - the custodian, engine and session guard as one service.
//!
//! Entry helpers refuse to touch ciphertext while the session is locked.

use std::sync::Arc;

use tracing::{error, info};
use zeroize::Zeroizing;

use crate::audit::AuditEvent;
use crate::config::VaultConfig;
use crate::crypto::{CryptoInfo, EncryptionEngine, Envelope};
use crate::error::{CoreError, Result};
use crate::keystore::{KeyCustodian, SecureStore};
use crate::session::{AuthOutcome, Authenticator, SessionGuard};

pub struct VaultCore {
    custodian: Arc<KeyCustodian>,
    engine: EncryptionEngine,
    session: SessionGuard,
}

impl VaultCore {
    /// Build the core over `store`. Must be called from within a Tokio runtime.
    pub fn new(
        store: impl SecureStore + 'static,
        authenticator: Arc<dyn Authenticator>,
        config: &VaultConfig,
    ) -> Result<Self> {
        config.validate()?;

        let custodian = Arc::new(KeyCustodian::with_options(
            store,
            &config.keystore.alias,
            config.key_policy(),
            config.keystore.prefer_hardware,
        ));
        let engine = EncryptionEngine::new(Arc::clone(&custodian));
        let session = SessionGuard::new(authenticator, config.session_options());

        Ok(Self {
            custodian,
            engine,
            session,
        })
    }

    /// Build the core over the OS keyring, filed under the configured service.
    #[cfg(any(target_os = "macos", target_os = "windows", target_os = "linux"))]
    pub fn with_keyring(authenticator: Arc<dyn Authenticator>, config: &VaultConfig) -> Result<Self> {
        let store = crate::keystore::KeyringStore::with_service(&config.keystore.service);
        Self::new(store, authenticator, config)
    }

    pub fn custodian(&self) -> &Arc<KeyCustodian> {
        &self.custodian
    }

    pub fn engine(&self) -> &EncryptionEngine {
        &self.engine
    }

    pub fn session(&self) -> &SessionGuard {
        &self.session
    }

    pub fn is_unlocked(&self) -> bool {
        self.session.is_authenticated()
    }

    pub async fn unlock(&self) -> Result<AuthOutcome> {
        Ok(self.session.request_authentication().await?)
    }

    pub async fn lock(&self) -> Result<()> {
        Ok(self.session.lock().await?)
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(CoreError::Locked)
        }
    }

    /// Encrypt a secret for storage.
    pub fn seal_entry(&self, plaintext: &str) -> Result<Envelope> {
        self.ensure_unlocked()?;
        Ok(self.engine.encrypt(plaintext)?)
    }

    /// Decrypt a stored secret.
    pub fn open_entry(&self, envelope: &Envelope) -> Result<Zeroizing<String>> {
        self.ensure_unlocked()?;
        Ok(self.engine.decrypt(envelope)?)
    }

    /// [`seal_entry`](Self::seal_entry) on a blocking worker. Counts as user activity.
    pub async fn seal_entry_async(&self, plaintext: Zeroizing<String>) -> Result<Envelope> {
        self.ensure_unlocked()?;
        let engine = self.engine.clone();
        let envelope = tokio::task::spawn_blocking(move || engine.encrypt(&plaintext))
            .await
            .map_err(|e| CoreError::Worker(e.to_string()))??;
        self.session.record_activity().await?;
        Ok(envelope)
    }

    /// [`open_entry`](Self::open_entry) on a blocking worker. Counts as user activity.
    pub async fn open_entry_async(&self, envelope: Envelope) -> Result<Zeroizing<String>> {
        self.ensure_unlocked()?;
        let engine = self.engine.clone();
        let plaintext = tokio::task::spawn_blocking(move || engine.decrypt(&envelope))
            .await
            .map_err(|e| CoreError::Worker(e.to_string()))??;
        self.session.record_activity().await?;
        Ok(plaintext)
    }

    /// Replace the master key. Requires an unlocked session.
    ///
    /// # Warning
    /// Every stored envelope becomes undecryptable.
    pub fn rotate_key(&self) -> Result<AuditEvent> {
        self.ensure_unlocked()?;
        self.engine.rotate_key()?;
        info!("{}", AuditEvent::KeyRotated);
        Ok(AuditEvent::KeyRotated)
    }

    /// Delete the master key and lock the session. Requires an unlocked session.
    pub async fn delete_key(&self) -> Result<AuditEvent> {
        self.ensure_unlocked()?;
        self.custodian.delete().map_err(|e| {
            error!("Key deletion failed: {}", e);
            e
        })?;
        info!("{}", AuditEvent::KeyDeleted);
        self.session.lock().await?;
        Ok(AuditEvent::KeyDeleted)
    }

    pub fn info(&self) -> CryptoInfo {
        self.engine.info()
    }

    /// Lock and stop the session task.
    pub async fn shutdown(self) {
        self.session.shutdown().await;
    }
}

impl std::fmt::Debug for VaultCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultCore")
            .field("custodian", &self.custodian)
            .field("session", &self.session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::crypto::CryptoError;
    use crate::keystore::MemoryStore;
    use crate::session::{AuthStatus, Authenticators, PromptInfo};

    struct AlwaysYes;

    #[async_trait]
    impl Authenticator for AlwaysYes {
        fn status(&self, _allowed: Authenticators) -> AuthStatus {
            AuthStatus::Available
        }

        async fn authenticate(&self, _prompt: &PromptInfo, _allowed: Authenticators) -> AuthOutcome {
            AuthOutcome::Success
        }
    }

    fn core() -> VaultCore {
        VaultCore::new(MemoryStore::new(), Arc::new(AlwaysYes), &VaultConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_locked_refuses_entries() {
        let core = core();
        assert!(matches!(core.seal_entry("secret"), Err(CoreError::Locked)));
        assert!(matches!(
            core.open_entry(&Envelope::from_encoded("AAAA")),
            Err(CoreError::Locked)
        ));
        assert!(!core.engine().is_available(), "locked core must not provision");
    }

    #[tokio::test]
    async fn test_unlocked_round_trip() {
        let core = core();
        assert_eq!(core.unlock().await.unwrap(), AuthOutcome::Success);
        let envelope = core.seal_entry("s3cret").unwrap();
        assert_eq!(core.open_entry(&envelope).unwrap().as_str(), "s3cret");
    }

    #[tokio::test]
    async fn test_async_round_trip() {
        let core = core();
        core.unlock().await.unwrap();
        let envelope = core
            .seal_entry_async(Zeroizing::new("async secret".into()))
            .await
            .unwrap();
        let plaintext = core.open_entry_async(envelope).await.unwrap();
        assert_eq!(plaintext.as_str(), "async secret");
    }

    #[tokio::test]
    async fn test_lock_blocks_again() {
        let core = core();
        core.unlock().await.unwrap();
        let envelope = core.seal_entry("s3cret").unwrap();
        core.lock().await.unwrap();
        assert!(matches!(core.open_entry(&envelope), Err(CoreError::Locked)));
    }

    #[tokio::test]
    async fn test_dead_session_refuses_entries() {
        let core = core();
        core.unlock().await.unwrap();
        let envelope = core.seal_entry("s3cret").unwrap();

        core.session().abort_owner();
        while core.is_unlocked() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(core.seal_entry("again"), Err(CoreError::Locked)));
        assert!(matches!(core.open_entry(&envelope), Err(CoreError::Locked)));
        assert!(matches!(core.rotate_key(), Err(CoreError::Locked)));
    }

    #[tokio::test]
    async fn test_rotate_requires_unlock() {
        let core = core();
        assert!(matches!(core.rotate_key(), Err(CoreError::Locked)));
        core.unlock().await.unwrap();
        let envelope = core.seal_entry("old").unwrap();
        assert_eq!(core.rotate_key().unwrap(), AuditEvent::KeyRotated);
        assert!(matches!(
            core.open_entry(&envelope),
            Err(CoreError::Crypto(CryptoError::AuthenticationFailed))
        ));
    }

    #[tokio::test]
    async fn test_delete_key_locks() {
        let core = core();
        core.unlock().await.unwrap();
        core.seal_entry("x").unwrap();
        assert_eq!(core.delete_key().await.unwrap(), AuditEvent::KeyDeleted);
        assert!(!core.is_unlocked());
        assert!(!core.engine().is_available());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = VaultConfig::default();
        config.keystore.alias.clear();
        assert!(matches!(
            VaultCore::new(MemoryStore::new(), Arc::new(AlwaysYes), &config),
            Err(CoreError::Config(_))
        ));
    }
}
