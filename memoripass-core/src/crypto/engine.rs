//! EncryptionEngine - AES-256-GCM envelope encryption under the master key.
//!
//! Every call draws a fresh 96-bit IV, so sealing the same plaintext twice
//! yields different envelopes. A 128-bit tag covers the ciphertext, and
//! through GCM the IV as well; any modification fails closed.

use std::sync::Arc;

use rand::RngCore;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use zeroize::{Zeroize, Zeroizing};

use super::envelope::{Envelope, NONCE_SIZE, TAG_SIZE};
use super::error::{CryptoError, CryptoResult};
use crate::keystore::{KeyCustodian, KeyError, KeyHandle, KeyStoreInfo};

/// Cipher transformation name, as platforms spell it.
pub const TRANSFORMATION: &str = "AES/GCM/NoPadding";

/// Diagnostic description of the engine. Contains no secrets.
#[derive(Debug, Clone, Serialize)]
pub struct CryptoInfo {
    pub transformation: &'static str,
    pub iv_size_bytes: usize,
    pub tag_size_bits: usize,
    pub key_store: KeyStoreInfo,
}

/// Turns plaintext secrets into envelopes and back.
#[derive(Debug, Clone)]
pub struct EncryptionEngine {
    custodian: Arc<KeyCustodian>,
}

impl EncryptionEngine {
    pub fn new(custodian: Arc<KeyCustodian>) -> Self {
        Self { custodian }
    }

    pub fn custodian(&self) -> &Arc<KeyCustodian> {
        &self.custodian
    }

    /// Load the key, provisioning one on first use.
    ///
    /// A missing key looks the same whether this is the first run or the key
    /// was rotated away; both provision a new one.
    fn encryption_key(&self) -> CryptoResult<KeyHandle> {
        match self.custodian.get() {
            Ok(key) => Ok(key),
            Err(KeyError::NotFound) => {
                info!("Master key not found, generating new key");
                self.custodian.generate()?;
                Ok(self.custodian.get()?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Seal `plaintext` into a new envelope.
    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<Envelope> {
        if plaintext.is_empty() {
            return Err(CryptoError::EmptyInput);
        }

        let key = self.encryption_key()?;

        let mut nonce = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce);

        let sealed = Zeroizing::new(key.seal(&nonce, plaintext.as_bytes()).map_err(|e| {
            error!("Encryption failed: {}", e);
            e
        })?);
        let envelope = Envelope::assemble(&nonce, &sealed);
        nonce.zeroize();

        debug!(
            "Encryption successful ({} byte ciphertext)",
            sealed.len() - TAG_SIZE
        );
        Ok(envelope)
    }

    /// Seal `plaintext` and wipe the caller's buffer, whatever the outcome.
    pub fn encrypt_and_clear(&self, plaintext: &mut String) -> CryptoResult<Envelope> {
        let result = self.encrypt(plaintext);
        plaintext.zeroize();
        result
    }

    /// Open an envelope.
    ///
    /// Never provisions a key: with no key present this is `KeyUnavailable`.
    /// The returned string is wiped when dropped.
    pub fn decrypt(&self, envelope: &Envelope) -> CryptoResult<Zeroizing<String>> {
        let parts = envelope.split().map_err(|e| {
            warn!("Rejected envelope: {}", e);
            e
        })?;

        let key = self.custodian.get()?;

        let plaintext = Zeroizing::new(key.open(parts.nonce(), parts.sealed()).map_err(|e| {
            warn!("Envelope failed authentication");
            e
        })?);

        let text = std::str::from_utf8(&plaintext).map_err(|_| {
            CryptoError::MalformedEnvelope("plaintext is not valid UTF-8".into())
        })?;

        debug!("Decryption successful");
        Ok(Zeroizing::new(text.to_owned()))
    }

    /// Whether a master key is present.
    pub fn is_available(&self) -> bool {
        self.custodian.exists()
    }

    /// Delete and regenerate the master key.
    ///
    /// # Warning
    /// All existing envelopes become undecryptable. Only call after explicit
    /// user confirmation, never as automated recovery.
    pub fn rotate_key(&self) -> CryptoResult<()> {
        self.custodian.rotate().map_err(|e| {
            error!("Failed to regenerate master key: {}", e);
            CryptoError::from(e)
        })
    }

    pub fn info(&self) -> CryptoInfo {
        CryptoInfo {
            transformation: TRANSFORMATION,
            iv_size_bytes: NONCE_SIZE,
            tag_size_bits: TAG_SIZE * 8,
            key_store: self.custodian.info(),
        }
    }
}
