//! Opaque handle to the master key.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};

use super::error::KeyError;
use super::store::{KeyPolicy, KeyProtection, KeyPurpose, StoredKey};
use crate::crypto::{CryptoError, CryptoResult, NONCE_SIZE};

/// A loaded master key.
///
/// Only the encryption engine can use it: the cipher entry points are
/// crate-private, it cannot be cloned or serialized, and the key bytes are
/// zeroized when the handle drops.
pub struct KeyHandle {
    stored: StoredKey,
}

impl KeyHandle {
    pub(crate) fn new(stored: StoredKey) -> Self {
        Self { stored }
    }

    pub fn protection(&self) -> KeyProtection {
        self.stored.protection
    }

    pub fn policy(&self) -> &KeyPolicy {
        &self.stored.policy
    }

    #[cfg(test)]
    pub(crate) fn stored_bytes(&self) -> &[u8; super::store::KEY_LEN] {
        self.stored.material.as_bytes()
    }

    fn cipher(&self, purpose: KeyPurpose) -> CryptoResult<Aes256Gcm> {
        if !self.stored.policy.allows(purpose) {
            return Err(CryptoError::KeyUnavailable(KeyError::StoreUnavailable(
                format!("master key is not authorised for {:?}", purpose),
            )));
        }
        Aes256Gcm::new_from_slice(self.stored.material.as_bytes()).map_err(|e| {
            CryptoError::KeyUnavailable(KeyError::StoreUnavailable(format!("invalid key: {}", e)))
        })
    }

    /// Encrypt under `nonce`, returning ciphertext with the 16-byte tag appended.
    pub(crate) fn seal(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        // An all-zero IV means the caller never randomized it
        if self.stored.policy.randomized_encryption_required && nonce.iter().all(|b| *b == 0) {
            return Err(CryptoError::PredictableNonce);
        }
        let cipher = self.cipher(KeyPurpose::Encrypt)?;
        cipher
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt and verify ciphertext+tag under `nonce`.
    pub(crate) fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        let cipher = self.cipher(KeyPurpose::Decrypt)?;
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }
}

impl std::fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHandle")
            .field("protection", &self.stored.protection)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
