//! The ciphertext envelope and its wire format.
//!
//! Format: `base64( iv[12] || ciphertext || tag[16] )`, standard alphabet
//! with padding, no separators and no version byte. Decoding needs nothing
//! but the key.

use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::error::{CryptoError, CryptoResult};

/// IV size for AES-GCM (96 bits = 12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (128 bits = 16 bytes)
pub const TAG_SIZE: usize = 16;

/// Length of the base64 text encoding exactly `NONCE_SIZE` bytes.
const MIN_ENCODED_LEN: usize = NONCE_SIZE.div_ceil(3) * 4;

/// A sealed secret, as handed to the persistence layer.
///
/// The inner string is the base64 wire format. `Debug` prints only the
/// length so envelopes never end up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope(String);

impl Envelope {
    /// Wrap an encoded envelope read from storage. Validation happens on decrypt.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Build an envelope from an IV and the cipher output (ciphertext || tag).
    pub(crate) fn assemble(nonce: &[u8; NONCE_SIZE], sealed: &[u8]) -> Self {
        let mut raw = Zeroizing::new(Vec::with_capacity(NONCE_SIZE + sealed.len()));
        raw.extend_from_slice(nonce);
        raw.extend_from_slice(sealed);
        Self(base64::engine::general_purpose::STANDARD.encode(raw.as_slice()))
    }

    /// Decode and split into IV and ciphertext || tag.
    pub(crate) fn split(&self) -> CryptoResult<EnvelopeParts> {
        if self.0.len() < MIN_ENCODED_LEN {
            return Err(CryptoError::MalformedEnvelope(
                "shorter than the IV".into(),
            ));
        }

        let raw = Zeroizing::new(
            base64::engine::general_purpose::STANDARD
                .decode(self.0.as_bytes())
                .map_err(|e| CryptoError::MalformedEnvelope(format!("invalid base64: {}", e)))?,
        );

        if raw.len() < NONCE_SIZE {
            return Err(CryptoError::MalformedEnvelope(
                "shorter than the IV".into(),
            ));
        }
        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::MalformedEnvelope(
                "too short to hold an authentication tag".into(),
            ));
        }

        Ok(EnvelopeParts { raw })
    }
}

impl From<String> for Envelope {
    fn from(encoded: String) -> Self {
        Self(encoded)
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("encoded_len", &self.0.len())
            .finish()
    }
}

/// Decoded envelope bytes, cleared on drop.
#[cfg_attr(test, derive(Debug))]
pub(crate) struct EnvelopeParts {
    raw: Zeroizing<Vec<u8>>,
}

impl EnvelopeParts {
    pub(crate) fn nonce(&self) -> &[u8] {
        &self.raw[..NONCE_SIZE]
    }

    /// Ciphertext with the tag appended.
    pub(crate) fn sealed(&self) -> &[u8] {
        &self.raw[NONCE_SIZE..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_encoded_len() {
        assert_eq!(MIN_ENCODED_LEN, 16);
    }

    #[test]
    fn test_layout() {
        let nonce = [1u8; NONCE_SIZE];
        let sealed = [2u8; 20];
        let envelope = Envelope::assemble(&nonce, &sealed);
        let parts = envelope.split().unwrap();
        assert_eq!(parts.nonce(), &nonce);
        assert_eq!(parts.sealed(), &sealed);

        let raw = base64::engine::general_purpose::STANDARD
            .decode(envelope.as_str())
            .unwrap();
        assert_eq!(raw.len(), NONCE_SIZE + 20);
        assert_eq!(&raw[..NONCE_SIZE], &nonce);
    }

    #[test]
    fn test_short_input_rejected_before_decoding() {
        // Not valid base64 either, but the length check must win
        let err = Envelope::from_encoded("@@@").split().unwrap_err();
        assert_eq!(err, CryptoError::MalformedEnvelope("shorter than the IV".into()));
    }

    #[test]
    fn test_eleven_raw_bytes_rejected() {
        let encoded = base64::engine::general_purpose::STANDARD.encode([7u8; 11]);
        let err = Envelope::from_encoded(encoded).split().unwrap_err();
        assert!(matches!(err, CryptoError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let err = Envelope::from_encoded("!!!!!!!!!!!!!!!!!!!!!!!!")
            .split()
            .unwrap_err();
        assert!(matches!(err, CryptoError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_missing_tag_rejected() {
        let encoded = base64::engine::general_purpose::STANDARD.encode([7u8; NONCE_SIZE + 4]);
        let err = Envelope::from_encoded(encoded).split().unwrap_err();
        assert!(matches!(err, CryptoError::MalformedEnvelope(_)));
    }

    #[test]
    fn test_debug_hides_contents() {
        let envelope = Envelope::from_encoded("c2VjcmV0LWNpcGhlcnRleHQ=");
        let debug = format!("{:?}", envelope);
        assert!(!debug.contains("c2Vj"));
        assert!(debug.contains("encoded_len"));
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let envelope = Envelope::from_encoded("abcd");
        assert_eq!(serde_json::to_string(&envelope).unwrap(), "\"abcd\"");
        let parsed: Envelope = serde_json::from_str("\"abcd\"").unwrap();
        assert_eq!(parsed, envelope);
    }
}
