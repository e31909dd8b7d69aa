use std::sync::Arc;

use base64::Engine;
use memoripass_core::crypto::{CryptoError, EncryptionEngine, Envelope, NONCE_SIZE, TAG_SIZE};
use memoripass_core::keystore::{KeyCustodian, MemoryStore};
use proptest::prelude::*;

fn engine() -> EncryptionEngine {
    EncryptionEngine::new(Arc::new(KeyCustodian::new(MemoryStore::new())))
}

fn decode(envelope: &Envelope) -> Vec<u8> {
    base64::engine::general_purpose::STANDARD
        .decode(envelope.as_str())
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn round_trip_any_non_empty_text(plaintext in ".{1,256}") {
        let engine = engine();
        let envelope = engine.encrypt(&plaintext).unwrap();
        let decrypted = engine.decrypt(&envelope).unwrap();
        prop_assert_eq!(decrypted.as_str(), plaintext.as_str());
    }

    #[test]
    fn envelope_size_tracks_plaintext(plaintext in ".{1,128}") {
        let envelope = engine().encrypt(&plaintext).unwrap();
        prop_assert_eq!(decode(&envelope).len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn any_bit_flip_fails_authentication(
        plaintext in ".{1,64}",
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let engine = engine();
        let envelope = engine.encrypt(&plaintext).unwrap();
        let mut raw = decode(&envelope);
        let index = position.index(raw.len());
        raw[index] ^= 1 << bit;

        let tampered = Envelope::from_encoded(base64::engine::general_purpose::STANDARD.encode(&raw));
        prop_assert_eq!(engine.decrypt(&tampered).unwrap_err(), CryptoError::AuthenticationFailed);
    }

    #[test]
    fn truncated_envelopes_are_malformed(len in 0usize..NONCE_SIZE) {
        let engine = engine();
        engine.encrypt("provision").unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode(vec![0xA5u8; len]);
        prop_assert!(matches!(
            engine.decrypt(&Envelope::from_encoded(encoded)),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }
}
