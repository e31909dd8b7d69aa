//! Envelope encryption of vault secrets under the master key.

pub mod engine;
pub mod envelope;
pub mod error;

pub use engine::{CryptoInfo, EncryptionEngine, TRANSFORMATION};
pub use envelope::{Envelope, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
