//! Cryptographic plumbing used by the TLS and DTLS engine.
//!
//! Primitives live behind [`CryptoProvider`]. The rest of this module is the
//! protocol-level glue around them: secret handling, the legacy PRF
//! derivations, the TLS 1.3 key schedule and record protection.

pub mod dh_groups;
pub mod provider;
pub mod rust_crypto;

mod secret;
pub use secret::Secret;

pub(crate) mod key_schedule;
pub(crate) mod prf;
pub(crate) mod record_cipher;

pub use provider::{ActiveKeyExchange, Aead, BlockCipher, CryptoProvider, CryptoSafe};
pub use provider::{CipherProvider, DhProvider, FiniteFieldExchange, SupportedKxGroup};
pub use provider::{HashContext, HashProvider, HkdfProvider, Hmac, HmacProvider};
pub use provider::{KeyProvider, PrfAlgorithm, PrfProvider};
pub use provider::{SecureRandom, SignatureVerifier, SigningKey};

pub use crate::types::{BulkCipher, HashAlgorithm, NamedGroup, SignatureScheme};
