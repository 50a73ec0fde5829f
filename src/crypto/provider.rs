//! Cryptographic provider traits for pluggable crypto backends.
//!
//! The engine never implements a primitive itself. It sequences calls into a
//! [`CryptoProvider`], a struct of static references to trait objects, each
//! representing one capability keyed by algorithm identifiers.
//!
//! # Components
//!
//! - **Ciphers** ([`CipherProvider`]): AEAD and CBC block cipher instances
//! - **Key exchange groups** ([`SupportedKxGroup`]): ECDHE over named curves
//! - **Finite field DH** ([`DhProvider`]): DHE over explicit (p, g)
//! - **Signature verification** ([`SignatureVerifier`]): using a peer certificate
//! - **Key provider** ([`KeyProvider`]): load private keys into [`SigningKey`]s
//! - **Secure random** ([`SecureRandom`])
//! - **Hash**, **HMAC**, **PRF** and **HKDF** providers
//!
//! # Using a custom provider
//!
//! ```
//! use tlsproto::Config;
//! use tlsproto::crypto::rust_crypto;
//!
//! let provider = rust_crypto::default_provider();
//! let config = Config::builder()
//!     .with_crypto_provider(provider)
//!     .build()
//!     .unwrap();
//! # let _ = config;
//! ```
//!
//! # Thread safety
//!
//! All provider traits require `Send + Sync + UnwindSafe + RefUnwindSafe`.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};
use std::sync::OnceLock;

use crate::buffer::Buf;
use crate::types::{BulkCipher, HashAlgorithm, NamedGroup, SignatureScheme};

/// Marker trait for types that are safe to use in crypto provider components.
pub trait CryptoSafe: Send + Sync + Debug + UnwindSafe + RefUnwindSafe {}

impl<T: Send + Sync + Debug + UnwindSafe + RefUnwindSafe> CryptoSafe for T {}

// ============================================================================
// Instance traits (created by factories)
// ============================================================================

/// AEAD cipher for in-place encryption/decryption.
pub trait Aead: CryptoSafe {
    /// Encrypt in place, appending the tag.
    fn seal(&self, nonce: &[u8], aad: &[u8], data: &mut Buf) -> Result<(), String>;

    /// Verify and decrypt in place, removing the tag.
    fn open(&self, nonce: &[u8], aad: &[u8], data: &mut Buf) -> Result<(), String>;

    /// Authentication tag length.
    fn tag_len(&self) -> usize {
        16
    }
}

/// Block cipher used in CBC mode. Data length must be a multiple of the block size.
pub trait BlockCipher: CryptoSafe {
    fn block_size(&self) -> usize {
        16
    }

    fn encrypt_cbc(&self, iv: &[u8], data: &mut [u8]) -> Result<(), String>;

    fn decrypt_cbc(&self, iv: &[u8], data: &mut [u8]) -> Result<(), String>;
}

/// Stateful hash context for incremental hashing.
pub trait HashContext: CryptoSafe {
    fn update(&mut self, data: &[u8]);

    /// Finalize a copy. The original context can continue to be updated.
    fn clone_and_finalize(&self) -> Vec<u8>;
}

/// Incremental HMAC.
pub trait Hmac: CryptoSafe {
    fn update(&mut self, data: &[u8]);

    /// Produce the tag and reset to the keyed initial state.
    fn finalize_reset(&mut self) -> Vec<u8>;

    fn output_len(&self) -> usize;
}

/// Private key producing handshake signatures.
pub trait SigningKey: CryptoSafe {
    /// Sign `data`, hashing it according to `scheme`.
    fn sign(&mut self, scheme: SignatureScheme, data: &[u8]) -> Result<Vec<u8>, String>;

    /// Schemes this key can produce, in preference order.
    fn schemes(&self) -> &'static [SignatureScheme];
}

/// Ephemeral ECDH keypair for one handshake.
pub trait ActiveKeyExchange: CryptoSafe {
    fn pub_key(&self) -> &[u8];

    /// Complete the exchange with the peer's public key, returning the shared secret.
    fn complete(self: Box<Self>, peer_pub: &[u8]) -> Result<Vec<u8>, String>;

    fn group(&self) -> NamedGroup;
}

/// Ephemeral finite field DH keypair for one handshake.
pub trait FiniteFieldExchange: CryptoSafe {
    /// Public value `g^x mod p`, big-endian without leading zeros.
    fn pub_key(&self) -> &[u8];

    /// Shared secret `y^x mod p`, big-endian without leading zeros.
    fn complete(self: Box<Self>, peer_pub: &[u8]) -> Result<Vec<u8>, String>;
}

// ============================================================================
// Factory traits (referenced by CryptoProvider)
// ============================================================================

/// Factory for record protection ciphers.
pub trait CipherProvider: CryptoSafe {
    fn create_aead(&self, cipher: BulkCipher, key: &[u8]) -> Result<Box<dyn Aead>, String>;

    fn create_block_cipher(
        &self,
        cipher: BulkCipher,
        key: &[u8],
    ) -> Result<Box<dyn BlockCipher>, String>;
}

/// Key exchange group support (factory for ActiveKeyExchange).
pub trait SupportedKxGroup: CryptoSafe {
    fn name(&self) -> NamedGroup;

    /// Start a new key exchange, generating an ephemeral keypair.
    fn start_exchange(&self) -> Result<Box<dyn ActiveKeyExchange>, String>;
}

/// Finite field Diffie-Hellman over explicit parameters.
pub trait DhProvider: CryptoSafe {
    fn start_exchange(
        &self,
        prime: &[u8],
        generator: &[u8],
    ) -> Result<Box<dyn FiniteFieldExchange>, String>;
}

/// Signature verification against certificates.
pub trait SignatureVerifier: CryptoSafe {
    /// Verify a signature on data using a DER-encoded X.509 certificate.
    fn verify_signature(
        &self,
        cert_der: &[u8],
        data: &[u8],
        signature: &[u8],
        scheme: SignatureScheme,
    ) -> Result<(), String>;
}

/// Private key parser (factory for SigningKey).
pub trait KeyProvider: CryptoSafe {
    /// Parse and load a private key from DER/PEM bytes.
    fn load_private_key(&self, key_der: &[u8]) -> Result<Box<dyn SigningKey>, String>;
}

/// Secure random number generator.
pub trait SecureRandom: CryptoSafe {
    fn fill(&self, buf: &mut [u8]) -> Result<(), String>;
}

/// Hash provider (factory for HashContext).
pub trait HashProvider: CryptoSafe {
    fn create_hash(&self, algorithm: HashAlgorithm) -> Result<Box<dyn HashContext>, String>;
}

/// HMAC provider.
pub trait HmacProvider: CryptoSafe {
    fn create_hmac(&self, hash: HashAlgorithm, key: &[u8]) -> Result<Box<dyn Hmac>, String>;

    /// One-shot HMAC.
    fn hmac(&self, hash: HashAlgorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>, String> {
        let mut h = self.create_hmac(hash, key)?;
        h.update(data);
        Ok(h.finalize_reset())
    }
}

/// Which PRF construction to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrfAlgorithm {
    /// TLS 1.0/1.1: P_MD5 xor P_SHA1 over split secret halves.
    Tls10,
    /// TLS 1.2: P_hash with the suite hash.
    Tls12(HashAlgorithm),
}

/// PRF for TLS 1.2 and earlier key derivation.
pub trait PrfProvider: CryptoSafe {
    fn prf(
        &self,
        algorithm: PrfAlgorithm,
        secret: &[u8],
        label: &str,
        seed: &[u8],
        output_len: usize,
    ) -> Result<Vec<u8>, String>;
}

/// HKDF (RFC 5869) for the TLS 1.3 key schedule.
pub trait HkdfProvider: CryptoSafe {
    /// PRK = HKDF-Extract(salt, IKM)
    fn hkdf_extract(&self, hash: HashAlgorithm, salt: &[u8], ikm: &[u8])
        -> Result<Vec<u8>, String>;

    /// OKM = HKDF-Expand(PRK, info, L)
    fn hkdf_expand(
        &self,
        hash: HashAlgorithm,
        prk: &[u8],
        info: &[u8],
        output_len: usize,
    ) -> Result<Vec<u8>, String>;
}

// ============================================================================
// Core provider struct
// ============================================================================

/// Cryptographic provider for TLS and DTLS operations.
#[derive(Debug, Clone)]
pub struct CryptoProvider {
    /// Supported ECDHE groups, in preference order.
    pub kx_groups: &'static [&'static dyn SupportedKxGroup],

    /// Finite field DH.
    pub dh: &'static dyn DhProvider,

    /// Record protection ciphers.
    pub ciphers: &'static dyn CipherProvider,

    /// Signature verification for certificates.
    pub signature_verification: &'static dyn SignatureVerifier,

    /// Key provider for parsing private keys.
    pub key_provider: &'static dyn KeyProvider,

    pub secure_random: &'static dyn SecureRandom,

    /// Hash provider for the transcript and signatures.
    pub hash_provider: &'static dyn HashProvider,

    pub hmac_provider: &'static dyn HmacProvider,

    /// PRF for TLS 1.2 and earlier.
    pub prf_provider: &'static dyn PrfProvider,

    /// HKDF for TLS 1.3.
    pub hkdf_provider: &'static dyn HkdfProvider,
}

static DEFAULT: OnceLock<CryptoProvider> = OnceLock::new();

impl CryptoProvider {
    /// Install a process-wide default provider.
    ///
    /// Used by [`Config::builder()`](crate::Config::builder) when no explicit
    /// provider is given. Returns the provider back if one was already installed.
    pub fn install_default(provider: CryptoProvider) -> Result<(), CryptoProvider> {
        DEFAULT.set(provider)
    }

    /// The installed default provider, if any.
    pub fn get_default() -> Option<&'static CryptoProvider> {
        DEFAULT.get()
    }

    /// Find the ECDHE group implementation for `group`.
    pub fn kx_group(&self, group: NamedGroup) -> Option<&'static dyn SupportedKxGroup> {
        self.kx_groups.iter().copied().find(|g| g.name() == group)
    }

    /// Random bytes as a fixed array.
    pub(crate) fn random_array<const N: usize>(&self) -> Result<[u8; N], crate::Error> {
        let mut out = [0u8; N];
        self.secure_random
            .fill(&mut out)
            .map_err(|e| crate::Error::internal(format!("random: {e}")))?;
        Ok(out)
    }

    pub(crate) fn random_vec(&self, len: usize) -> Result<Vec<u8>, crate::Error> {
        let mut out = vec![0u8; len];
        self.secure_random
            .fill(&mut out)
            .map_err(|e| crate::Error::internal(format!("random: {e}")))?;
        Ok(out)
    }

    pub(crate) fn hash(&self, alg: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>, crate::Error> {
        let mut h = self
            .hash_provider
            .create_hash(alg)
            .map_err(crate::Error::internal)?;
        h.update(data);
        Ok(h.clone_and_finalize())
    }
}
