//! Pure Rust crypto provider built on the [RustCrypto](https://github.com/RustCrypto) crates.
//!
//! This is what [`Config::builder()`](crate::Config::builder) falls back to
//! when no provider is given and none is installed as process default.
//!
//! ```
//! use tlsproto::Config;
//! use tlsproto::crypto::{rust_crypto, CryptoProvider};
//!
//! // Optional: make it the process-wide default.
//! let _ = CryptoProvider::install_default(rust_crypto::default_provider());
//!
//! let config = Config::builder().build().unwrap();
//! # let _ = config;
//! ```

mod cipher;
mod dh;
mod hash;
mod hkdf;
mod hmac;
mod kx_group;
mod random;
mod sign;

use crate::crypto::provider::CryptoProvider;

/// The RustCrypto-based crypto provider.
///
/// # Record protection
///
/// - AES-128-GCM and AES-256-GCM (`aes-gcm`)
/// - AES-128-CBC and AES-256-CBC (`aes`, chaining done here)
///
/// # Key exchange
///
/// - `x25519` (`x25519-dalek`)
/// - `secp256r1`, `secp384r1` (`p256`, `p384`)
/// - Finite field DH over any allow-listed group (`num-bigint`)
///
/// # Signatures
///
/// - ECDSA P-256 with SHA-256 or SHA-1, P-384 with SHA-384
/// - RSA PKCS#1 v1.5 with SHA-1, SHA-256 or SHA-384
///
/// Private keys load from PKCS#8, SEC1 or PKCS#1 DER, or PKCS#8 PEM.
///
/// # Hashes and derivation
///
/// MD5, SHA-1, SHA-256, SHA-384, HMAC over each, the TLS 1.0 and 1.2 PRFs
/// and HKDF. Randomness comes from `OsRng`.
pub fn default_provider() -> CryptoProvider {
    CryptoProvider {
        kx_groups: kx_group::ALL_KX_GROUPS,
        dh: &dh::DH_PROVIDER,
        ciphers: &cipher::CIPHER_PROVIDER,
        signature_verification: &sign::SIGNATURE_VERIFIER,
        key_provider: &sign::KEY_PROVIDER,
        secure_random: &random::SECURE_RANDOM,
        hash_provider: &hash::HASH_PROVIDER,
        hmac_provider: &hmac::HMAC_PROVIDER,
        prf_provider: &hmac::PRF_PROVIDER,
        hkdf_provider: &hkdf::HKDF_PROVIDER,
    }
}
