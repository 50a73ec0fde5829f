//! Hash implementations using RustCrypto.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384};

use crate::crypto::provider::{HashContext, HashProvider};
use crate::types::HashAlgorithm;

/// Hash context implementation using RustCrypto.
#[derive(Clone)]
enum RustCryptoHashContext {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha384(Sha384),
}

impl std::fmt::Debug for RustCryptoHashContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RustCryptoHashContext::Md5(_) => "Md5",
            RustCryptoHashContext::Sha1(_) => "Sha1",
            RustCryptoHashContext::Sha256(_) => "Sha256",
            RustCryptoHashContext::Sha384(_) => "Sha384",
        };
        f.debug_tuple("RustCryptoHashContext").field(&name).finish()
    }
}

impl HashContext for RustCryptoHashContext {
    fn update(&mut self, data: &[u8]) {
        match self {
            RustCryptoHashContext::Md5(ctx) => ctx.update(data),
            RustCryptoHashContext::Sha1(ctx) => ctx.update(data),
            RustCryptoHashContext::Sha256(ctx) => ctx.update(data),
            RustCryptoHashContext::Sha384(ctx) => ctx.update(data),
        }
    }

    fn clone_and_finalize(&self) -> Vec<u8> {
        match self.clone() {
            RustCryptoHashContext::Md5(ctx) => ctx.finalize().to_vec(),
            RustCryptoHashContext::Sha1(ctx) => ctx.finalize().to_vec(),
            RustCryptoHashContext::Sha256(ctx) => ctx.finalize().to_vec(),
            RustCryptoHashContext::Sha384(ctx) => ctx.finalize().to_vec(),
        }
    }
}

/// Hash provider implementation.
#[derive(Debug)]
pub(super) struct RustCryptoHashProvider;

impl HashProvider for RustCryptoHashProvider {
    fn create_hash(&self, algorithm: HashAlgorithm) -> Result<Box<dyn HashContext>, String> {
        let ctx = match algorithm {
            HashAlgorithm::Md5 => RustCryptoHashContext::Md5(Md5::new()),
            HashAlgorithm::Sha1 => RustCryptoHashContext::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => RustCryptoHashContext::Sha256(Sha256::new()),
            HashAlgorithm::Sha384 => RustCryptoHashContext::Sha384(Sha384::new()),
        };
        Ok(Box::new(ctx))
    }
}

/// Static instance of the hash provider.
pub(super) static HASH_PROVIDER: RustCryptoHashProvider = RustCryptoHashProvider;

/// One-shot digest, used by the signers.
pub(super) fn digest(algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    match algorithm {
        HashAlgorithm::Md5 => Md5::digest(data).to_vec(),
        HashAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
        HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
    }
}
