//! HKDF over the RustCrypto `hkdf` crate.

use hkdf::Hkdf;
use sha2::{Sha256, Sha384};

use crate::crypto::provider::HkdfProvider;
use crate::types::HashAlgorithm;

#[derive(Debug)]
pub(super) struct RustCryptoHkdfProvider;

// One extract/expand pair per digest.
macro_rules! hkdf_for {
    ($extract:ident, $expand:ident, $digest:ty) => {
        fn $extract(salt: &[u8], ikm: &[u8]) -> Vec<u8> {
            // An empty salt means HashLen zeros, which the crate does for `None`.
            let salt = (!salt.is_empty()).then_some(salt);
            let (prk, _) = Hkdf::<$digest>::extract(salt, ikm);
            prk.to_vec()
        }

        fn $expand(prk: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>, String> {
            let hk = Hkdf::<$digest>::from_prk(prk)
                .map_err(|_| "PRK shorter than the hash".to_string())?;
            let mut okm = vec![0u8; len];
            hk.expand(info, &mut okm)
                .map_err(|_| format!("cannot expand {len} bytes"))?;
            Ok(okm)
        }
    };
}

hkdf_for!(extract_sha256, expand_sha256, Sha256);
hkdf_for!(extract_sha384, expand_sha384, Sha384);

impl HkdfProvider for RustCryptoHkdfProvider {
    fn hkdf_extract(
        &self,
        hash: HashAlgorithm,
        salt: &[u8],
        ikm: &[u8],
    ) -> Result<Vec<u8>, String> {
        match hash {
            HashAlgorithm::Sha256 => Ok(extract_sha256(salt, ikm)),
            HashAlgorithm::Sha384 => Ok(extract_sha384(salt, ikm)),
            other => Err(format!("no HKDF for {other:?}")),
        }
    }

    fn hkdf_expand(
        &self,
        hash: HashAlgorithm,
        prk: &[u8],
        info: &[u8],
        output_len: usize,
    ) -> Result<Vec<u8>, String> {
        match hash {
            HashAlgorithm::Sha256 => expand_sha256(prk, info, output_len),
            HashAlgorithm::Sha384 => expand_sha384(prk, info, output_len),
            other => Err(format!("no HKDF for {other:?}")),
        }
    }
}

pub(super) static HKDF_PROVIDER: RustCryptoHkdfProvider = RustCryptoHkdfProvider;
