//! HMAC and the TLS PRFs using RustCrypto.

use std::fmt;
use std::panic::{RefUnwindSafe, UnwindSafe};

use hmac::digest::{KeyInit, OutputSizeUser};
use hmac::{Hmac as RcHmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha384};

use crate::crypto::provider::{Hmac, HmacProvider, PrfAlgorithm, PrfProvider};
use crate::types::HashAlgorithm;

/// Keyed HMAC that can be finalized repeatedly.
struct KeyedHmac<M> {
    init: M,
    state: M,
}

impl<M> fmt::Debug for KeyedHmac<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedHmac").finish_non_exhaustive()
    }
}

impl<M> Hmac for KeyedHmac<M>
where
    M: Mac + KeyInit + Clone + Send + Sync + UnwindSafe + RefUnwindSafe + 'static,
{
    fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    fn finalize_reset(&mut self) -> Vec<u8> {
        let done = std::mem::replace(&mut self.state, self.init.clone());
        done.finalize().into_bytes().to_vec()
    }

    fn output_len(&self) -> usize {
        <M as OutputSizeUser>::output_size()
    }
}

fn keyed<M>(key: &[u8]) -> Result<Box<dyn Hmac>, String>
where
    M: Mac + KeyInit + Clone + Send + Sync + UnwindSafe + RefUnwindSafe + 'static,
{
    let init = <M as Mac>::new_from_slice(key).map_err(|_| "Invalid HMAC key".to_string())?;
    Ok(Box::new(KeyedHmac {
        state: init.clone(),
        init,
    }))
}

/// HMAC provider implementation.
#[derive(Debug)]
pub(super) struct RustCryptoHmacProvider;

impl HmacProvider for RustCryptoHmacProvider {
    fn create_hmac(&self, hash: HashAlgorithm, key: &[u8]) -> Result<Box<dyn Hmac>, String> {
        match hash {
            HashAlgorithm::Md5 => keyed::<RcHmac<Md5>>(key),
            HashAlgorithm::Sha1 => keyed::<RcHmac<Sha1>>(key),
            HashAlgorithm::Sha256 => keyed::<RcHmac<Sha256>>(key),
            HashAlgorithm::Sha384 => keyed::<RcHmac<Sha384>>(key),
        }
    }
}

/// Static instance of the HMAC provider.
pub(super) static HMAC_PROVIDER: RustCryptoHmacProvider = RustCryptoHmacProvider;

/// P_hash from RFC 5246 section 5.
fn p_hash(
    hash: HashAlgorithm,
    secret: &[u8],
    full_seed: &[u8],
    output_len: usize,
) -> Result<Vec<u8>, String> {
    let mut mac = HMAC_PROVIDER.create_hmac(hash, secret)?;
    let mut out = Vec::with_capacity(output_len + hash.output_len());

    // A(1) = HMAC_hash(secret, A(0)) where A(0) = seed
    mac.update(full_seed);
    let mut a = mac.finalize_reset();

    while out.len() < output_len {
        mac.update(&a);
        mac.update(full_seed);
        out.extend_from_slice(&mac.finalize_reset());

        mac.update(&a);
        a = mac.finalize_reset();
    }

    out.truncate(output_len);
    Ok(out)
}

/// PRF provider for TLS 1.0 to 1.2.
#[derive(Debug)]
pub(super) struct RustCryptoPrfProvider;

impl PrfProvider for RustCryptoPrfProvider {
    fn prf(
        &self,
        algorithm: PrfAlgorithm,
        secret: &[u8],
        label: &str,
        seed: &[u8],
        output_len: usize,
    ) -> Result<Vec<u8>, String> {
        if !label.is_ascii() {
            return Err("PRF label must be ASCII".to_string());
        }

        let mut full_seed = Vec::with_capacity(label.len() + seed.len());
        full_seed.extend_from_slice(label.as_bytes());
        full_seed.extend_from_slice(seed);

        match algorithm {
            PrfAlgorithm::Tls12(hash) => p_hash(hash, secret, &full_seed, output_len),
            PrfAlgorithm::Tls10 => {
                // The halves overlap by one byte when the secret length is odd.
                let half = secret.len().div_ceil(2);
                let s1 = &secret[..half];
                let s2 = &secret[secret.len() - half..];

                let mut out = p_hash(HashAlgorithm::Md5, s1, &full_seed, output_len)?;
                let sha = p_hash(HashAlgorithm::Sha1, s2, &full_seed, output_len)?;
                for (o, s) in out.iter_mut().zip(sha) {
                    *o ^= s;
                }
                Ok(out)
            }
        }
    }
}

/// Static instance of the PRF provider.
pub(super) static PRF_PROVIDER: RustCryptoPrfProvider = RustCryptoPrfProvider;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_sha256_rfc4231_case_2() {
        let tag = HMAC_PROVIDER
            .hmac(
                HashAlgorithm::Sha256,
                b"Jefe",
                b"what do ya want for nothing?",
            )
            .unwrap();
        assert_eq!(
            tag[..8],
            [0x5b, 0xdc, 0xc1, 0x46, 0xbf, 0x60, 0x75, 0x4e]
        );
    }

    #[test]
    fn finalize_reset_restarts_from_key() {
        let mut h = HMAC_PROVIDER.create_hmac(HashAlgorithm::Sha1, b"k").unwrap();
        h.update(b"abc");
        let a = h.finalize_reset();
        h.update(b"abc");
        let b = h.finalize_reset();
        assert_eq!(a, b);
        assert_eq!(h.output_len(), 20);
    }

    #[test]
    fn prf_output_length_and_determinism() {
        for alg in [
            PrfAlgorithm::Tls10,
            PrfAlgorithm::Tls12(HashAlgorithm::Sha256),
            PrfAlgorithm::Tls12(HashAlgorithm::Sha384),
        ] {
            let a = PRF_PROVIDER.prf(alg, &[7; 48], "key expansion", &[1; 64], 104).unwrap();
            let b = PRF_PROVIDER.prf(alg, &[7; 48], "key expansion", &[1; 64], 104).unwrap();
            assert_eq!(a.len(), 104);
            assert_eq!(a, b);
            let c = PRF_PROVIDER.prf(alg, &[8; 48], "key expansion", &[1; 64], 104).unwrap();
            assert_ne!(a, c);
        }
    }

    #[test]
    fn tls10_prf_differs_from_tls12() {
        let a = PRF_PROVIDER
            .prf(PrfAlgorithm::Tls10, b"secret", "label", b"seed", 32)
            .unwrap();
        let b = PRF_PROVIDER
            .prf(PrfAlgorithm::Tls12(HashAlgorithm::Sha256), b"secret", "label", b"seed", 32)
            .unwrap();
        assert_ne!(a, b);
    }
}
