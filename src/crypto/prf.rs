//! Key derivation for TLS 1.2 and earlier (RFC 5246 section 6.3, 8.1, RFC 7627).

use super::provider::{CryptoProvider, PrfAlgorithm};
use super::Secret;
use crate::types::{CipherSuite, ProtocolVersion};
use crate::Error;

/// Master secret length is fixed for every legacy version.
pub const MASTER_SECRET_LEN: usize = 48;

/// Finished verify_data length.
pub const VERIFY_DATA_LEN: usize = 12;

/// The PRF used with a negotiated version and suite.
pub fn prf_algorithm(version: ProtocolVersion, suite: CipherSuite) -> PrfAlgorithm {
    if version.is_tls12_or_later() {
        PrfAlgorithm::Tls12(suite.hash())
    } else {
        PrfAlgorithm::Tls10
    }
}

fn prf(
    provider: &CryptoProvider,
    alg: PrfAlgorithm,
    secret: &[u8],
    label: &str,
    seed: &[u8],
    len: usize,
) -> Result<Vec<u8>, Error> {
    provider
        .prf_provider
        .prf(alg, secret, label, seed, len)
        .map_err(|e| Error::internal(format!("PRF failed: {e}")))
}

/// master_secret = PRF(pre_master_secret, "master secret", client_random + server_random)
pub fn master_secret(
    provider: &CryptoProvider,
    alg: PrfAlgorithm,
    pre_master_secret: &[u8],
    client_random: &[u8],
    server_random: &[u8],
) -> Result<Secret, Error> {
    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);
    let ms = prf(
        provider,
        alg,
        pre_master_secret,
        "master secret",
        &seed,
        MASTER_SECRET_LEN,
    )?;
    Ok(Secret::new(ms))
}

/// master_secret = PRF(pre_master_secret, "extended master secret", session_hash)
pub fn extended_master_secret(
    provider: &CryptoProvider,
    alg: PrfAlgorithm,
    pre_master_secret: &[u8],
    session_hash: &[u8],
) -> Result<Secret, Error> {
    let ms = prf(
        provider,
        alg,
        pre_master_secret,
        "extended master secret",
        session_hash,
        MASTER_SECRET_LEN,
    )?;
    Ok(Secret::new(ms))
}

/// key_block = PRF(master_secret, "key expansion", server_random + client_random)
pub fn key_block(
    provider: &CryptoProvider,
    alg: PrfAlgorithm,
    master_secret: &Secret,
    client_random: &[u8],
    server_random: &[u8],
    len: usize,
) -> Result<Secret, Error> {
    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(server_random);
    seed.extend_from_slice(client_random);
    let kb = prf(
        provider,
        alg,
        master_secret.expose()?,
        "key expansion",
        &seed,
        len,
    )?;
    Ok(Secret::new(kb))
}

/// verify_data = PRF(master_secret, finished_label, handshake_hash)
pub fn verify_data(
    provider: &CryptoProvider,
    alg: PrfAlgorithm,
    master_secret: &Secret,
    is_client: bool,
    handshake_hash: &[u8],
) -> Result<Vec<u8>, Error> {
    let label = if is_client {
        "client finished"
    } else {
        "server finished"
    };
    prf(
        provider,
        alg,
        master_secret.expose()?,
        label,
        handshake_hash,
        VERIFY_DATA_LEN,
    )
}

/// Constant time comparison for MACs and verify data.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
