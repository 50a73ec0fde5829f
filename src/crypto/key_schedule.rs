//! TLS 1.3 Key Schedule (RFC 8446 Section 7.1)
//!
//! ```text
//!              0
//!              |
//!              v
//!    PSK ->  HKDF-Extract = Early Secret
//!              |
//!              v
//!        Derive-Secret(., "derived", "")
//!              |
//!              v
//!    (EC)DHE -> HKDF-Extract = Handshake Secret
//!              |
//!              +-----> Derive-Secret(., "c hs traffic", ClientHello...ServerHello)
//!              +-----> Derive-Secret(., "s hs traffic", ClientHello...ServerHello)
//!              v
//!        Derive-Secret(., "derived", "")
//!              |
//!              v
//!    0 -> HKDF-Extract = Master Secret
//!              |
//!              +-----> Derive-Secret(., "c ap traffic", ClientHello...server Finished)
//!              +-----> Derive-Secret(., "s ap traffic", ClientHello...server Finished)
//!              +-----> Derive-Secret(., "res master", ClientHello...client Finished)
//! ```
//!
//! No external PSK is used, so the early secret always starts from zeros.

use super::provider::CryptoProvider;
use super::Secret;
use crate::types::HashAlgorithm;
use crate::Error;

/// HKDF-Expand-Label(Secret, Label, Context, Length)
pub fn hkdf_expand_label(
    provider: &CryptoProvider,
    hash: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    len: usize,
) -> Result<Vec<u8>, Error> {
    let full_label_len = 6 + label.len();
    if full_label_len > 255 || context.len() > 255 || len > 0xffff {
        return Err(Error::internal("HKDF-Expand-Label input too long"));
    }

    let mut info = Vec::with_capacity(4 + full_label_len + context.len());
    info.extend_from_slice(&(len as u16).to_be_bytes());
    info.push(full_label_len as u8);
    info.extend_from_slice(b"tls13 ");
    info.extend_from_slice(label);
    info.push(context.len() as u8);
    info.extend_from_slice(context);

    provider
        .hkdf_provider
        .hkdf_expand(hash, secret, &info, len)
        .map_err(|e| Error::internal(format!("HKDF expand: {e}")))
}

/// Traffic key and IV for one direction.
#[derive(Debug)]
pub struct TrafficKeys {
    pub key: Secret,
    pub iv: [u8; 12],
}

/// Derive write key and IV from a traffic secret.
pub fn traffic_keys(
    provider: &CryptoProvider,
    hash: HashAlgorithm,
    traffic_secret: &Secret,
    key_len: usize,
) -> Result<TrafficKeys, Error> {
    let secret = traffic_secret.expose()?;
    let key = hkdf_expand_label(provider, hash, secret, b"key", &[], key_len)?;
    let iv_bytes = hkdf_expand_label(provider, hash, secret, b"iv", &[], 12)?;
    let mut iv = [0u8; 12];
    iv.copy_from_slice(&iv_bytes);
    Ok(TrafficKeys {
        key: Secret::new(key),
        iv,
    })
}

/// finished_key = HKDF-Expand-Label(BaseKey, "finished", "", Hash.length)
pub fn finished_verify_data(
    provider: &CryptoProvider,
    hash: HashAlgorithm,
    base_key: &Secret,
    transcript_hash: &[u8],
) -> Result<Vec<u8>, Error> {
    let finished_key = Secret::new(hkdf_expand_label(
        provider,
        hash,
        base_key.expose()?,
        b"finished",
        &[],
        hash.output_len(),
    )?);
    provider
        .hmac_provider
        .hmac(hash, finished_key.expose()?, transcript_hash)
        .map_err(|e| Error::internal(format!("HMAC: {e}")))
}

/// application_traffic_secret_N+1 = HKDF-Expand-Label(secret_N, "traffic upd", "", Hash.length)
pub fn next_traffic_secret(
    provider: &CryptoProvider,
    hash: HashAlgorithm,
    current: &Secret,
) -> Result<Secret, Error> {
    let next = hkdf_expand_label(
        provider,
        hash,
        current.expose()?,
        b"traffic upd",
        &[],
        hash.output_len(),
    )?;
    Ok(Secret::new(next))
}

/// Progression through the schedule. Each stage consumes the previous one.
#[derive(Debug)]
pub struct KeySchedule {
    hash: HashAlgorithm,
    /// Derive-Secret(current stage, "derived", "") ready to salt the next extract.
    derived: Secret,
    stage_secret: Secret,
}

impl KeySchedule {
    /// Start with no PSK: Early Secret = HKDF-Extract(0, 0).
    pub fn new(provider: &CryptoProvider, hash: HashAlgorithm) -> Result<Self, Error> {
        let zeros = vec![0u8; hash.output_len()];
        let early = provider
            .hkdf_provider
            .hkdf_extract(hash, &[], &zeros)
            .map_err(|e| Error::internal(format!("HKDF extract: {e}")))?;
        let early = Secret::new(early);
        let derived = Self::derive_for_next(provider, hash, &early)?;
        Ok(KeySchedule {
            hash,
            derived,
            stage_secret: early,
        })
    }

    fn derive_for_next(
        provider: &CryptoProvider,
        hash: HashAlgorithm,
        secret: &Secret,
    ) -> Result<Secret, Error> {
        let empty_hash = provider.hash(hash, &[])?;
        let d = hkdf_expand_label(
            provider,
            hash,
            secret.expose()?,
            b"derived",
            &empty_hash,
            hash.output_len(),
        )?;
        Ok(Secret::new(d))
    }

    fn extract(&mut self, provider: &CryptoProvider, ikm: &[u8]) -> Result<(), Error> {
        let next = provider
            .hkdf_provider
            .hkdf_extract(self.hash, self.derived.expose()?, ikm)
            .map_err(|e| Error::internal(format!("HKDF extract: {e}")))?;
        self.stage_secret.destroy();
        self.stage_secret = Secret::new(next);
        self.derived.destroy();
        self.derived = Self::derive_for_next(provider, self.hash, &self.stage_secret)?;
        Ok(())
    }

    /// Derive-Secret(Secret, Label, Messages) with a precomputed transcript hash.
    pub fn derive_secret(
        &self,
        provider: &CryptoProvider,
        label: &[u8],
        transcript_hash: &[u8],
    ) -> Result<Secret, Error> {
        let s = hkdf_expand_label(
            provider,
            self.hash,
            self.stage_secret.expose()?,
            label,
            transcript_hash,
            self.hash.output_len(),
        )?;
        Ok(Secret::new(s))
    }

    /// Mix in the (EC)DHE shared secret. Returns (client, server) handshake traffic secrets.
    pub fn handshake_secrets(
        &mut self,
        provider: &CryptoProvider,
        shared_secret: &[u8],
        transcript_hash: &[u8],
    ) -> Result<(Secret, Secret), Error> {
        self.extract(provider, shared_secret)?;
        let c = self.derive_secret(provider, b"c hs traffic", transcript_hash)?;
        let s = self.derive_secret(provider, b"s hs traffic", transcript_hash)?;
        Ok((c, s))
    }

    /// Advance to the master secret. Returns (client, server) application traffic secrets.
    pub fn application_secrets(
        &mut self,
        provider: &CryptoProvider,
        transcript_hash: &[u8],
    ) -> Result<(Secret, Secret), Error> {
        let zeros = vec![0u8; self.hash.output_len()];
        self.extract(provider, &zeros)?;
        let c = self.derive_secret(provider, b"c ap traffic", transcript_hash)?;
        let s = self.derive_secret(provider, b"s ap traffic", transcript_hash)?;
        Ok((c, s))
    }

    /// The current stage secret (master secret after `application_secrets`).
    pub fn stage_secret(&self) -> &Secret {
        &self.stage_secret
    }

    pub fn destroy(&mut self) {
        self.derived.destroy();
        self.stage_secret.destroy();
    }
}
