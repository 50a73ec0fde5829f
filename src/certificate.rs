//! Self-signed certificate generation.
//!
//! The engine never validates certificate paths. These helpers produce an
//! end-entity certificate and its key in the DER forms [`Config`](crate::Config)
//! takes, which is all tests and simple deployments need.

use std::fmt;

use rcgen::{
    Certificate as RcgenCertificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    SignatureAlgorithm, PKCS_ECDSA_P256_SHA256, PKCS_RSA_SHA256,
};
use rsa::pkcs8::EncodePrivateKey;
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use thiserror::Error;

const RSA_BITS: usize = 2048;

/// Reasons certificate generation fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertificateError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
    #[error("certificate generation failed: {0}")]
    Generation(String),
}

/// A DER certificate and the DER private key it certifies.
#[derive(Clone)]
pub struct CertifiedKey {
    /// X.509 certificate, DER.
    pub certificate: Vec<u8>,
    /// Private key, PKCS#8 DER.
    pub private_key: Vec<u8>,
}

impl CertifiedKey {
    /// SHA-256 over the DER certificate.
    pub fn fingerprint(&self) -> [u8; 32] {
        Sha256::digest(&self.certificate).into()
    }
}

impl fmt::Debug for CertifiedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertifiedKey")
            .field("certificate", &self.certificate.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// ECDSA P-256 certificate for the ECDHE_ECDSA suites and TLS 1.3.
pub fn generate_self_signed_certificate() -> Result<CertifiedKey, CertificateError> {
    let key_pair = KeyPair::generate(&PKCS_ECDSA_P256_SHA256)
        .map_err(|e| CertificateError::KeyGeneration(e.to_string()))?;
    build("tlsproto peer", key_pair, &PKCS_ECDSA_P256_SHA256)
}

/// RSA 2048 certificate for the DHE_RSA suites.
///
/// RSA key generation is slow in unoptimized builds.
pub fn generate_self_signed_rsa_certificate() -> Result<CertifiedKey, CertificateError> {
    let key = RsaPrivateKey::new(&mut rand::rngs::OsRng, RSA_BITS)
        .map_err(|e| CertificateError::KeyGeneration(e.to_string()))?;
    let pkcs8 = key
        .to_pkcs8_der()
        .map_err(|e| CertificateError::KeyGeneration(e.to_string()))?;
    let key_pair = KeyPair::from_der(pkcs8.as_bytes())
        .map_err(|e| CertificateError::KeyGeneration(e.to_string()))?;
    build("tlsproto rsa peer", key_pair, &PKCS_RSA_SHA256)
}

fn build(
    name: &str,
    key_pair: KeyPair,
    alg: &'static SignatureAlgorithm,
) -> Result<CertifiedKey, CertificateError> {
    let mut params = CertificateParams::new(vec![name.to_string()]);

    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, "tlsproto".to_string());
    dn.push(DnType::CommonName, name.to_string());
    params.distinguished_name = dn;
    params.is_ca = IsCa::NoCa;
    params.alg = alg;
    params.key_pair = Some(key_pair);

    let not_before = time::OffsetDateTime::now_utc() - time::Duration::days(1);
    params.not_before = not_before;
    params.not_after = not_before + time::Duration::days(365);

    let cert = RcgenCertificate::from_params(params)
        .map_err(|e| CertificateError::Generation(e.to_string()))?;
    let certificate = cert
        .serialize_der()
        .map_err(|e| CertificateError::Generation(e.to_string()))?;

    Ok(CertifiedKey {
        certificate,
        private_key: cert.serialize_private_key_der(),
    })
}
