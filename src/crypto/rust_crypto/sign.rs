//! Signing and key loading implementations using RustCrypto.

use std::str;

use der::{Decode, Encode};
use p256::ecdsa::{Signature as P256Signature, SigningKey as P256SigningKey};
use p256::ecdsa::VerifyingKey as P256VerifyingKey;
use p384::ecdsa::{Signature as P384Signature, SigningKey as P384SigningKey};
use p384::ecdsa::VerifyingKey as P384VerifyingKey;
use pkcs8::DecodePrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15;
use rsa::pkcs8::DecodePublicKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha256, Sha384};
use signature::hazmat::{PrehashSigner, PrehashVerifier};
use signature::{SignatureEncoding, Signer, Verifier};
use spki::ObjectIdentifier;
use x509_cert::Certificate as X509Certificate;

use super::hash::digest;
use crate::crypto::provider::{KeyProvider, SignatureVerifier, SigningKey};
use crate::types::SignatureScheme;

const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const OID_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const OID_P256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const OID_P384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

/// Private key implementation.
enum RustCryptoSigningKey {
    P256(P256SigningKey),
    P384(P384SigningKey),
    Rsa(Box<RsaPrivateKey>),
}

impl std::fmt::Debug for RustCryptoSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RustCryptoSigningKey::P256(_) => "P256",
            RustCryptoSigningKey::P384(_) => "P384",
            RustCryptoSigningKey::Rsa(_) => "Rsa",
        };
        f.debug_tuple("RustCryptoSigningKey").field(&name).finish()
    }
}

fn rsa_sign(key: &RsaPrivateKey, scheme: SignatureScheme, data: &[u8]) -> Result<Vec<u8>, String> {
    let key = key.clone();
    let sig = match scheme {
        SignatureScheme::RsaPkcs1Sha1 => pkcs1v15::SigningKey::<Sha1>::new(key).try_sign(data),
        SignatureScheme::RsaPkcs1Sha256 => pkcs1v15::SigningKey::<Sha256>::new(key).try_sign(data),
        SignatureScheme::RsaPkcs1Sha384 => pkcs1v15::SigningKey::<Sha384>::new(key).try_sign(data),
        _ => return Err(format!("RSA key cannot sign {:?}", scheme)),
    };
    sig.map(|s| s.to_bytes().to_vec())
        .map_err(|_| "RSA signing failed".to_string())
}

impl SigningKey for RustCryptoSigningKey {
    fn sign(&mut self, scheme: SignatureScheme, data: &[u8]) -> Result<Vec<u8>, String> {
        if !self.schemes().contains(&scheme) {
            return Err(format!("Key cannot sign with {:?}", scheme));
        }
        let hash = scheme
            .hash()
            .ok_or_else(|| format!("No hash for {:?}", scheme))?;

        match self {
            RustCryptoSigningKey::P256(key) => {
                // PrehashSigner takes the digest, not the message.
                let prehash = digest(hash, data);
                let signature: P256Signature = key
                    .sign_prehash(&prehash)
                    .map_err(|_| "Signing failed".to_string())?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            RustCryptoSigningKey::P384(key) => {
                let prehash = digest(hash, data);
                let signature: P384Signature = key
                    .sign_prehash(&prehash)
                    .map_err(|_| "Signing failed".to_string())?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            RustCryptoSigningKey::Rsa(key) => rsa_sign(key, scheme, data),
        }
    }

    fn schemes(&self) -> &'static [SignatureScheme] {
        match self {
            RustCryptoSigningKey::P256(_) => &[
                SignatureScheme::EcdsaSecp256r1Sha256,
                SignatureScheme::EcdsaSha1,
            ],
            // SHA-1 digests are shorter than the P-384 field allows for prehash signing.
            RustCryptoSigningKey::P384(_) => &[SignatureScheme::EcdsaSecp384r1Sha384],
            RustCryptoSigningKey::Rsa(_) => &[
                SignatureScheme::RsaPkcs1Sha256,
                SignatureScheme::RsaPkcs1Sha384,
                SignatureScheme::RsaPkcs1Sha1,
            ],
        }
    }
}

/// Key provider implementation.
#[derive(Debug)]
pub(super) struct RustCryptoKeyProvider;

impl KeyProvider for RustCryptoKeyProvider {
    fn load_private_key(&self, key_der: &[u8]) -> Result<Box<dyn SigningKey>, String> {
        // PKCS#8 DER first (most common)
        if let Ok(key) = P256SigningKey::from_pkcs8_der(key_der) {
            return Ok(Box::new(RustCryptoSigningKey::P256(key)));
        }
        if let Ok(key) = P384SigningKey::from_pkcs8_der(key_der) {
            return Ok(Box::new(RustCryptoSigningKey::P384(key)));
        }
        if let Ok(key) = RsaPrivateKey::from_pkcs8_der(key_der) {
            return Ok(Box::new(RustCryptoSigningKey::Rsa(Box::new(key))));
        }

        // SEC1 DER (OpenSSL EC private key format). The curve parameter, when
        // present, makes the wrong curve fail to load.
        if let Ok(secret) = p256::SecretKey::from_sec1_der(key_der) {
            return Ok(Box::new(RustCryptoSigningKey::P256(secret.into())));
        }
        if let Ok(secret) = p384::SecretKey::from_sec1_der(key_der) {
            return Ok(Box::new(RustCryptoSigningKey::P384(secret.into())));
        }

        // PKCS#1 RSA
        if let Ok(key) = RsaPrivateKey::from_pkcs1_der(key_der) {
            return Ok(Box::new(RustCryptoSigningKey::Rsa(Box::new(key))));
        }

        // PEM encoded versions of the above
        if let Ok(pem_str) = str::from_utf8(key_der) {
            if pem_str.contains("-----BEGIN") {
                if let Ok((_label, doc)) = pkcs8::Document::from_pem(pem_str) {
                    return self.load_private_key(doc.as_bytes());
                }
            }
        }

        Err("Failed to parse private key in any supported format".to_string())
    }
}

/// Signature verifier implementation.
#[derive(Debug)]
pub(super) struct RustCryptoSignatureVerifier;

fn verify_ecdsa(
    curve: ObjectIdentifier,
    pubkey: &[u8],
    scheme: SignatureScheme,
    data: &[u8],
    signature: &[u8],
) -> Result<(), String> {
    if !scheme.is_ecdsa() {
        return Err(format!("{:?} does not match an EC key", scheme));
    }
    let hash = scheme
        .hash()
        .ok_or_else(|| format!("No hash for {:?}", scheme))?;
    let prehash = digest(hash, data);

    match curve {
        OID_P256 => {
            let key = P256VerifyingKey::from_sec1_bytes(pubkey)
                .map_err(|_| "Invalid P-256 public key".to_string())?;
            let sig = P256Signature::from_der(signature)
                .map_err(|_| "Invalid signature format".to_string())?;
            key.verify_prehash(&prehash, &sig)
                .map_err(|_| format!("ECDSA signature verification failed for {:?}", scheme))
        }
        OID_P384 => {
            let key = P384VerifyingKey::from_sec1_bytes(pubkey)
                .map_err(|_| "Invalid P-384 public key".to_string())?;
            let sig = P384Signature::from_der(signature)
                .map_err(|_| "Invalid signature format".to_string())?;
            key.verify_prehash(&prehash, &sig)
                .map_err(|_| format!("ECDSA signature verification failed for {:?}", scheme))
        }
        _ => Err(format!("Unsupported EC curve: {}", curve)),
    }
}

fn verify_rsa(
    spki_der: &[u8],
    scheme: SignatureScheme,
    data: &[u8],
    signature: &[u8],
) -> Result<(), String> {
    let key = RsaPublicKey::from_public_key_der(spki_der)
        .map_err(|_| "Invalid RSA public key".to_string())?;
    let sig = pkcs1v15::Signature::try_from(signature)
        .map_err(|_| "Invalid RSA signature".to_string())?;
    let res = match scheme {
        SignatureScheme::RsaPkcs1Sha1 => pkcs1v15::VerifyingKey::<Sha1>::new(key).verify(data, &sig),
        SignatureScheme::RsaPkcs1Sha256 => {
            pkcs1v15::VerifyingKey::<Sha256>::new(key).verify(data, &sig)
        }
        SignatureScheme::RsaPkcs1Sha384 => {
            pkcs1v15::VerifyingKey::<Sha384>::new(key).verify(data, &sig)
        }
        _ => return Err(format!("{:?} does not match an RSA key", scheme)),
    };
    res.map_err(|_| format!("RSA signature verification failed for {:?}", scheme))
}

impl SignatureVerifier for RustCryptoSignatureVerifier {
    fn verify_signature(
        &self,
        cert_der: &[u8],
        data: &[u8],
        signature: &[u8],
        scheme: SignatureScheme,
    ) -> Result<(), String> {
        let cert = X509Certificate::from_der(cert_der)
            .map_err(|e| format!("Failed to parse certificate: {e}"))?;
        let spki = &cert.tbs_certificate.subject_public_key_info;

        match spki.algorithm.oid {
            OID_EC_PUBLIC_KEY => {
                let pubkey = spki
                    .subject_public_key
                    .as_bytes()
                    .ok_or_else(|| "Invalid EC subject_public_key bitstring".to_string())?;
                let curve: ObjectIdentifier = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .ok_or("Missing EC curve parameter in certificate")?
                    .decode_as()
                    .map_err(|_| "Invalid EC curve parameter in certificate".to_string())?;
                verify_ecdsa(curve, pubkey, scheme, data, signature)
            }
            OID_RSA_ENCRYPTION => {
                let spki_der = spki
                    .to_der()
                    .map_err(|_| "Failed to encode RSA public key".to_string())?;
                verify_rsa(&spki_der, scheme, data, signature)
            }
            other => Err(format!("Unsupported public key algorithm: {}", other)),
        }
    }
}

/// Static instance of the key provider.
pub(super) static KEY_PROVIDER: RustCryptoKeyProvider = RustCryptoKeyProvider;

/// Static instance of the signature verifier.
pub(super) static SIGNATURE_VERIFIER: RustCryptoSignatureVerifier = RustCryptoSignatureVerifier;
