use nom::number::complete::be_u16;

wire_enum! {
    /// Named groups for (EC)DHE (RFC 8422, RFC 7919).
    pub enum NamedGroup(u16, be_u16) {
        Secp256r1 = 23,
        Secp384r1 = 24,
        Secp521r1 = 25,
        X25519 = 29,
        X448 = 30,
        Ffdhe2048 = 0x0100,
        Ffdhe3072 = 0x0101,
    }
}

impl NamedGroup {
    pub fn is_ecdhe(&self) -> bool {
        matches!(
            self,
            NamedGroup::Secp256r1
                | NamedGroup::Secp384r1
                | NamedGroup::Secp521r1
                | NamedGroup::X25519
                | NamedGroup::X448
        )
    }

    pub fn is_ffdhe(&self) -> bool {
        matches!(self, NamedGroup::Ffdhe2048 | NamedGroup::Ffdhe3072)
    }
}

wire_enum! {
    /// Signature schemes (RFC 8446). The TLS 1.2 SignatureAndHashAlgorithm
    /// pair encodes to the same two bytes.
    pub enum SignatureScheme(u16, be_u16) {
        RsaPkcs1Sha1 = 0x0201,
        EcdsaSha1 = 0x0203,
        RsaPkcs1Sha256 = 0x0401,
        EcdsaSecp256r1Sha256 = 0x0403,
        RsaPkcs1Sha384 = 0x0501,
        EcdsaSecp384r1Sha384 = 0x0503,
        RsaPssRsaeSha256 = 0x0804,
        Ed25519 = 0x0807,
    }
}

/// Hash functions the engine asks the provider for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha384,
}

impl HashAlgorithm {
    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
        }
    }
}

impl SignatureScheme {
    pub fn hash(&self) -> Option<HashAlgorithm> {
        use SignatureScheme::*;
        match self {
            RsaPkcs1Sha1 | EcdsaSha1 => Some(HashAlgorithm::Sha1),
            RsaPkcs1Sha256 | EcdsaSecp256r1Sha256 | RsaPssRsaeSha256 => {
                Some(HashAlgorithm::Sha256)
            }
            RsaPkcs1Sha384 | EcdsaSecp384r1Sha384 => Some(HashAlgorithm::Sha384),
            Ed25519 | Unknown(_) => None,
        }
    }

    pub fn is_ecdsa(&self) -> bool {
        use SignatureScheme::*;
        matches!(self, EcdsaSha1 | EcdsaSecp256r1Sha256 | EcdsaSecp384r1Sha384)
    }

    pub fn is_rsa_pkcs1(&self) -> bool {
        use SignatureScheme::*;
        matches!(self, RsaPkcs1Sha1 | RsaPkcs1Sha256 | RsaPkcs1Sha384)
    }

    /// TLS 1.3 forbids PKCS#1 v1.5 and SHA-1 in CertificateVerify.
    pub fn is_allowed_in_tls13(&self) -> bool {
        use SignatureScheme::*;
        matches!(
            self,
            EcdsaSecp256r1Sha256 | EcdsaSecp384r1Sha384 | RsaPssRsaeSha256 | Ed25519
        )
    }

    /// Schemes advertised in signature_algorithms by default.
    pub fn default_schemes() -> &'static [SignatureScheme] {
        use SignatureScheme::*;
        &[
            EcdsaSecp256r1Sha256,
            EcdsaSecp384r1Sha384,
            RsaPkcs1Sha256,
            RsaPkcs1Sha384,
            EcdsaSha1,
            RsaPkcs1Sha1,
        ]
    }
}
