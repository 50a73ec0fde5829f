//! Cipher suite definitions.

use nom::number::complete::be_u16;

use super::{HashAlgorithm, ProtocolVersion};

wire_enum! {
    #[allow(non_camel_case_types)]
    pub enum CipherSuite(u16, be_u16) {
        TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256 = 0xc02b,
        TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384 = 0xc02c,
        TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA = 0xc009,
        TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA = 0xc00a,
        TLS_DHE_RSA_WITH_AES_128_GCM_SHA256 = 0x009e,
        TLS_DH_anon_WITH_AES_128_GCM_SHA256 = 0x00a6,
        TLS_DH_anon_WITH_AES_128_CBC_SHA = 0x0034,
        TLS_ECDH_anon_WITH_AES_128_CBC_SHA = 0xc018,
        TLS_ECDH_anon_WITH_AES_256_CBC_SHA = 0xc019,
        TLS_PSK_WITH_AES_128_GCM_SHA256 = 0x00a8,
        TLS_PSK_WITH_AES_128_CBC_SHA = 0x008c,
        TLS_DHE_PSK_WITH_AES_128_GCM_SHA256 = 0x00aa,
        TLS_ECDHE_PSK_WITH_AES_128_CBC_SHA = 0xc035,
        TLS_ECDHE_PSK_WITH_AES_128_GCM_SHA256 = 0xd001,
        TLS_AES_128_GCM_SHA256 = 0x1301,
        TLS_AES_256_GCM_SHA384 = 0x1302,
        TLS_EMPTY_RENEGOTIATION_INFO_SCSV = 0x00ff,
        TLS_FALLBACK_SCSV = 0x5600,
    }
}

/// How the premaster secret is agreed and the server authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeAlgorithm {
    EcdheEcdsa,
    DheRsa,
    DhAnon,
    EcdhAnon,
    Psk,
    DhePsk,
    EcdhePsk,
    /// Key exchange is negotiated separately through key_share.
    Tls13,
}

impl KeyExchangeAlgorithm {
    /// The server sends a Certificate message.
    pub fn requires_server_certificate(&self) -> bool {
        matches!(
            self,
            KeyExchangeAlgorithm::EcdheEcdsa | KeyExchangeAlgorithm::DheRsa
        )
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(
            self,
            KeyExchangeAlgorithm::DhAnon | KeyExchangeAlgorithm::EcdhAnon
        )
    }

    pub fn is_psk(&self) -> bool {
        matches!(
            self,
            KeyExchangeAlgorithm::Psk | KeyExchangeAlgorithm::DhePsk | KeyExchangeAlgorithm::EcdhePsk
        )
    }

    /// Uses elliptic curve groups, which makes the curve extensions relevant.
    pub fn is_ecc(&self) -> bool {
        matches!(
            self,
            KeyExchangeAlgorithm::EcdheEcdsa
                | KeyExchangeAlgorithm::EcdhAnon
                | KeyExchangeAlgorithm::EcdhePsk
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkCipher {
    Aes128Gcm,
    Aes256Gcm,
    Aes128Cbc,
    Aes256Cbc,
}

impl BulkCipher {
    pub fn key_len(&self) -> usize {
        match self {
            BulkCipher::Aes128Gcm | BulkCipher::Aes128Cbc => 16,
            BulkCipher::Aes256Gcm | BulkCipher::Aes256Cbc => 32,
        }
    }

    pub fn is_aead(&self) -> bool {
        matches!(self, BulkCipher::Aes128Gcm | BulkCipher::Aes256Gcm)
    }

    /// IV bytes taken from the key block (TLS 1.2 and earlier).
    pub fn fixed_iv_len(&self) -> usize {
        if self.is_aead() {
            4
        } else {
            16
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAlgorithm {
    /// Integrity comes from the AEAD tag.
    Aead,
    HmacSha1,
    HmacSha256,
    HmacSha384,
}

impl MacAlgorithm {
    pub fn mac_len(&self) -> usize {
        match self {
            MacAlgorithm::Aead => 0,
            MacAlgorithm::HmacSha1 => 20,
            MacAlgorithm::HmacSha256 => 32,
            MacAlgorithm::HmacSha384 => 48,
        }
    }

    pub fn hash(&self) -> Option<HashAlgorithm> {
        match self {
            MacAlgorithm::Aead => None,
            MacAlgorithm::HmacSha1 => Some(HashAlgorithm::Sha1),
            MacAlgorithm::HmacSha256 => Some(HashAlgorithm::Sha256),
            MacAlgorithm::HmacSha384 => Some(HashAlgorithm::Sha384),
        }
    }
}

impl CipherSuite {
    /// Suites offered by default, in preference order.
    pub fn default_suites() -> &'static [CipherSuite] {
        use CipherSuite::*;
        &[
            TLS_AES_128_GCM_SHA256,
            TLS_AES_256_GCM_SHA384,
            TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
            TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA,
            TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA,
            TLS_DHE_RSA_WITH_AES_128_GCM_SHA256,
        ]
    }

    fn components(&self) -> Option<(KeyExchangeAlgorithm, BulkCipher, MacAlgorithm)> {
        use BulkCipher::*;
        use CipherSuite::*;
        use KeyExchangeAlgorithm as Kx;
        use MacAlgorithm::*;
        let c = match self {
            TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256 => (Kx::EcdheEcdsa, Aes128Gcm, Aead),
            TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384 => (Kx::EcdheEcdsa, Aes256Gcm, Aead),
            TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA => (Kx::EcdheEcdsa, Aes128Cbc, HmacSha1),
            TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA => (Kx::EcdheEcdsa, Aes256Cbc, HmacSha1),
            TLS_DHE_RSA_WITH_AES_128_GCM_SHA256 => (Kx::DheRsa, Aes128Gcm, Aead),
            TLS_DH_anon_WITH_AES_128_GCM_SHA256 => (Kx::DhAnon, Aes128Gcm, Aead),
            TLS_DH_anon_WITH_AES_128_CBC_SHA => (Kx::DhAnon, Aes128Cbc, HmacSha1),
            TLS_ECDH_anon_WITH_AES_128_CBC_SHA => (Kx::EcdhAnon, Aes128Cbc, HmacSha1),
            TLS_ECDH_anon_WITH_AES_256_CBC_SHA => (Kx::EcdhAnon, Aes256Cbc, HmacSha1),
            TLS_PSK_WITH_AES_128_GCM_SHA256 => (Kx::Psk, Aes128Gcm, Aead),
            TLS_PSK_WITH_AES_128_CBC_SHA => (Kx::Psk, Aes128Cbc, HmacSha1),
            TLS_DHE_PSK_WITH_AES_128_GCM_SHA256 => (Kx::DhePsk, Aes128Gcm, Aead),
            TLS_ECDHE_PSK_WITH_AES_128_CBC_SHA => (Kx::EcdhePsk, Aes128Cbc, HmacSha1),
            TLS_ECDHE_PSK_WITH_AES_128_GCM_SHA256 => (Kx::EcdhePsk, Aes128Gcm, Aead),
            TLS_AES_128_GCM_SHA256 => (Kx::Tls13, Aes128Gcm, Aead),
            TLS_AES_256_GCM_SHA384 => (Kx::Tls13, Aes256Gcm, Aead),
            _ => return None,
        };
        Some(c)
    }

    /// Key exchange of a real (non-signalling, known) suite.
    pub fn key_exchange(&self) -> Option<KeyExchangeAlgorithm> {
        self.components().map(|c| c.0)
    }

    pub fn bulk_cipher(&self) -> Option<BulkCipher> {
        self.components().map(|c| c.1)
    }

    pub fn mac(&self) -> Option<MacAlgorithm> {
        self.components().map(|c| c.2)
    }

    /// Hash for the PRF (TLS 1.2), the transcript and the TLS 1.3 key schedule.
    pub fn hash(&self) -> HashAlgorithm {
        match self {
            CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384
            | CipherSuite::TLS_AES_256_GCM_SHA384 => HashAlgorithm::Sha384,
            _ => HashAlgorithm::Sha256,
        }
    }

    pub fn is_tls13(&self) -> bool {
        self.key_exchange() == Some(KeyExchangeAlgorithm::Tls13)
    }

    pub fn is_signalling(&self) -> bool {
        matches!(
            self,
            CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV | CipherSuite::TLS_FALLBACK_SCSV
        )
    }

    /// Whether the suite may be negotiated at `version`.
    ///
    /// AEAD and SHA-256 suites need TLS 1.2, TLS 1.3 suites need TLS 1.3.
    pub fn is_usable_with(&self, version: ProtocolVersion) -> bool {
        let Some((kx, bulk, _)) = self.components() else {
            return false;
        };
        let v = version.tls_equivalent();
        if kx == KeyExchangeAlgorithm::Tls13 {
            return v == ProtocolVersion::Tls1_3;
        }
        if v == ProtocolVersion::Tls1_3 || !version.is_supported() {
            return false;
        }
        if bulk.is_aead() {
            v.is_tls12_or_later()
        } else {
            true
        }
    }
}
