//! Record protection.
//!
//! A [`TlsCipher`] turns one record's plaintext into its protected fragment
//! and back. The record layers own the sequence numbers and pass them in. For
//! DTLS the number is `(epoch << 48) | sequence`.
//!
//! Every failure to remove protection is reported as `bad_record_mac`,
//! whatever the cause, so the peer cannot tell padding from MAC errors.

use std::fmt;

use super::prf::ct_eq;
use super::provider::{Aead, BlockCipher, CryptoProvider, Hmac, SecureRandom};
use super::Secret;
use crate::buffer::Buf;
use crate::types::{BulkCipher, CipherSuite, ContentType, MacAlgorithm, ProtocolVersion};
use crate::Error;

const GCM_TAG_LEN: usize = 16;
const EXPLICIT_NONCE_LEN: usize = 8;
const AES_BLOCK: usize = 16;

/// Protects and unprotects record fragments.
pub(crate) trait TlsCipher: Send + fmt::Debug {
    /// Largest number of bytes protection may add to a fragment.
    fn max_expansion(&self) -> usize;

    /// Bytes protection adds to a fragment of `len` plaintext bytes.
    fn expansion(&self, len: usize) -> usize;

    /// Protect `plaintext`. Returns the content type to put in the header.
    fn encode_plaintext(
        &mut self,
        seq: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        plaintext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error>;

    /// Unprotect a fragment. Returns the real content type and plaintext.
    fn decode_ciphertext(
        &mut self,
        seq: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        ciphertext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error>;

    /// Whether writes must be split against chosen-plaintext IV attacks.
    fn needs_record_splitting(&self) -> bool {
        false
    }

    fn is_null(&self) -> bool {
        false
    }
}

/// Pseudo header bound into MACs and TLS 1.2 AEAD tags.
fn additional_data(seq: u64, ct: ContentType, version: ProtocolVersion, len: usize) -> [u8; 13] {
    let mut ad = [0u8; 13];
    ad[..8].copy_from_slice(&seq.to_be_bytes());
    ad[8] = ct.value();
    ad[9..11].copy_from_slice(&version.as_u16().to_be_bytes());
    ad[11..13].copy_from_slice(&(len as u16).to_be_bytes());
    ad
}

/// No protection, used before the first ChangeCipherSpec.
#[derive(Debug, Default)]
pub(crate) struct NullCipher;

impl TlsCipher for NullCipher {
    fn max_expansion(&self) -> usize {
        0
    }

    fn expansion(&self, _len: usize) -> usize {
        0
    }

    fn encode_plaintext(
        &mut self,
        _seq: u64,
        content_type: ContentType,
        _version: ProtocolVersion,
        plaintext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        Ok((content_type, plaintext.to_vec()))
    }

    fn decode_ciphertext(
        &mut self,
        _seq: u64,
        content_type: ContentType,
        _version: ProtocolVersion,
        ciphertext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        Ok((content_type, ciphertext.to_vec()))
    }

    fn is_null(&self) -> bool {
        true
    }
}

/// TLS 1.2 AES-GCM (RFC 5288): 4 byte implicit salt, 8 byte explicit nonce.
pub(crate) struct Aead12Cipher {
    aead: Box<dyn Aead>,
    salt: [u8; 4],
}

impl fmt::Debug for Aead12Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aead12Cipher").finish_non_exhaustive()
    }
}

impl Aead12Cipher {
    fn nonce(&self, explicit: &[u8]) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[..4].copy_from_slice(&self.salt);
        nonce[4..].copy_from_slice(explicit);
        nonce
    }
}

impl TlsCipher for Aead12Cipher {
    fn max_expansion(&self) -> usize {
        EXPLICIT_NONCE_LEN + GCM_TAG_LEN
    }

    fn expansion(&self, _len: usize) -> usize {
        EXPLICIT_NONCE_LEN + GCM_TAG_LEN
    }

    fn encode_plaintext(
        &mut self,
        seq: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        plaintext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        // The sequence number is a unique nonce per key, so it doubles as the explicit part.
        let explicit = seq.to_be_bytes();
        let nonce = self.nonce(&explicit);
        let aad = additional_data(seq, content_type, version, plaintext.len());

        let mut data = Buf::from_slice(plaintext);
        self.aead
            .seal(&nonce, &aad, &mut data)
            .map_err(|e| Error::internal(format!("seal: {e}")))?;

        let mut out = Vec::with_capacity(EXPLICIT_NONCE_LEN + data.len());
        out.extend_from_slice(&explicit);
        out.extend_from_slice(&data);
        Ok((content_type, out))
    }

    fn decode_ciphertext(
        &mut self,
        seq: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        ciphertext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        if ciphertext.len() < EXPLICIT_NONCE_LEN + GCM_TAG_LEN {
            return Err(Error::bad_record_mac("AEAD record too short"));
        }
        let (explicit, body) = ciphertext.split_at(EXPLICIT_NONCE_LEN);
        let nonce = self.nonce(explicit);
        let aad = additional_data(seq, content_type, version, body.len() - GCM_TAG_LEN);

        let mut data = Buf::from_slice(body);
        self.aead
            .open(&nonce, &aad, &mut data)
            .map_err(|_| Error::bad_record_mac("AEAD open failed"))?;
        Ok((content_type, data.into_vec()))
    }
}

/// TLS 1.3 AEAD (RFC 8446 section 5.2): per-record nonce is iv XOR seq,
/// the real content type travels inside the encrypted fragment.
pub(crate) struct Aead13Cipher {
    aead: Box<dyn Aead>,
    iv: [u8; 12],
}

impl fmt::Debug for Aead13Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aead13Cipher").finish_non_exhaustive()
    }
}

impl Aead13Cipher {
    pub fn new(
        provider: &CryptoProvider,
        bulk: BulkCipher,
        key: &Secret,
        iv: [u8; 12],
    ) -> Result<Self, Error> {
        let aead = provider
            .ciphers
            .create_aead(bulk, key.expose()?)
            .map_err(Error::internal)?;
        Ok(Aead13Cipher { aead, iv })
    }

    fn nonce(&self, seq: u64) -> [u8; 12] {
        let mut nonce = self.iv;
        for (n, s) in nonce[4..].iter_mut().zip(seq.to_be_bytes()) {
            *n ^= s;
        }
        nonce
    }

    fn header(len: usize) -> [u8; 5] {
        let mut h = [0u8; 5];
        h[0] = ContentType::ApplicationData.value();
        h[1..3].copy_from_slice(&ProtocolVersion::Tls1_2.as_u16().to_be_bytes());
        h[3..5].copy_from_slice(&(len as u16).to_be_bytes());
        h
    }
}

impl TlsCipher for Aead13Cipher {
    fn max_expansion(&self) -> usize {
        // RFC 8446 allows up to 255 padding bytes plus the type byte.
        256
    }

    fn expansion(&self, _len: usize) -> usize {
        1 + GCM_TAG_LEN
    }

    fn encode_plaintext(
        &mut self,
        seq: u64,
        content_type: ContentType,
        _version: ProtocolVersion,
        plaintext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        let mut data = Buf::from_slice(plaintext);
        data.push(content_type.value());
        let aad = Self::header(data.len() + GCM_TAG_LEN);
        let nonce = self.nonce(seq);
        self.aead
            .seal(&nonce, &aad, &mut data)
            .map_err(|e| Error::internal(format!("seal: {e}")))?;
        Ok((ContentType::ApplicationData, data.into_vec()))
    }

    fn decode_ciphertext(
        &mut self,
        seq: u64,
        content_type: ContentType,
        _version: ProtocolVersion,
        ciphertext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        if content_type != ContentType::ApplicationData {
            return Err(Error::unexpected(format!(
                "protected record with outer type {}",
                content_type
            )));
        }
        if ciphertext.len() < GCM_TAG_LEN + 1 {
            return Err(Error::bad_record_mac("AEAD record too short"));
        }

        let aad = Self::header(ciphertext.len());
        let nonce = self.nonce(seq);
        let mut data = Buf::from_slice(ciphertext);
        self.aead
            .open(&nonce, &aad, &mut data)
            .map_err(|_| Error::bad_record_mac("AEAD open failed"))?;

        let mut inner = data.into_vec();
        let Some(type_pos) = inner.iter().rposition(|b| *b != 0) else {
            return Err(Error::unexpected("protected record without content type"));
        };
        let ct = ContentType::from_value(inner[type_pos]);
        inner.truncate(type_pos);
        Ok((ct, inner))
    }
}

/// AES-CBC with HMAC, MAC-then-encrypt (RFC 5246 section 6.2.3.2).
///
/// TLS 1.0 chains the IV across records. Later versions send a fresh
/// random IV in front of every record.
pub(crate) struct CbcCipher {
    cipher: Box<dyn BlockCipher>,
    mac: Box<dyn Hmac>,
    mac_len: usize,
    /// Chained IV for TLS 1.0, `None` when IVs are explicit.
    chained_iv: Option<[u8; AES_BLOCK]>,
    random: &'static dyn SecureRandom,
}

impl fmt::Debug for CbcCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CbcCipher")
            .field("mac_len", &self.mac_len)
            .field("explicit_iv", &self.chained_iv.is_none())
            .finish_non_exhaustive()
    }
}

impl CbcCipher {
    fn compute_mac(
        &mut self,
        seq: u64,
        ct: ContentType,
        version: ProtocolVersion,
        data: &[u8],
    ) -> Vec<u8> {
        self.mac
            .update(&additional_data(seq, ct, version, data.len()));
        self.mac.update(data);
        self.mac.finalize_reset()
    }
}

impl TlsCipher for CbcCipher {
    fn max_expansion(&self) -> usize {
        let iv = if self.chained_iv.is_some() { 0 } else { AES_BLOCK };
        iv + self.mac_len + 256
    }

    fn expansion(&self, len: usize) -> usize {
        let iv = if self.chained_iv.is_some() { 0 } else { AES_BLOCK };
        let unpadded = len + self.mac_len + 1;
        let padded = unpadded.div_ceil(AES_BLOCK) * AES_BLOCK;
        iv + padded - len
    }

    fn encode_plaintext(
        &mut self,
        seq: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        plaintext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        let mac = self.compute_mac(seq, content_type, version, plaintext);

        let mut data = Vec::with_capacity(plaintext.len() + self.max_expansion());
        data.extend_from_slice(plaintext);
        data.extend_from_slice(&mac);
        let pad = AES_BLOCK - 1 - (data.len() % AES_BLOCK);
        data.resize(data.len() + pad + 1, pad as u8);

        let iv = match self.chained_iv {
            Some(iv) => iv,
            None => {
                let mut iv = [0u8; AES_BLOCK];
                self.random
                    .fill(&mut iv)
                    .map_err(|e| Error::internal(format!("random: {e}")))?;
                iv
            }
        };

        self.cipher
            .encrypt_cbc(&iv, &mut data)
            .map_err(|e| Error::internal(format!("encrypt: {e}")))?;

        if let Some(chained) = &mut self.chained_iv {
            chained.copy_from_slice(&data[data.len() - AES_BLOCK..]);
            return Ok((content_type, data));
        }

        let mut out = Vec::with_capacity(AES_BLOCK + data.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&data);
        Ok((content_type, out))
    }

    fn decode_ciphertext(
        &mut self,
        seq: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        ciphertext: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        let (iv, body) = match self.chained_iv {
            Some(iv) => (iv, ciphertext),
            None => {
                if ciphertext.len() < AES_BLOCK {
                    return Err(Error::bad_record_mac("CBC record too short"));
                }
                let (iv, body) = ciphertext.split_at(AES_BLOCK);
                let mut fixed = [0u8; AES_BLOCK];
                fixed.copy_from_slice(iv);
                (fixed, body)
            }
        };

        let min = (self.mac_len + 1).div_ceil(AES_BLOCK) * AES_BLOCK;
        if body.len() < min || body.len() % AES_BLOCK != 0 {
            return Err(Error::bad_record_mac("CBC record length invalid"));
        }

        let mut data = body.to_vec();
        if let Some(chained) = &mut self.chained_iv {
            chained.copy_from_slice(&body[body.len() - AES_BLOCK..]);
        }
        self.cipher
            .decrypt_cbc(&iv, &mut data)
            .map_err(|_| Error::bad_record_mac("CBC decrypt failed"))?;

        // Check padding without branching on its content before the MAC
        // is computed, and compute the MAC either way.
        let pad = data[data.len() - 1] as usize;
        let mut good = pad + 1 + self.mac_len <= data.len();
        let pad_checked = if good { pad } else { 0 };
        let mut diff = 0u8;
        for b in &data[data.len() - 1 - pad_checked..] {
            diff |= b ^ (pad_checked as u8);
        }
        good &= diff == 0;

        let strip = if good { pad + 1 } else { 0 };
        let content_len = data.len() - strip - self.mac_len;
        let (content, rest) = data.split_at(content_len);
        let received_mac = rest[..self.mac_len].to_vec();
        let expected = self.compute_mac(seq, content_type, version, content);

        if !(ct_eq(&expected, &received_mac) & good) {
            return Err(Error::bad_record_mac("CBC record authentication failed"));
        }

        data.truncate(content_len);
        Ok((content_type, data))
    }

    fn needs_record_splitting(&self) -> bool {
        self.chained_iv.is_some()
    }
}

/// Key block lengths for a legacy suite: (mac key, enc key, fixed iv).
pub(crate) fn key_block_layout(
    suite: CipherSuite,
    version: ProtocolVersion,
) -> Result<(usize, usize, usize), Error> {
    let (Some(bulk), Some(mac)) = (suite.bulk_cipher(), suite.mac()) else {
        return Err(Error::internal(format!("no key layout for {}", suite)));
    };
    let iv_len = if bulk.is_aead() {
        bulk.fixed_iv_len()
    } else if version.has_explicit_iv() {
        0
    } else {
        AES_BLOCK
    };
    Ok((mac.mac_len(), bulk.key_len(), iv_len))
}

/// Split a legacy key block into (client write, server write) ciphers.
pub(crate) fn legacy_ciphers(
    provider: &CryptoProvider,
    suite: CipherSuite,
    version: ProtocolVersion,
    key_block: &Secret,
) -> Result<(Box<dyn TlsCipher>, Box<dyn TlsCipher>), Error> {
    let (mac_len, key_len, iv_len) = key_block_layout(suite, version)?;
    let kb = key_block.expose()?;
    if kb.len() < 2 * (mac_len + key_len + iv_len) {
        return Err(Error::internal("key block too short"));
    }

    let (client_mac, rest) = kb.split_at(mac_len);
    let (server_mac, rest) = rest.split_at(mac_len);
    let (client_key, rest) = rest.split_at(key_len);
    let (server_key, rest) = rest.split_at(key_len);
    let (client_iv, rest) = rest.split_at(iv_len);
    let server_iv = &rest[..iv_len];

    let (Some(bulk), Some(mac)) = (suite.bulk_cipher(), suite.mac()) else {
        return Err(Error::internal(format!("no cipher for {}", suite)));
    };

    let build = |mac_key: &[u8], key: &[u8], iv: &[u8]| -> Result<Box<dyn TlsCipher>, Error> {
        if bulk.is_aead() {
            let aead = provider
                .ciphers
                .create_aead(bulk, key)
                .map_err(Error::internal)?;
            let mut salt = [0u8; 4];
            salt.copy_from_slice(iv);
            return Ok(Box::new(Aead12Cipher { aead, salt }));
        }

        let cipher = provider
            .ciphers
            .create_block_cipher(bulk, key)
            .map_err(Error::internal)?;
        let hash = match mac {
            MacAlgorithm::Aead => return Err(Error::internal("CBC suite without HMAC")),
            other => other.hash().ok_or_else(|| Error::internal("no MAC hash"))?,
        };
        let hmac = provider
            .hmac_provider
            .create_hmac(hash, mac_key)
            .map_err(Error::internal)?;
        let chained_iv = if iv.is_empty() {
            None
        } else {
            let mut v = [0u8; AES_BLOCK];
            v.copy_from_slice(iv);
            Some(v)
        };
        Ok(Box::new(CbcCipher {
            cipher,
            mac: hmac,
            mac_len: mac.mac_len(),
            chained_iv,
            random: provider.secure_random,
        }))
    };

    Ok((
        build(client_mac, client_key, client_iv)?,
        build(server_mac, server_key, server_iv)?,
    ))
}

/// Total key block length for a legacy suite.
pub(crate) fn key_block_len(suite: CipherSuite, version: ProtocolVersion) -> Result<usize, Error> {
    let (m, k, i) = key_block_layout(suite, version)?;
    Ok(2 * (m + k + i))
}

/// TLS 1.3 record protection keyed from a traffic secret.
pub(crate) fn tls13_cipher(
    provider: &CryptoProvider,
    suite: CipherSuite,
    traffic_secret: &Secret,
) -> Result<Box<dyn TlsCipher>, Error> {
    let bulk = suite
        .bulk_cipher()
        .ok_or_else(|| Error::internal(format!("no cipher for {}", suite)))?;
    let keys = super::key_schedule::traffic_keys(provider, suite.hash(), traffic_secret, bulk.key_len())?;
    Ok(Box::new(Aead13Cipher::new(provider, bulk, &keys.key, keys.iv)?))
}
