use crate::crypto::CryptoProvider;
use crate::types::{CipherSuite, HandshakeType, HashAlgorithm, ProtocolVersion};
use crate::Error;

/// Running record of the handshake messages that feed Finished, the
/// extended master secret, CertificateVerify and the TLS 1.3 key schedule.
///
/// Messages are kept whole and hashed on demand, since the hash is only
/// known once the suite is negotiated.
#[derive(Debug, Default)]
pub(crate) struct Transcript {
    buffer: Vec<u8>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message as it appeared on the wire (header and body).
    pub fn add(&mut self, message: &[u8]) {
        self.buffer.extend_from_slice(message);
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The raw transcript, for signing with schemes that hash themselves.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn hash(&self, provider: &CryptoProvider, alg: HashAlgorithm) -> Result<Vec<u8>, Error> {
        provider.hash(alg, &self.buffer)
    }

    /// Handshake hash for Finished and the session hash.
    ///
    /// Before TLS 1.2 this is MD5 concatenated with SHA-1. From TLS 1.2 the
    /// suite's hash is used.
    pub fn handshake_hash(
        &self,
        provider: &CryptoProvider,
        version: ProtocolVersion,
        suite: CipherSuite,
    ) -> Result<Vec<u8>, Error> {
        if version.is_tls12_or_later() {
            return self.hash(provider, suite.hash());
        }
        let mut out = self.hash(provider, HashAlgorithm::Md5)?;
        out.extend(self.hash(provider, HashAlgorithm::Sha1)?);
        Ok(out)
    }

    /// Replace ClientHello1 by a synthetic message_hash message after a
    /// HelloRetryRequest (RFC 8446 4.4.1).
    pub fn replace_with_message_hash(
        &mut self,
        provider: &CryptoProvider,
        alg: HashAlgorithm,
    ) -> Result<(), Error> {
        let digest = self.hash(provider, alg)?;
        self.buffer.clear();
        self.buffer.push(HandshakeType::MessageHash.value());
        self.buffer.extend_from_slice(&[0, 0, digest.len() as u8]);
        self.buffer.extend_from_slice(&digest);
        Ok(())
    }
}
