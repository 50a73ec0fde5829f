use std::fmt;

use crate::crypto::prf::prf_algorithm;
use crate::crypto::{PrfAlgorithm, Secret};
use crate::message::Random;
use crate::session::SessionParameters;
use crate::types::{CipherSuite, HeartbeatMode, MaxFragmentLength, ProtocolVersion};
use crate::Error;

/// Negotiated state of a completed handshake.
///
/// Only created by [`HandshakeParams::commit`], so every field is set.
#[derive(Clone)]
pub struct SecurityParameters {
    version: ProtocolVersion,
    cipher_suite: CipherSuite,
    prf_algorithm: Option<PrfAlgorithm>,
    client_random: [u8; 32],
    server_random: [u8; 32],
    session_id: Vec<u8>,
    master_secret: Secret,
    local_verify_data: Vec<u8>,
    peer_verify_data: Vec<u8>,
    peer_certificates: Vec<Vec<u8>>,
    local_certificates: Vec<Vec<u8>>,
    extended_master_secret: bool,
    max_fragment_length: Option<MaxFragmentLength>,
    heartbeat: Option<HeartbeatMode>,
    alpn_protocol: Option<Vec<u8>>,
    resumed: bool,
}

impl SecurityParameters {
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.cipher_suite
    }

    /// The legacy PRF. `None` for TLS 1.3, which derives keys with HKDF.
    pub fn prf_algorithm(&self) -> Option<PrfAlgorithm> {
        self.prf_algorithm
    }

    pub fn client_random(&self) -> &[u8; 32] {
        &self.client_random
    }

    pub fn server_random(&self) -> &[u8; 32] {
        &self.server_random
    }

    pub fn session_id(&self) -> &[u8] {
        &self.session_id
    }

    /// The master secret. For TLS 1.3 this is the key schedule's master secret.
    pub fn master_secret(&self) -> &Secret {
        &self.master_secret
    }

    pub fn local_verify_data(&self) -> &[u8] {
        &self.local_verify_data
    }

    pub fn peer_verify_data(&self) -> &[u8] {
        &self.peer_verify_data
    }

    /// Leaf first. Empty when the peer did not authenticate.
    pub fn peer_certificates(&self) -> &[Vec<u8>] {
        &self.peer_certificates
    }

    pub fn local_certificates(&self) -> &[Vec<u8>] {
        &self.local_certificates
    }

    pub fn extended_master_secret(&self) -> bool {
        self.extended_master_secret
    }

    pub fn max_fragment_length(&self) -> Option<MaxFragmentLength> {
        self.max_fragment_length
    }

    /// The heartbeat mode the peer advertised, if heartbeats were negotiated.
    pub fn heartbeat(&self) -> Option<HeartbeatMode> {
        self.heartbeat
    }

    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.alpn_protocol.as_deref()
    }

    /// Whether the handshake was abbreviated from a cached session.
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub(crate) fn session_parameters(&self) -> SessionParameters {
        SessionParameters {
            version: self.version,
            cipher_suite: self.cipher_suite,
            master_secret: self.master_secret.clone(),
            peer_certificates: self.peer_certificates.clone(),
            extended_master_secret: self.extended_master_secret,
            max_fragment_length: self.max_fragment_length,
        }
    }

    pub(crate) fn destroy(&mut self) {
        self.master_secret.destroy();
    }
}

impl fmt::Debug for SecurityParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityParameters")
            .field("version", &self.version)
            .field("cipher_suite", &self.cipher_suite)
            .field("extended_master_secret", &self.extended_master_secret)
            .field("max_fragment_length", &self.max_fragment_length)
            .field("resumed", &self.resumed)
            .finish_non_exhaustive()
    }
}

/// Staging area for [`SecurityParameters`], filled in as the handshake
/// negotiates each piece.
#[derive(Debug, Default)]
pub(crate) struct HandshakeParams {
    pub version: Option<ProtocolVersion>,
    pub cipher_suite: Option<CipherSuite>,
    pub client_random: Option<Random>,
    pub server_random: Option<Random>,
    pub session_id: Vec<u8>,
    pub master_secret: Option<Secret>,
    pub local_verify_data: Option<Vec<u8>>,
    pub peer_verify_data: Option<Vec<u8>>,
    pub peer_certificates: Vec<Vec<u8>>,
    pub local_certificates: Vec<Vec<u8>>,
    pub extended_master_secret: bool,
    pub max_fragment_length: Option<MaxFragmentLength>,
    pub heartbeat: Option<HeartbeatMode>,
    pub alpn_protocol: Option<Vec<u8>>,
    pub resumed: bool,
}

impl HandshakeParams {
    pub fn version(&self) -> Result<ProtocolVersion, Error> {
        self.version
            .ok_or_else(|| Error::internal("version not negotiated"))
    }

    pub fn cipher_suite(&self) -> Result<CipherSuite, Error> {
        self.cipher_suite
            .ok_or_else(|| Error::internal("cipher suite not negotiated"))
    }

    pub fn client_random(&self) -> Result<&Random, Error> {
        self.client_random
            .as_ref()
            .ok_or_else(|| Error::internal("no client random"))
    }

    pub fn server_random(&self) -> Result<&Random, Error> {
        self.server_random
            .as_ref()
            .ok_or_else(|| Error::internal("no server random"))
    }

    pub fn master_secret(&self) -> Result<&Secret, Error> {
        self.master_secret
            .as_ref()
            .ok_or_else(|| Error::internal("no master secret"))
    }

    pub fn prf_algorithm(&self) -> Result<PrfAlgorithm, Error> {
        Ok(prf_algorithm(self.version()?, self.cipher_suite()?))
    }

    /// Freeze the negotiated state. Both verify data values must be present.
    pub fn commit(&mut self) -> Result<SecurityParameters, Error> {
        let version = self.version()?;
        let cipher_suite = self.cipher_suite()?;
        let (Some(local), Some(peer)) = (&self.local_verify_data, &self.peer_verify_data) else {
            return Err(Error::internal("handshake incomplete: verify data missing"));
        };
        let prf_algorithm = (!version.is_tls13()).then(|| prf_algorithm(version, cipher_suite));

        Ok(SecurityParameters {
            version,
            cipher_suite,
            prf_algorithm,
            client_random: self.client_random()?.0,
            server_random: self.server_random()?.0,
            session_id: self.session_id.clone(),
            master_secret: self.master_secret()?.clone(),
            local_verify_data: local.clone(),
            peer_verify_data: peer.clone(),
            peer_certificates: self.peer_certificates.clone(),
            local_certificates: self.local_certificates.clone(),
            extended_master_secret: self.extended_master_secret,
            max_fragment_length: self.max_fragment_length,
            heartbeat: self.heartbeat,
            alpn_protocol: self.alpn_protocol.clone(),
            resumed: self.resumed,
        })
    }

    /// Zero everything secret. Used on failure.
    pub fn clear(&mut self) {
        if let Some(ms) = &mut self.master_secret {
            ms.destroy();
        }
        self.master_secret = None;
        self.local_verify_data = None;
        self.peer_verify_data = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged() -> HandshakeParams {
        HandshakeParams {
            version: Some(ProtocolVersion::Tls1_2),
            cipher_suite: Some(CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256),
            client_random: Some(Random([1; 32])),
            server_random: Some(Random([2; 32])),
            master_secret: Some(Secret::new(vec![7; 48])),
            ..Default::default()
        }
    }

    #[test]
    fn commit_requires_both_verify_data() {
        let mut p = staged();
        p.local_verify_data = Some(vec![1; 12]);
        let err = p.commit().unwrap_err();
        assert_eq!(err.alert(), Some(crate::types::AlertDescription::InternalError));

        p.peer_verify_data = Some(vec![2; 12]);
        let sp = p.commit().unwrap();
        assert_eq!(sp.version(), ProtocolVersion::Tls1_2);
        assert_eq!(sp.master_secret().expose().unwrap(), &[7; 48][..]);
        assert!(sp.prf_algorithm().is_some());
    }

    #[test]
    fn clear_destroys_master_secret() {
        let mut p = staged();
        p.clear();
        assert!(p.master_secret().is_err());
    }
}
