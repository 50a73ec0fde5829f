//! Handshake state machines.
//!
//! [`Handshake`] wraps the client or server role. Each role pulls messages
//! out of the [`Engine`] and dispatches on the pair of current
//! [`ConnectionState`] and message type. A pair the role does not expect is
//! fatal `unexpected_message`. The legacy flows (TLS 1.0 to 1.2, DTLS) live
//! in `client` and `server`, the TLS 1.3 flows in `client13` and `server13`.

use std::fmt;

use crate::crypto::prf::{self, VERIFY_DATA_LEN};
use crate::crypto::record_cipher::{key_block_len, legacy_ciphers, TlsCipher};
use crate::crypto::{CryptoProvider, Secret, SigningKey};
use crate::engine::{Engine, Incoming};
use crate::event::LocalEvent;
use crate::message::{Alert, DigitallySigned, KeyUpdate, NewSessionTicket13};
use crate::session::TlsSession;
use crate::types::{AlertDescription, HandshakeType, ProtocolVersion, SignatureScheme};
use crate::{Config, Error};

mod client;
mod client13;
pub(crate) mod params;
mod server;
mod server13;
pub(crate) mod transcript;

pub(crate) use client::Client;
pub(crate) use params::HandshakeParams;
pub use params::SecurityParameters;
pub(crate) use server::Server;
pub(crate) use transcript::Transcript;

/// Where a handshake stands.
///
/// The legacy and TLS 1.3 flows only share `Start` and `End`. The client
/// states name the last message seen or sent.
///
/// The set covers the full RFC 5246 and RFC 8446 flows, including
/// [`ServerSessionTicket`](Self::ServerSessionTicket) for RFC 5077 tickets.
/// This crate resumes by session id only and never issues or accepts a
/// ticket, so no connection currently reports that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Start,
    ClientHello,
    ServerHelloRetryRequest,
    ClientHelloRetry,
    ServerHello,
    ServerEncryptedExtensions,
    ServerCertificate,
    ServerCertificateVerify,
    ServerKeyExchange,
    ServerCertificateRequest,
    ServerHelloDone,
    ClientCertificate,
    ClientKeyExchange,
    ClientCertificateVerify,
    ClientFinished,
    /// NewSessionTicket of an RFC 5077 flow. Not entered, see above.
    ServerSessionTicket,
    ServerFinished,
    End,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub(crate) enum Handshake {
    Client(Client),
    Server(Server),
}

impl Handshake {
    /// Consume whatever the engine has buffered.
    pub fn make_progress(&mut self, engine: &mut Engine) -> Result<(), Error> {
        match self {
            Handshake::Client(c) => c.make_progress(engine),
            Handshake::Server(s) => s.make_progress(engine),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared().state
    }

    pub fn security_parameters(&self) -> Option<&SecurityParameters> {
        self.shared().security.as_ref()
    }

    pub fn session(&self) -> Option<&TlsSession> {
        self.shared().session.as_ref()
    }

    /// Drop everything staged. A session being resumed is unusable after this.
    pub fn fail(&mut self) {
        let shared = match self {
            Handshake::Client(c) => &mut c.shared,
            Handshake::Server(s) => &mut s.shared,
        };
        shared.fail();
    }

    fn shared(&self) -> &Shared {
        match self {
            Handshake::Client(c) => &c.shared,
            Handshake::Server(s) => &s.shared,
        }
    }
}

/// State both roles keep.
pub(crate) struct Shared {
    pub state: ConnectionState,
    pub params: HandshakeParams,
    pub transcript: Transcript,
    key: Option<Box<dyn SigningKey>>,
    pub session: Option<TlsSession>,
    /// The session offered for resumption, held until the handshake ends.
    pub offered: Option<TlsSession>,
    pub security: Option<SecurityParameters>,
    /// Stream only: the peer's ChangeCipherSpec switched the read cipher.
    pub peer_ccs: bool,
    /// A TLS 1.3 middlebox compatibility ChangeCipherSpec was seen.
    pub compat_ccs: bool,
}

impl Shared {
    fn new(session: Option<TlsSession>) -> Self {
        Shared {
            state: ConnectionState::Start,
            params: HandshakeParams::default(),
            transcript: Transcript::new(),
            key: None,
            session,
            offered: None,
            security: None,
            peer_ccs: false,
            compat_ccs: false,
        }
    }

    /// The configured private key, loaded on first use.
    pub fn signing_key(&mut self, config: &Config) -> Result<&mut dyn SigningKey, Error> {
        if self.key.is_none() {
            let der = config
                .private_key()
                .ok_or_else(|| Error::internal("no private key configured"))?;
            let key = config
                .crypto_provider()
                .key_provider
                .load_private_key(der)
                .map_err(|e| Error::internal(format!("private key: {e}")))?;
            self.key = Some(key);
        }
        match self.key.as_deref_mut() {
            Some(k) => Ok(k),
            None => Err(Error::internal("private key vanished")),
        }
    }

    /// Schemes of the configured key, empty without one.
    pub fn key_schemes(&mut self, config: &Config) -> &'static [SignatureScheme] {
        if config.private_key().is_none() {
            return &[];
        }
        match self.signing_key(config) {
            Ok(k) => k.schemes(),
            Err(e) => {
                warn!("Unusable private key: {}", e);
                &[]
            }
        }
    }

    /// Handle a ChangeCipherSpec in a TLS 1.3 handshake. One is tolerated.
    pub fn compat_change_cipher_spec(&mut self) -> Result<(), Error> {
        if self.compat_ccs {
            return Err(Error::unexpected("second change cipher spec"));
        }
        trace!("Ignore compatibility change cipher spec");
        self.compat_ccs = true;
        Ok(())
    }

    /// Commit the negotiated parameters and hand the connection over to
    /// application data.
    pub fn finish(
        &mut self,
        engine: &mut Engine,
        keep_flight: bool,
        session_id: &[u8],
    ) -> Result<(), Error> {
        let sp = self.params.commit()?;
        self.offered = None;
        if !sp.version().is_tls13() {
            let snapshot = sp.session_parameters();
            match &self.session {
                Some(s) if sp.is_resumed() => s.refresh(snapshot),
                _ if !session_id.is_empty() => {
                    self.session = Some(TlsSession::new(session_id.to_vec(), snapshot));
                }
                _ => self.session = None,
            }
        } else {
            self.session = None;
        }
        debug!(
            "Negotiated {} {} resumed: {}",
            sp.version(),
            sp.cipher_suite(),
            sp.is_resumed()
        );
        let peer_heartbeat = sp.heartbeat();
        self.security = Some(sp);
        self.state = ConnectionState::End;
        engine.complete(keep_flight, peer_heartbeat)
    }

    fn fail(&mut self) {
        self.params.clear();
        if let Some(sp) = &mut self.security {
            sp.destroy();
        }
        if self.state != ConnectionState::End {
            let resumed = self.session.take().filter(|_| self.params.resumed);
            // Whether or not the server took it up, an offered session dies
            // with the attempt.
            for s in self.offered.take().into_iter().chain(resumed) {
                debug!("Invalidate session after failed resumption");
                s.invalidate();
            }
        }
        self.key = None;
    }
}

/// Versions we offer, most preferred first.
pub(crate) fn offered_versions(config: &Config) -> Vec<ProtocolVersion> {
    use ProtocolVersion::*;
    let candidates: &[ProtocolVersion] = if config.is_dtls() {
        &[Dtls1_2, Dtls1_0]
    } else {
        &[Tls1_3, Tls1_2, Tls1_1, Tls1_0]
    };
    candidates
        .iter()
        .copied()
        .filter(|v| config.allows_version(*v))
        .collect()
}

/// Pick the scheme to sign with.
///
/// `peer` is what the peer advertised, `None` when it sent nothing (or
/// cannot, before TLS 1.2).
pub(crate) fn choose_scheme(
    ours: &[SignatureScheme],
    version: ProtocolVersion,
    peer: Option<&[SignatureScheme]>,
) -> Result<SignatureScheme, Error> {
    let found = if version.is_tls13() {
        ours.iter()
            .find(|s| s.is_allowed_in_tls13() && peer.is_some_and(|p| p.contains(s)))
    } else if !version.is_tls12_or_later() {
        ours.iter().find(|s| **s == SignatureScheme::EcdsaSha1)
    } else {
        match peer {
            Some(p) => ours.iter().find(|s| p.contains(s)),
            // RFC 5246 7.4.1.4.1: no extension means SHA-1.
            None => ours.iter().find(|s| s.hash() == Some(crate::types::HashAlgorithm::Sha1)),
        }
    };
    found
        .copied()
        .ok_or_else(|| Error::handshake_failure(format!("no usable signature scheme for {}", version)))
}

pub(crate) fn sign(
    key: &mut dyn SigningKey,
    scheme: SignatureScheme,
    version: ProtocolVersion,
    data: &[u8],
) -> Result<DigitallySigned, Error> {
    let signature = key
        .sign(scheme, data)
        .map_err(|e| Error::internal(format!("signing with {}: {}", scheme, e)))?;
    Ok(DigitallySigned {
        scheme: version.is_tls12_or_later().then_some(scheme),
        signature,
    })
}

/// Check a peer signature made with the key of `cert`.
pub(crate) fn verify(
    config: &Config,
    version: ProtocolVersion,
    cert: &[u8],
    data: &[u8],
    signed: &DigitallySigned,
) -> Result<(), Error> {
    let scheme = if version.is_tls12_or_later() {
        let scheme = signed
            .scheme
            .ok_or_else(|| Error::decode("signature without scheme"))?;
        if !config.signature_schemes().contains(&scheme) {
            return Err(Error::illegal_parameter(format!("signature scheme {} not offered", scheme)));
        }
        if version.is_tls13() && !scheme.is_allowed_in_tls13() {
            return Err(Error::illegal_parameter(format!("{} not allowed in TLS 1.3", scheme)));
        }
        scheme
    } else {
        SignatureScheme::EcdsaSha1
    };

    config
        .crypto_provider()
        .signature_verification
        .verify_signature(cert, data, &signed.signature, scheme)
        .map_err(|e| Error::decrypt_error(format!("bad {} signature: {}", scheme, e)))
}

pub(crate) const SERVER_CONTEXT: &[u8] = b"TLS 1.3, server CertificateVerify";
pub(crate) const CLIENT_CONTEXT: &[u8] = b"TLS 1.3, client CertificateVerify";

/// What a TLS 1.3 CertificateVerify signs (RFC 8446 4.4.3).
pub(crate) fn tls13_signed_content(context: &[u8], transcript_hash: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(64 + context.len() + 1 + transcript_hash.len());
    out.extend_from_slice(&[0x20; 64]);
    out.extend_from_slice(context);
    out.push(0);
    out.extend_from_slice(transcript_hash);
    out
}

/// Hand the peer's chain to the application's verifier and announce the leaf.
pub(crate) fn check_peer_chain(engine: &mut Engine, chain: &[Vec<u8>]) -> Result<(), Error> {
    if let Some(verifier) = engine.config().cert_verifier() {
        verifier
            .verify_chain(chain)
            .map_err(|e| Error::bad_certificate(format!("certificate rejected: {e}")))?;
    }
    if let Some(leaf) = chain.first() {
        engine.push_event(LocalEvent::PeerCert(leaf.clone()));
    }
    Ok(())
}

/// Master secret from the premaster secret. With the extended master secret
/// the transcript must end with the ClientKeyExchange.
pub(crate) fn derive_master_secret(
    provider: &CryptoProvider,
    params: &HandshakeParams,
    transcript: &Transcript,
    mut pre_master_secret: Secret,
) -> Result<Secret, Error> {
    let alg = params.prf_algorithm()?;
    let pms = pre_master_secret.expose()?;
    let ms = if params.extended_master_secret {
        let session_hash = transcript.handshake_hash(provider, params.version()?, params.cipher_suite()?)?;
        prf::extended_master_secret(provider, alg, pms, &session_hash)?
    } else {
        prf::master_secret(
            provider,
            alg,
            pms,
            &params.client_random()?.0,
            &params.server_random()?.0,
        )?
    };
    pre_master_secret.destroy();
    Ok(ms)
}

/// Expand the master secret into (read, write) ciphers for our side.
pub(crate) fn legacy_key_material(
    provider: &CryptoProvider,
    params: &HandshakeParams,
    is_client: bool,
) -> Result<(Box<dyn TlsCipher>, Box<dyn TlsCipher>), Error> {
    let version = params.version()?;
    let suite = params.cipher_suite()?;
    let mut kb = prf::key_block(
        provider,
        params.prf_algorithm()?,
        params.master_secret()?,
        &params.client_random()?.0,
        &params.server_random()?.0,
        key_block_len(suite, version)?,
    )?;
    let (client_write, server_write) = legacy_ciphers(provider, suite, version, &kb)?;
    kb.destroy();
    if is_client {
        Ok((server_write, client_write))
    } else {
        Ok((client_write, server_write))
    }
}

/// Finished verify_data of one side over the transcript so far.
pub(crate) fn legacy_verify_data(
    provider: &CryptoProvider,
    params: &HandshakeParams,
    transcript: &Transcript,
    from_client: bool,
) -> Result<Vec<u8>, Error> {
    let hash = transcript.handshake_hash(provider, params.version()?, params.cipher_suite()?)?;
    prf::verify_data(
        provider,
        params.prf_algorithm()?,
        params.master_secret()?,
        from_client,
        &hash,
    )
}

/// Check a legacy Finished from the peer. The transcript must not hold it yet.
pub(crate) fn check_legacy_finished(
    engine: &mut Engine,
    shared: &mut Shared,
    body: &[u8],
    epoch: u16,
    from_client: bool,
) -> Result<(), Error> {
    let protected = if engine.is_dtls() {
        epoch > 0 && epoch == engine.read_epoch()
    } else {
        shared.peer_ccs
    };
    if !protected {
        return Err(Error::unexpected("finished before change cipher spec"));
    }
    let finished = crate::message::Finished::decode(body, VERIFY_DATA_LEN)?;
    let expected = legacy_verify_data(engine.provider(), &shared.params, &shared.transcript, from_client)?;
    if !prf::ct_eq(&expected, &finished.verify_data) {
        return Err(Error::decrypt_error("finished verify data mismatch"));
    }
    shared.params.peer_verify_data = Some(finished.verify_data);
    Ok(())
}

/// Messages after the handshake completed.
///
/// Renegotiation is refused with a warning. TLS 1.3 handles KeyUpdate and
/// drops session tickets, which are never used for resumption.
pub(crate) fn handle_post_handshake(
    engine: &mut Engine,
    incoming: Incoming,
    is_client: bool,
) -> Result<(), Error> {
    let Incoming::Handshake(msg) = incoming else {
        return Err(Error::unexpected("change cipher spec after handshake"));
    };

    if engine.is_tls13() {
        return match msg.msg_type {
            HandshakeType::KeyUpdate => engine.handle_key_update(&KeyUpdate::decode(&msg.body)?),
            HandshakeType::NewSessionTicket if is_client => {
                let ticket = crate::codec::parse_all(&msg.body, "new session ticket", NewSessionTicket13::parse)?;
                debug!("Ignore session ticket, lifetime {}s", ticket.lifetime);
                Ok(())
            }
            t => Err(Error::unexpected(format!("{} after handshake", t))),
        };
    }

    match msg.msg_type {
        HandshakeType::HelloRequest if is_client => {
            debug!("Refuse renegotiation");
            engine.send_alert(Alert::warning(AlertDescription::NoRenegotiation))
        }
        HandshakeType::ClientHello if !is_client => {
            debug!("Refuse renegotiation");
            engine.send_alert(Alert::warning(AlertDescription::NoRenegotiation))
        }
        t => Err(Error::unexpected(format!("{} after handshake", t))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignatureScheme::*;

    #[test]
    fn scheme_choice_by_version() {
        let p256 = &[EcdsaSecp256r1Sha256, EcdsaSha1];
        let rsa = &[RsaPkcs1Sha256, RsaPkcs1Sha384, RsaPkcs1Sha1];

        let s = choose_scheme(p256, ProtocolVersion::Tls1_0, None).unwrap();
        assert_eq!(s, EcdsaSha1);
        let err = choose_scheme(rsa, ProtocolVersion::Tls1_1, None).unwrap_err();
        assert_eq!(err.alert(), Some(AlertDescription::HandshakeFailure));

        let s = choose_scheme(rsa, ProtocolVersion::Tls1_2, None).unwrap();
        assert_eq!(s, RsaPkcs1Sha1);
        let s = choose_scheme(rsa, ProtocolVersion::Dtls1_2, Some(&[RsaPkcs1Sha384])).unwrap();
        assert_eq!(s, RsaPkcs1Sha384);

        let s = choose_scheme(p256, ProtocolVersion::Tls1_3, Some(&[EcdsaSha1, EcdsaSecp256r1Sha256])).unwrap();
        assert_eq!(s, EcdsaSecp256r1Sha256);
        assert!(choose_scheme(rsa, ProtocolVersion::Tls1_3, Some(&[RsaPkcs1Sha256])).is_err());
    }

    #[test]
    fn tls13_signed_content_layout() {
        let c = tls13_signed_content(SERVER_CONTEXT, &[9; 32]);
        assert_eq!(c.len(), 64 + SERVER_CONTEXT.len() + 1 + 32);
        assert!(c[..64].iter().all(|b| *b == 0x20));
        assert_eq!(c[64 + SERVER_CONTEXT.len()], 0);
    }

    #[test]
    fn offered_versions_follow_config() {
        let config = Config::builder().dtls().build().unwrap();
        assert_eq!(
            offered_versions(&config),
            vec![ProtocolVersion::Dtls1_2, ProtocolVersion::Dtls1_0]
        );
        let config = Config::builder().build().unwrap();
        assert_eq!(
            offered_versions(&config),
            vec![ProtocolVersion::Tls1_3, ProtocolVersion::Tls1_2]
        );
    }

    #[test]
    fn failed_resumption_invalidates_session() {
        use crate::session::SessionParameters;
        use crate::types::CipherSuite;

        let session = TlsSession::new(
            vec![1; 32],
            SessionParameters {
                version: ProtocolVersion::Tls1_2,
                cipher_suite: CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
                master_secret: Secret::new(vec![3; 48]),
                peer_certificates: vec![],
                extended_master_secret: true,
                max_fragment_length: None,
            },
        );
        let mut shared = Shared::new(Some(session.clone()));
        shared.state = ConnectionState::ServerHello;
        shared.params.resumed = true;
        shared.fail();
        assert!(!session.is_resumable());
    }

    #[test]
    fn offered_session_dies_with_the_attempt() {
        use crate::session::SessionParameters;
        use crate::types::CipherSuite;

        let session = TlsSession::new(
            vec![2; 32],
            SessionParameters {
                version: ProtocolVersion::Tls1_2,
                cipher_suite: CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
                master_secret: Secret::new(vec![4; 48]),
                peer_certificates: vec![],
                extended_master_secret: true,
                max_fragment_length: None,
            },
        );
        // Failed before any ServerHello: nothing resumed yet.
        let mut shared = Shared::new(Some(session.clone()));
        shared.offered = Some(session.clone());
        shared.state = ConnectionState::ClientHello;
        shared.fail();
        assert!(!session.is_resumable());
    }
}
