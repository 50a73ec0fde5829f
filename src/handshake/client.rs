//! Client side of the legacy handshake (TLS 1.0 to 1.2, DTLS 1.0 and 1.2).
//!
//! ```text
//! Client                                         Server
//!
//! ClientHello                  -------->
//!                              <--------   HelloVerifyRequest (DTLS)
//! ClientHello (with cookie)    -------->
//!                                                ServerHello
//!                                               Certificate*
//!                                         ServerKeyExchange*
//!                                        CertificateRequest*
//!                              <--------     ServerHelloDone
//! Certificate*
//! ClientKeyExchange
//! CertificateVerify*
//! [ChangeCipherSpec]
//! Finished                     -------->
//!                                         [ChangeCipherSpec]
//!                              <--------             Finished
//! ```
//!
//! When the server resumes the offered session, its ServerHello is followed
//! directly by ChangeCipherSpec and Finished, and the client answers with
//! its own.
//!
//! A ServerHello selecting TLS 1.3 hands over to `client13`.

use super::{check_legacy_finished, check_peer_chain, choose_scheme, derive_master_secret};
use super::{handle_post_handshake, legacy_key_material, legacy_verify_data, offered_versions};
use super::{sign, verify, ConnectionState, HandshakeParams, Shared};
use crate::codec::parse_all;
use crate::crypto::key_schedule::KeySchedule;
use crate::crypto::{ActiveKeyExchange, Secret};
use crate::engine::{Engine, HandshakeMessage, Incoming};
use crate::kx::{self, KeyExchange};
use crate::message::client_hello::NULL_COMPRESSION;
use crate::message::{Certificate, CertificateRequest, CertificateRequest13, ClientHello};
use crate::message::{Finished, HelloVerifyRequest, KeyShareEntry, Random, ServerHello};
use crate::message::{Extensions, ServerKeyExchange};
use crate::session::{SessionParameters, TlsSession};
use crate::types::{CipherSuite, ExtensionType, HandshakeType, ProtocolVersion, SignatureScheme};
use crate::{Config, Error};

pub(crate) struct Client {
    pub(super) shared: Shared,
    /// Our last ClientHello, resent with a cookie or a new key share.
    pub(super) hello: Option<ClientHello>,
    /// Highest version in our ClientHello.
    pub(super) max_version: Option<ProtocolVersion>,
    /// The snapshot we try to resume.
    resume: Option<SessionParameters>,
    kx: Option<Box<dyn KeyExchange>>,
    /// The server asked for a certificate. Holds its scheme list from TLS 1.2.
    cert_request: Option<Option<Vec<SignatureScheme>>>,

    /// TLS 1.3 negotiated (or a HelloRetryRequest seen).
    pub(super) tls13: bool,
    pub(super) key_share: Option<Box<dyn ActiveKeyExchange>>,
    pub(super) hrr_suite: Option<CipherSuite>,
    pub(super) schedule: Option<KeySchedule>,
    /// (client, server) handshake traffic secrets.
    pub(super) hs_secrets: Option<(Secret, Secret)>,
    pub(super) cert_request13: Option<CertificateRequest13>,
}

impl Client {
    pub fn new(session: Option<TlsSession>) -> Self {
        Client {
            shared: Shared::new(session),
            hello: None,
            max_version: None,
            resume: None,
            kx: None,
            cert_request: None,
            tls13: false,
            key_share: None,
            hrr_suite: None,
            schedule: None,
            hs_secrets: None,
            cert_request13: None,
        }
    }

    pub fn make_progress(&mut self, engine: &mut Engine) -> Result<(), Error> {
        if self.shared.state == ConnectionState::Start {
            self.send_client_hello(engine)?;
            debug!("{} -> {}", ConnectionState::Start, ConnectionState::ClientHello);
            self.shared.state = ConnectionState::ClientHello;
        }

        while let Some(incoming) = engine.next_incoming()? {
            let old = self.shared.state;
            if old == ConnectionState::End {
                handle_post_handshake(engine, incoming, true)?;
                continue;
            }

            let new = if self.tls13 {
                self.handle13(engine, incoming)?
            } else {
                self.handle(engine, incoming)?
            };
            if new != old {
                debug!("{} -> {}", old, new);
            }
            self.shared.state = new;
        }
        Ok(())
    }

    fn handle(&mut self, engine: &mut Engine, incoming: Incoming) -> Result<ConnectionState, Error> {
        use ConnectionState as S;
        use HandshakeType as H;

        let state = self.shared.state;
        let msg = match incoming {
            Incoming::ChangeCipherSpec => return self.handle_change_cipher_spec(engine),
            Incoming::Handshake(m) => m,
        };
        trace!("Received {} in {}", msg.msg_type, state);

        match (state, msg.msg_type) {
            (_, H::HelloRequest) => {
                debug!("Ignore HelloRequest during handshake");
                Ok(state)
            }
            (S::ClientHello, H::HelloVerifyRequest) if engine.is_dtls() => {
                self.handle_hello_verify_request(engine, &msg)
            }
            (S::ClientHello, H::ServerHello) => self.handle_server_hello(engine, msg),
            (S::ServerHello, H::Certificate) if !self.shared.params.resumed => {
                self.handle_certificate(engine, &msg)
            }
            (S::ServerHello | S::ServerCertificate, H::ServerKeyExchange)
                if !self.shared.params.resumed =>
            {
                self.handle_server_key_exchange(engine, &msg)
            }
            (S::ServerHello | S::ServerCertificate | S::ServerKeyExchange, H::CertificateRequest)
                if !self.shared.params.resumed =>
            {
                self.handle_certificate_request(engine, &msg)
            }
            (
                S::ServerHello | S::ServerCertificate | S::ServerKeyExchange | S::ServerCertificateRequest,
                H::ServerHelloDone,
            ) if !self.shared.params.resumed => self.handle_server_hello_done(engine, &msg),
            (S::ClientFinished, H::Finished) => self.handle_finished(engine, &msg),
            (S::ServerHello, H::Finished) if self.shared.params.resumed => self.handle_finished(engine, &msg),
            (s, t) => Err(Error::unexpected(format!("{} in state {}", t, s))),
        }
    }

    fn handle_change_cipher_spec(&mut self, engine: &mut Engine) -> Result<ConnectionState, Error> {
        let state = self.shared.state;
        let expected = match state {
            ConnectionState::ClientFinished => true,
            ConnectionState::ServerHello => self.shared.params.resumed,
            _ => false,
        };
        if !expected || self.shared.peer_ccs {
            return Err(Error::unexpected(format!("change cipher spec in state {}", state)));
        }
        engine.change_read_cipher()?;
        self.shared.peer_ccs = true;
        Ok(state)
    }

    fn send_client_hello(&mut self, engine: &mut Engine) -> Result<(), Error> {
        let config = engine.config_handle();
        let provider = config.crypto_provider();

        let versions = offered_versions(&config);
        let max = *versions
            .first()
            .ok_or_else(|| Error::internal("no version to offer"))?;
        let offer13 = max.is_tls13();
        let legacy: Vec<ProtocolVersion> = versions.iter().copied().filter(|v| !v.is_tls13()).collect();

        let mut suites: Vec<CipherSuite> = config
            .cipher_suites()
            .iter()
            .copied()
            .filter(|s| {
                if s.is_tls13() {
                    offer13
                } else {
                    legacy.iter().any(|v| s.is_usable_with(*v))
                }
            })
            .collect();
        if suites.is_empty() {
            return Err(Error::Config(format!("no cipher suite usable up to {}", max)));
        }
        if !legacy.is_empty() {
            suites.push(CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV);
        }

        let client_version = if offer13 { ProtocolVersion::Tls1_2 } else { max };
        let random = Random::new(engine.now(), provider)?;
        let mut ch = ClientHello::new(client_version, random, suites);

        self.resume = self.resumable(&config);
        if self.resume.is_some() {
            if let Some(s) = &self.shared.session {
                debug!("Offer session resumption");
                ch.session_id = s.id().to_vec();
                self.shared.offered = Some(s.clone());
            }
        } else {
            self.shared.session = None;
            if offer13 {
                ch.session_id = provider.random_vec(32)?;
            }
        }

        let ecc = ch
            .cipher_suites
            .iter()
            .filter(|s| !s.is_tls13() && !s.is_signalling())
            .any(|s| s.key_exchange().is_some_and(|k| k.is_ecc()));

        let ext = &mut ch.extensions;
        if let Some(name) = config.server_name() {
            ext.set_server_name(name)?;
        }
        if ecc || offer13 {
            let groups: Vec<_> = config.named_groups().iter().copied().filter(|g| g.is_ecdhe()).collect();
            ext.set_supported_groups(&groups)?;
        }
        if ecc {
            ext.set_ec_point_formats();
        }
        if versions.iter().any(|v| v.is_tls12_or_later()) {
            ext.set_signature_algorithms(config.signature_schemes())?;
        }
        if config.extended_master_secret() && !legacy.is_empty() {
            ext.set_flag(ExtensionType::ExtendedMasterSecret);
        }
        if let Some(mfl) = config.max_fragment_length() {
            ext.set_max_fragment_length(mfl);
        }
        if let Some(mode) = config.heartbeat_mode() {
            ext.set_heartbeat(mode);
        }
        if !config.alpn_protocols().is_empty() {
            ext.set_alpn(config.alpn_protocols())?;
        }
        if offer13 {
            ext.set_supported_versions(&versions)?;
            let group = config
                .named_groups()
                .iter()
                .copied()
                .find(|g| g.is_ecdhe())
                .ok_or_else(|| Error::Config("TLS 1.3 needs an ECDHE group".into()))?;
            let active = provider
                .kx_group(group)
                .ok_or_else(|| Error::internal(format!("provider lacks {}", group)))?
                .start_exchange()
                .map_err(Error::internal)?;
            ext.set_key_shares(&[KeyShareEntry {
                group,
                key_exchange: active.pub_key().to_vec(),
            }])?;
            self.key_share = Some(active);
        }

        let mut body = Vec::new();
        ch.serialize(&mut body)?;
        engine.begin_flight();
        let raw = engine.send_handshake(HandshakeType::ClientHello, body)?;
        engine.end_flight(true);
        self.shared.transcript.add(&raw);

        self.shared.params.client_random = Some(ch.random.clone());
        self.max_version = Some(max);
        self.hello = Some(ch);
        Ok(())
    }

    fn resumable(&self, config: &Config) -> Option<SessionParameters> {
        let session = self.shared.session.as_ref()?;
        if !session.is_resumable() {
            return None;
        }
        let p = session.parameters()?;
        let usable = config.allows_version(p.version) && config.cipher_suites().contains(&p.cipher_suite);
        usable.then_some(p)
    }

    fn handle_hello_verify_request(
        &mut self,
        engine: &mut Engine,
        msg: &HandshakeMessage,
    ) -> Result<ConnectionState, Error> {
        let hvr = parse_all(&msg.body, "hello verify request", HelloVerifyRequest::parse)?;
        if hvr.cookie.is_empty() {
            return Err(Error::illegal_parameter("empty cookie"));
        }
        let ch = self
            .hello
            .as_mut()
            .ok_or_else(|| Error::internal("no client hello to repeat"))?;
        debug!("Repeat ClientHello with {} byte cookie", hvr.cookie.len());
        ch.cookie = Some(hvr.cookie);

        let mut body = Vec::new();
        ch.serialize(&mut body)?;
        engine.begin_flight();
        let raw = engine.send_handshake(HandshakeType::ClientHello, body)?;
        engine.end_flight(true);

        // Neither the first ClientHello nor the HelloVerifyRequest count.
        self.shared.transcript.reset();
        self.shared.transcript.add(&raw);
        Ok(ConnectionState::ClientHello)
    }

    fn handle_server_hello(&mut self, engine: &mut Engine, msg: HandshakeMessage) -> Result<ConnectionState, Error> {
        let sh = parse_all(&msg.body, "server hello", ServerHello::parse)?;
        let config = engine.config_handle();
        let max = self.max_version.ok_or_else(|| Error::internal("no client hello sent"))?;

        if sh.is_hello_retry_request() {
            if !max.is_tls13() {
                return Err(Error::illegal_parameter("hello retry request without TLS 1.3 offer"));
            }
            return self.handle_hello_retry_request(engine, sh, &msg.raw);
        }

        let version = sh.negotiated_version()?;
        if version.is_tls13() {
            if !max.is_tls13() {
                return Err(Error::protocol_version("server selected TLS 1.3, not offered"));
            }
            return self.handle_server_hello13(engine, sh, &msg.raw);
        }
        if sh.extensions.contains(ExtensionType::SupportedVersions) {
            return Err(Error::illegal_parameter(format!("supported_versions selecting {}", version)));
        }
        if !config.allows_version(version) {
            return Err(Error::protocol_version(format!("server selected {}", version)));
        }
        if version < max && sh.random.has_downgrade_sentinel() {
            return Err(Error::illegal_parameter(format!("downgrade to {} detected", version)));
        }

        let ch = self
            .hello
            .as_ref()
            .ok_or_else(|| Error::internal("no client hello sent"))?;
        let suite = sh.cipher_suite;
        if !ch.offers(suite) || suite.is_tls13() || suite.is_signalling() || !suite.is_usable_with(version) {
            return Err(Error::illegal_parameter(format!("server selected {} with {}", suite, version)));
        }
        if sh.compression_method != NULL_COMPRESSION {
            return Err(Error::illegal_parameter("compression selected"));
        }

        for e in sh.extensions.iter() {
            let t = e.extension_type;
            if t != ExtensionType::RenegotiationInfo && !ch.extensions.contains(t) {
                return Err(Error::unsupported_extension(format!("unsolicited {}", t)));
            }
        }
        if let Some(info) = sh.extensions.renegotiation_info()? {
            if !info.is_empty() {
                return Err(Error::handshake_failure("renegotiation info on initial handshake"));
            }
        }

        let params = &mut self.shared.params;
        params.version = Some(version);
        params.cipher_suite = Some(suite);
        params.server_random = Some(sh.random.clone());
        params.session_id = sh.session_id.clone();
        params.extended_master_secret = sh.extensions.contains(ExtensionType::ExtendedMasterSecret);

        accept_server_extensions(&config, params, &sh.extensions)?;

        let resuming = !sh.session_id.is_empty() && sh.session_id == ch.session_id;
        match self.resume.take() {
            Some(rp) if resuming => {
                if rp.version != version || rp.cipher_suite != suite {
                    return Err(Error::illegal_parameter("resumed session with other parameters"));
                }
                if rp.extended_master_secret != params.extended_master_secret {
                    return Err(Error::handshake_failure("extended master secret changed on resumption"));
                }
                debug!("Resume session");
                params.resumed = true;
                params.master_secret = Some(rp.master_secret.clone());
                params.peer_certificates = rp.peer_certificates.clone();
            }
            declined => {
                if declined.is_some() {
                    debug!("Server declined resumption");
                }
                self.shared.session = None;
            }
        }

        engine.set_version(version);
        if let Some(limit) = params.max_fragment_length.and_then(|m| m.limit()) {
            engine.set_plaintext_limit(limit);
        }
        self.shared.transcript.add(&msg.raw);

        if params.resumed {
            let (read, write) = legacy_key_material(config.crypto_provider(), params, true)?;
            engine.set_pending_ciphers(read, write);
        } else {
            let kx_alg = suite
                .key_exchange()
                .ok_or_else(|| Error::internal(format!("no key exchange for {}", suite)))?;
            self.kx = Some(kx::client(kx_alg, &config)?);
        }
        Ok(ConnectionState::ServerHello)
    }

    fn kx(&mut self) -> Result<&mut Box<dyn KeyExchange>, Error> {
        self.kx.as_mut().ok_or_else(|| Error::internal("no key exchange"))
    }

    fn handle_certificate(&mut self, engine: &mut Engine, msg: &HandshakeMessage) -> Result<ConnectionState, Error> {
        let cert = parse_all(&msg.body, "certificate", |i| Certificate::parse(i, false))?;
        let chain = cert.chain();
        self.kx()?.process_server_certificate(&chain)?;
        check_peer_chain(engine, &chain)?;
        self.shared.params.peer_certificates = chain;
        self.shared.transcript.add(&msg.raw);
        Ok(ConnectionState::ServerCertificate)
    }

    fn handle_server_key_exchange(
        &mut self,
        engine: &mut Engine,
        msg: &HandshakeMessage,
    ) -> Result<ConnectionState, Error> {
        let version = self.shared.params.version()?;
        if self.shared.state == ConnectionState::ServerHello {
            self.kx()?.skip_server_credentials()?;
        }
        let algorithm = self.kx()?.algorithm();
        let ske = parse_all(&msg.body, "server key exchange", |i| {
            ServerKeyExchange::parse(i, algorithm, version)
        })?;

        if let Some(signed) = &ske.signature {
            let params = &self.shared.params;
            let mut data = Vec::with_capacity(64 + 128);
            data.extend_from_slice(&params.client_random()?.0);
            data.extend_from_slice(&params.server_random()?.0);
            data.extend_from_slice(&ske.params_bytes()?);
            let leaf = params
                .peer_certificates
                .first()
                .ok_or_else(|| Error::internal("signed key exchange without certificate"))?;
            verify(engine.config(), version, leaf, &data, signed)?;
        }

        self.kx()?.process_server_key_exchange(&ske)?;
        self.shared.transcript.add(&msg.raw);
        Ok(ConnectionState::ServerKeyExchange)
    }

    fn handle_certificate_request(
        &mut self,
        _engine: &mut Engine,
        msg: &HandshakeMessage,
    ) -> Result<ConnectionState, Error> {
        let kx = self.kx()?;
        if !kx.requires_certificate_verify() {
            return Err(Error::unexpected(format!("certificate request with {:?}", kx.algorithm())));
        }
        if kx.requires_server_key_exchange() && self.shared.state != ConnectionState::ServerKeyExchange {
            return Err(Error::unexpected("certificate request before server key exchange"));
        }
        let version = self.shared.params.version()?;
        let cr = parse_all(&msg.body, "certificate request", |i| CertificateRequest::parse(i, version))?;
        debug!("Server requests a certificate ({} types)", cr.certificate_types.len());
        self.cert_request = Some(cr.signature_schemes);
        self.shared.transcript.add(&msg.raw);
        Ok(ConnectionState::ServerCertificateRequest)
    }

    fn handle_server_hello_done(
        &mut self,
        engine: &mut Engine,
        msg: &HandshakeMessage,
    ) -> Result<ConnectionState, Error> {
        if !msg.body.is_empty() {
            return Err(Error::decode("server hello done with a body"));
        }
        let state = self.shared.state;
        if state == ConnectionState::ServerHello {
            self.kx()?.skip_server_credentials()?;
        }
        if matches!(state, ConnectionState::ServerHello | ConnectionState::ServerCertificate) {
            self.kx()?.skip_server_key_exchange()?;
        }
        self.shared.transcript.add(&msg.raw);
        self.send_client_flight(engine)?;
        Ok(ConnectionState::ClientFinished)
    }

    fn send_client_flight(&mut self, engine: &mut Engine) -> Result<(), Error> {
        let config = engine.config_handle();
        let provider = config.crypto_provider();
        let version = self.shared.params.version()?;

        engine.begin_flight();

        let mut verify_scheme = None;
        if let Some(peer_schemes) = self.cert_request.take() {
            if !config.certificate_chain().is_empty() && config.private_key().is_some() {
                let ours = self.shared.key_schemes(&config);
                match choose_scheme(ours, version, peer_schemes.as_deref()) {
                    Ok(s) => verify_scheme = Some(s),
                    Err(e) => debug!("Send empty certificate: {}", e),
                }
            }
            let chain = match verify_scheme {
                Some(_) => config.certificate_chain().to_vec(),
                None => Vec::new(),
            };
            let mut body = Vec::new();
            Certificate::new(&chain, false).serialize(&mut body)?;
            let raw = engine.send_handshake(HandshakeType::Certificate, body)?;
            self.shared.transcript.add(&raw);
            self.shared.params.local_certificates = chain;
        }

        let kx = self.kx.as_mut().ok_or_else(|| Error::internal("no key exchange"))?;
        let cke = kx.generate_client_key_exchange()?;
        let mut body = Vec::new();
        cke.serialize(&mut body, kx.algorithm())?;
        let raw = engine.send_handshake(HandshakeType::ClientKeyExchange, body)?;
        self.shared.transcript.add(&raw);

        let pms = kx.generate_pre_master_secret()?;
        let ms = derive_master_secret(provider, &self.shared.params, &self.shared.transcript, pms)?;
        self.shared.params.master_secret = Some(ms);

        if let Some(scheme) = verify_scheme {
            let data = self.shared.transcript.bytes().to_vec();
            let key = self.shared.signing_key(&config)?;
            let signed = sign(key, scheme, version, &data)?;
            let mut body = Vec::new();
            signed.serialize(&mut body)?;
            let raw = engine.send_handshake(HandshakeType::CertificateVerify, body)?;
            self.shared.transcript.add(&raw);
        }

        let (read, write) = legacy_key_material(provider, &self.shared.params, true)?;
        engine.set_pending_ciphers(read, write);
        engine.send_change_cipher_spec()?;

        self.send_finished(engine)?;
        engine.end_flight(true);
        Ok(())
    }

    fn send_finished(&mut self, engine: &mut Engine) -> Result<(), Error> {
        let verify_data = legacy_verify_data(engine.provider(), &self.shared.params, &self.shared.transcript, true)?;
        let mut body = Vec::new();
        Finished {
            verify_data: verify_data.clone(),
        }
        .serialize(&mut body);
        let raw = engine.send_handshake(HandshakeType::Finished, body)?;
        self.shared.transcript.add(&raw);
        self.shared.params.local_verify_data = Some(verify_data);
        Ok(())
    }

    fn handle_finished(&mut self, engine: &mut Engine, msg: &HandshakeMessage) -> Result<ConnectionState, Error> {
        check_legacy_finished(engine, &mut self.shared, &msg.body, msg.epoch, false)?;
        self.shared.transcript.add(&msg.raw);

        let resumed = self.shared.params.resumed;
        if resumed {
            engine.begin_flight();
            engine.send_change_cipher_spec()?;
            self.send_finished(engine)?;
            engine.end_flight(false);
        }

        let session_id = self.shared.params.session_id.clone();
        self.shared.finish(engine, resumed, &session_id)?;
        self.kx = None;
        Ok(ConnectionState::End)
    }
}

/// Take over what the server agreed to in its ServerHello or EncryptedExtensions.
pub(super) fn accept_server_extensions(
    config: &Config,
    params: &mut HandshakeParams,
    extensions: &Extensions,
) -> Result<(), Error> {
    if let Some(mfl) = extensions.max_fragment_length()? {
        if config.max_fragment_length() != Some(mfl) {
            return Err(Error::illegal_parameter(format!("max fragment length {} not offered", mfl)));
        }
        params.max_fragment_length = Some(mfl);
    }
    params.heartbeat = extensions.heartbeat()?;
    if let Some(list) = extensions.alpn()? {
        match list.as_slice() {
            [p] if config.alpn_protocols().contains(p) => params.alpn_protocol = Some(p.clone()),
            _ => return Err(Error::illegal_parameter("bad ALPN selection")),
        }
    }
    Ok(())
}

/// Engine for tests that drive a client by hand.
#[cfg(test)]
pub(crate) fn test_engine(config: Config) -> Engine {
    Engine::new(std::sync::Arc::new(config), std::time::Instant::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::encode_tls;

    fn started() -> (Client, Engine) {
        let config = Config::builder()
            .versions(ProtocolVersion::Tls1_2, ProtocolVersion::Tls1_2)
            .build()
            .unwrap();
        let mut engine = test_engine(config);
        let mut client = Client::new(None);
        client.make_progress(&mut engine).unwrap();
        (client, engine)
    }

    #[test]
    fn first_flight_is_client_hello() {
        let (client, _engine) = started();
        assert_eq!(client.shared.state, ConnectionState::ClientHello);
        let ch = client.hello.as_ref().unwrap();
        assert_eq!(ch.client_version, ProtocolVersion::Tls1_2);
        assert!(ch.offers(CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV));
        assert!(!ch.cipher_suites.iter().any(|s| s.is_tls13()));
        assert!(ch.extensions.contains(ExtensionType::ExtendedMasterSecret));
        assert!(!ch.extensions.contains(ExtensionType::SupportedVersions));
        assert!(ch.session_id.is_empty());
    }

    #[test]
    fn server_hello_done_first_is_unexpected() {
        let (mut client, mut engine) = started();
        let raw = encode_tls(HandshakeType::ServerHelloDone, &[]).unwrap();
        let mut record = vec![22, 3, 3];
        record.extend_from_slice(&(raw.len() as u16).to_be_bytes());
        record.extend_from_slice(&raw);
        engine.push_input(&record, std::time::Instant::now()).unwrap();

        let err = client.make_progress(&mut engine).unwrap_err();
        assert_eq!(err.alert(), Some(crate::types::AlertDescription::UnexpectedMessage));
    }

    #[test]
    fn offers_tls13_with_key_share() {
        let config = Config::builder().build().unwrap();
        let mut engine = test_engine(config);
        let mut client = Client::new(None);
        client.make_progress(&mut engine).unwrap();

        let ch = client.hello.as_ref().unwrap();
        assert_eq!(ch.client_version, ProtocolVersion::Tls1_2);
        assert_eq!(ch.session_id.len(), 32);
        let shares = ch.extensions.key_shares().unwrap().unwrap();
        assert_eq!(shares.len(), 1);
        assert!(client.key_share.is_some());
        let versions = ch.extensions.supported_versions().unwrap().unwrap();
        assert_eq!(versions, vec![ProtocolVersion::Tls1_3, ProtocolVersion::Tls1_2]);
    }
}
