//! Server side of the legacy handshake (TLS 1.0 to 1.2, DTLS 1.0 and 1.2).
//!
//! A DTLS server that requires cookies answers a ClientHello without a
//! valid cookie with HelloVerifyRequest and stays in `Start`. The cookie is
//! an HMAC over the ClientHello, so nothing is kept for the unverified
//! client.
//!
//! A ClientHello offering TLS 1.3 that we accept hands over to `server13`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{check_legacy_finished, check_peer_chain, choose_scheme, derive_master_secret};
use super::{handle_post_handshake, legacy_key_material, legacy_verify_data, offered_versions};
use super::{sign, verify, ConnectionState, HandshakeParams, Shared};
use crate::codec::parse_all;
use crate::crypto::key_schedule::KeySchedule;
use crate::crypto::Secret;
use crate::engine::{Engine, HandshakeMessage, Incoming};
use crate::kx::{self, KeyExchange};
use crate::message::client_hello::NULL_COMPRESSION;
use crate::message::random::{DOWNGRADE_TLS11, DOWNGRADE_TLS12};
use crate::message::{Certificate, CertificateRequest, ClientHello, ClientKeyExchange};
use crate::message::{DigitallySigned, Extensions, Finished, HelloVerifyRequest, Random, ServerHello};
use crate::session::TlsSession;
use crate::types::{AlertDescription, CipherSuite, ClientCertificateType, ExtensionType};
use crate::types::{HandshakeType, KeyExchangeAlgorithm, NamedGroup, ProtocolVersion, SignatureScheme};
use crate::{Config, Error};

type HmacSha256 = Hmac<Sha256>;

pub(crate) struct Server {
    pub(super) shared: Shared,
    /// Keys the DTLS cookie HMAC.
    cookie_secret: [u8; 32],
    kx: Option<Box<dyn KeyExchange>>,
    /// We sent CertificateRequest.
    pub(super) cert_requested: bool,

    pub(super) tls13: bool,
    pub(super) hrr_suite: Option<CipherSuite>,
    pub(super) hrr_group: Option<NamedGroup>,
    pub(super) ccs_sent: bool,
    pub(super) schedule: Option<KeySchedule>,
    /// (client, server) handshake traffic secrets.
    pub(super) hs_secrets: Option<(Secret, Secret)>,
    /// (client, server) application traffic secrets.
    pub(super) app_secrets: Option<(Secret, Secret)>,
}

impl Server {
    pub fn new() -> Self {
        Server {
            shared: Shared::new(None),
            cookie_secret: rand::random(),
            kx: None,
            cert_requested: false,
            tls13: false,
            hrr_suite: None,
            hrr_group: None,
            ccs_sent: false,
            schedule: None,
            hs_secrets: None,
            app_secrets: None,
        }
    }

    pub fn make_progress(&mut self, engine: &mut Engine) -> Result<(), Error> {
        while let Some(incoming) = engine.next_incoming()? {
            let old = self.shared.state;
            if old == ConnectionState::End {
                handle_post_handshake(engine, incoming, false)?;
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

        let authenticated = !self.shared.params.peer_certificates.is_empty();
        match (state, msg.msg_type) {
            (S::Start, H::ClientHello) => self.handle_client_hello(engine, &msg),
            (S::ServerHelloDone, H::Certificate) if self.cert_requested => {
                self.handle_client_certificate(engine, &msg)
            }
            (S::ServerHelloDone, H::ClientKeyExchange) if self.cert_requested => {
                Err(Error::unexpected("client key exchange without certificate"))
            }
            (S::ServerHelloDone | S::ClientCertificate, H::ClientKeyExchange) => {
                self.handle_client_key_exchange(engine, &msg)
            }
            (S::ClientKeyExchange, H::CertificateVerify) if authenticated => {
                self.handle_certificate_verify(engine, &msg)
            }
            (S::ClientKeyExchange, H::Finished) if authenticated => {
                Err(Error::unexpected("finished without certificate verify"))
            }
            (S::ClientKeyExchange | S::ClientCertificateVerify, H::Finished) => self.handle_finished(engine, &msg),
            (S::ServerFinished, H::Finished) if self.shared.params.resumed => {
                self.handle_finished(engine, &msg)
            }
            (s, t) => Err(Error::unexpected(format!("{} in state {}", t, s))),
        }
    }

    fn handle_change_cipher_spec(&mut self, engine: &mut Engine) -> Result<ConnectionState, Error> {
        let state = self.shared.state;
        let authenticated = !self.shared.params.peer_certificates.is_empty();
        let expected = match state {
            ConnectionState::ClientKeyExchange => !authenticated,
            ConnectionState::ClientCertificateVerify => true,
            ConnectionState::ServerFinished => self.shared.params.resumed,
            _ => false,
        };
        if !expected || self.shared.peer_ccs {
            return Err(Error::unexpected(format!("change cipher spec in state {}", state)));
        }
        engine.change_read_cipher()?;
        self.shared.peer_ccs = true;
        Ok(state)
    }

    fn cookie_mac(&self, ch: &ClientHello) -> Result<HmacSha256, Error> {
        let mut plain = ch.clone();
        plain.cookie = Some(Vec::new());
        let mut bytes = Vec::new();
        plain.serialize(&mut bytes)?;
        let mut mac = HmacSha256::new_from_slice(&self.cookie_secret)
            .map_err(|e| Error::internal(format!("cookie key: {e}")))?;
        mac.update(&bytes);
        Ok(mac)
    }

    fn has_valid_cookie(&self, ch: &ClientHello) -> Result<bool, Error> {
        match ch.cookie.as_deref() {
            Some(cookie) if !cookie.is_empty() => Ok(self.cookie_mac(ch)?.verify_slice(cookie).is_ok()),
            _ => Ok(false),
        }
    }

    fn send_hello_verify_request(&mut self, engine: &mut Engine, ch: &ClientHello) -> Result<(), Error> {
        let cookie = self.cookie_mac(ch)?.finalize().into_bytes().to_vec();
        let hvr = HelloVerifyRequest {
            server_version: ProtocolVersion::Dtls1_0,
            cookie,
        };
        let mut body = Vec::new();
        hvr.serialize(&mut body)?;
        engine.begin_flight();
        engine.send_handshake(HandshakeType::HelloVerifyRequest, body)?;
        // Stateless. The client's retransmission brings us back here.
        engine.end_flight(false);
        Ok(())
    }

    fn handle_client_hello(&mut self, engine: &mut Engine, msg: &HandshakeMessage) -> Result<ConnectionState, Error> {
        let config = engine.config_handle();
        let provider = config.crypto_provider();
        let dtls = engine.is_dtls();
        let ch = parse_all(&msg.body, "client hello", |i| ClientHello::parse(i, dtls))?;

        if dtls && config.require_cookie() && !self.has_valid_cookie(&ch)? {
            debug!("Send HelloVerifyRequest");
            self.send_hello_verify_request(engine, &ch)?;
            return Ok(ConnectionState::Start);
        }

        let ours = offered_versions(&config);
        // Without a certificate TLS 1.3 is off the table, so 1.2 is no downgrade.
        let tls13_ready = self.tls13_ready(&config, &ch);
        let max = ours
            .iter()
            .copied()
            .find(|v| !v.is_tls13() || tls13_ready)
            .ok_or_else(|| Error::internal("no version enabled"))?;
        let version = self.select_version(&config, &ch, &ours)?;
        debug!("Selected {} (client offered {})", version, ch.client_version);

        if ch.offers(CipherSuite::TLS_FALLBACK_SCSV) && version < max {
            return Err(Error::Alert {
                description: AlertDescription::InappropriateFallback,
                reason: format!("fallback to {} while {} is supported", version, max),
            });
        }

        if version.is_tls13() {
            return self.handle_client_hello13(engine, ch, &msg.raw);
        }

        let renegotiation_signaled = ch.offers(CipherSuite::TLS_EMPTY_RENEGOTIATION_INFO_SCSV)
            || ch.extensions.contains(ExtensionType::RenegotiationInfo);
        if let Some(info) = ch.extensions.renegotiation_info()? {
            if !info.is_empty() {
                return Err(Error::handshake_failure("renegotiation info on initial handshake"));
            }
        }
        if !ch.compression_methods.contains(&NULL_COMPRESSION) {
            return Err(Error::illegal_parameter("null compression not offered"));
        }

        let mut random = Random::new(engine.now(), provider)?;
        let (v, m) = (version.tls_equivalent(), max.tls_equivalent());
        if m.is_tls13() && v == ProtocolVersion::Tls1_2 {
            random.set_downgrade_sentinel(DOWNGRADE_TLS12);
        } else if m.is_tls12_or_later() && !v.is_tls12_or_later() {
            random.set_downgrade_sentinel(DOWNGRADE_TLS11);
        }

        let params = &mut self.shared.params;
        params.version = Some(version);
        params.client_random = Some(ch.random);
        params.server_random = Some(random);
        params.extended_master_secret =
            config.extended_master_secret() && ch.extensions.contains(ExtensionType::ExtendedMasterSecret);

        let mut extensions = Extensions::new();
        let resumed = self.resumable_session(&config, &ch, version)?;
        negotiate_extensions(&config, &ch, &mut self.shared.params, &mut extensions, resumed.is_some())?;

        let params = &mut self.shared.params;
        let (suite, group) = match &resumed {
            Some(session) => {
                let p = session
                    .parameters()
                    .ok_or_else(|| Error::internal("session invalidated"))?;
                debug!("Resume session with {}", p.cipher_suite);
                params.resumed = true;
                params.master_secret = Some(p.master_secret);
                params.peer_certificates = p.peer_certificates;
                params.session_id = ch.session_id.clone();
                (p.cipher_suite, None)
            }
            None => {
                if config.session_store().is_some() {
                    params.session_id = provider.random_vec(32)?;
                }
                let client_schemes = ch.extensions.signature_algorithms()?;
                let client_groups = ch.extensions.supported_groups()?;
                let ours = self.shared.key_schemes(&config);
                select_suite(&config, &ch, version, ours, client_schemes.as_deref(), client_groups.as_deref())?
            }
        };
        self.shared.session = resumed;
        let params = &mut self.shared.params;
        params.cipher_suite = Some(suite);

        if renegotiation_signaled {
            extensions.set_renegotiation_info(&[])?;
        }
        if params.extended_master_secret {
            extensions.set_flag(ExtensionType::ExtendedMasterSecret);
        }
        let ecc = suite.key_exchange().is_some_and(|k| k.is_ecc());
        if ecc && ch.extensions.contains(ExtensionType::EcPointFormats) {
            extensions.set_ec_point_formats();
        }

        let sh = ServerHello {
            server_version: version,
            random,
            session_id: params.session_id.clone(),
            cipher_suite: suite,
            compression_method: NULL_COMPRESSION,
            extensions,
        };
        self.shared.transcript.add(&msg.raw);

        engine.set_version(version);
        engine.begin_flight();
        let mut body = Vec::new();
        sh.serialize(&mut body)?;
        let raw = engine.send_handshake(HandshakeType::ServerHello, body)?;
        self.shared.transcript.add(&raw);
        if let Some(limit) = self.shared.params.max_fragment_length.and_then(|m| m.limit()) {
            engine.set_plaintext_limit(limit);
        }

        if self.shared.params.resumed {
            let (read, write) = legacy_key_material(provider, &self.shared.params, false)?;
            engine.set_pending_ciphers(read, write);
            engine.send_change_cipher_spec()?;
            self.send_finished(engine)?;
            engine.end_flight(true);
            return Ok(ConnectionState::ServerFinished);
        }

        self.send_full_flight(engine, &ch, group)?;
        Ok(ConnectionState::ServerHelloDone)
    }

    fn select_version(
        &self,
        config: &Config,
        ch: &ClientHello,
        ours: &[ProtocolVersion],
    ) -> Result<ProtocolVersion, Error> {
        if !ch.client_version.is_dtls() {
            if let Some(offered) = ch.extensions.supported_versions()? {
                let tls13_ready = self.tls13_ready(config, ch);
                return ours
                    .iter()
                    .copied()
                    .find(|v| offered.contains(v) && (!v.is_tls13() || tls13_ready))
                    .ok_or_else(|| Error::protocol_version("no common version"));
            }
        }

        ours.iter()
            .copied()
            .filter(|v| !v.is_tls13())
            .find(|v| not_newer(*v, ch.client_version))
            .ok_or_else(|| Error::protocol_version(format!("client offered {}", ch.client_version)))
    }

    /// TLS 1.3 needs a certificate and a suite in common.
    fn tls13_ready(&self, config: &Config, ch: &ClientHello) -> bool {
        !config.certificate_chain().is_empty()
            && config.private_key().is_some()
            && config.cipher_suites().iter().any(|s| s.is_tls13() && ch.offers(*s))
    }

    fn resumable_session(
        &self,
        config: &Config,
        ch: &ClientHello,
        version: ProtocolVersion,
    ) -> Result<Option<TlsSession>, Error> {
        let Some(store) = config.session_store() else {
            return Ok(None);
        };
        if ch.session_id.is_empty() {
            return Ok(None);
        }
        let Some(session) = store.get(&ch.session_id) else {
            debug!("Unknown session id");
            return Ok(None);
        };
        let Some(p) = session.parameters() else {
            return Ok(None);
        };

        let ems = config.extended_master_secret() && ch.extensions.contains(ExtensionType::ExtendedMasterSecret);
        let mfl = ch.extensions.max_fragment_length()?;
        let usable = p.version == version
            && ch.offers(p.cipher_suite)
            && config.cipher_suites().contains(&p.cipher_suite)
            && p.cipher_suite.is_usable_with(version)
            && p.extended_master_secret == ems
            && p.max_fragment_length == mfl;
        if !usable {
            debug!("Session does not match the hello, full handshake");
            return Ok(None);
        }
        Ok(Some(session))
    }

    fn send_full_flight(
        &mut self,
        engine: &mut Engine,
        ch: &ClientHello,
        group: Option<NamedGroup>,
    ) -> Result<(), Error> {
        let config = engine.config_handle();
        let version = self.shared.params.version()?;
        let suite = self.shared.params.cipher_suite()?;
        let algorithm = suite
            .key_exchange()
            .ok_or_else(|| Error::internal(format!("no key exchange for {}", suite)))?;
        let mut kx = kx::server(algorithm, &config, group)?;

        if algorithm.requires_server_certificate() {
            let chain = config.certificate_chain().to_vec();
            let mut body = Vec::new();
            Certificate::new(&chain, false).serialize(&mut body)?;
            let raw = engine.send_handshake(HandshakeType::Certificate, body)?;
            self.shared.transcript.add(&raw);
            self.shared.params.local_certificates = chain;
        }

        if kx.requires_server_key_exchange() {
            let mut ske = kx.generate_server_key_exchange()?;
            if algorithm.requires_server_certificate() {
                let client_schemes = ch.extensions.signature_algorithms()?;
                let ours = self.shared.key_schemes(&config);
                let scheme = choose_scheme(ours, version, client_schemes.as_deref())?;
                let params = &self.shared.params;
                let mut data = Vec::new();
                data.extend_from_slice(&params.client_random()?.0);
                data.extend_from_slice(&params.server_random()?.0);
                data.extend_from_slice(&ske.params_bytes()?);
                let key = self.shared.signing_key(&config)?;
                ske.signature = Some(sign(key, scheme, version, &data)?);
            }
            let mut body = Vec::new();
            ske.serialize(&mut body)?;
            let raw = engine.send_handshake(HandshakeType::ServerKeyExchange, body)?;
            self.shared.transcript.add(&raw);
        }

        let wants_client_auth = config.require_client_certificate() || config.cert_verifier().is_some();
        if kx.requires_certificate_verify() && wants_client_auth {
            let cr = CertificateRequest {
                certificate_types: vec![ClientCertificateType::EcdsaSign, ClientCertificateType::RsaSign],
                signature_schemes: version
                    .is_tls12_or_later()
                    .then(|| config.signature_schemes().to_vec()),
                authorities: Vec::new(),
            };
            let mut body = Vec::new();
            cr.serialize(&mut body)?;
            let raw = engine.send_handshake(HandshakeType::CertificateRequest, body)?;
            self.shared.transcript.add(&raw);
            self.cert_requested = true;
        }

        let raw = engine.send_handshake(HandshakeType::ServerHelloDone, Vec::new())?;
        self.shared.transcript.add(&raw);
        engine.end_flight(true);

        self.kx = Some(kx);
        Ok(())
    }

    fn handle_client_certificate(
        &mut self,
        engine: &mut Engine,
        msg: &HandshakeMessage,
    ) -> Result<ConnectionState, Error> {
        let cert = parse_all(&msg.body, "certificate", |i| Certificate::parse(i, false))?;
        let chain = cert.chain();
        if chain.is_empty() {
            if engine.config().require_client_certificate() {
                return Err(Error::handshake_failure("client certificate required"));
            }
            debug!("Client sent no certificate");
        } else {
            check_peer_chain(engine, &chain)?;
        }
        self.shared.params.peer_certificates = chain;
        self.shared.transcript.add(&msg.raw);
        Ok(ConnectionState::ClientCertificate)
    }

    fn handle_client_key_exchange(
        &mut self,
        engine: &mut Engine,
        msg: &HandshakeMessage,
    ) -> Result<ConnectionState, Error> {
        let config = engine.config_handle();
        let provider = config.crypto_provider();
        let kx = self.kx.as_mut().ok_or_else(|| Error::internal("no key exchange"))?;
        let algorithm = kx.algorithm();
        let cke = parse_all(&msg.body, "client key exchange", |i| ClientKeyExchange::parse(i, algorithm))?;
        kx.process_client_key_exchange(&cke)?;
        self.shared.transcript.add(&msg.raw);

        let pms = kx.generate_pre_master_secret()?;
        let ms = derive_master_secret(provider, &self.shared.params, &self.shared.transcript, pms)?;
        self.shared.params.master_secret = Some(ms);

        let (read, write) = legacy_key_material(provider, &self.shared.params, false)?;
        engine.set_pending_ciphers(read, write);
        self.kx = None;
        Ok(ConnectionState::ClientKeyExchange)
    }

    fn handle_certificate_verify(
        &mut self,
        engine: &mut Engine,
        msg: &HandshakeMessage,
    ) -> Result<ConnectionState, Error> {
        let version = self.shared.params.version()?;
        let signed = parse_all(&msg.body, "certificate verify", |i| {
            DigitallySigned::parse(i, version.is_tls12_or_later())
        })?;
        let leaf = self
            .shared
            .params
            .peer_certificates
            .first()
            .ok_or_else(|| Error::internal("no client certificate"))?;
        verify(engine.config(), version, leaf, self.shared.transcript.bytes(), &signed)?;
        self.shared.transcript.add(&msg.raw);
        Ok(ConnectionState::ClientCertificateVerify)
    }

    fn send_finished(&mut self, engine: &mut Engine) -> Result<(), Error> {
        let verify_data = legacy_verify_data(engine.provider(), &self.shared.params, &self.shared.transcript, false)?;
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
        check_legacy_finished(engine, &mut self.shared, &msg.body, msg.epoch, true)?;
        self.shared.transcript.add(&msg.raw);

        let resumed = self.shared.params.resumed;
        if !resumed {
            engine.begin_flight();
            engine.send_change_cipher_spec()?;
            self.send_finished(engine)?;
            engine.end_flight(false);
        }

        let session_id = self.shared.params.session_id.clone();
        self.shared.finish(engine, !resumed, &session_id)?;

        if !resumed {
            let config = engine.config();
            if let (Some(store), Some(session)) = (config.session_store(), &self.shared.session) {
                debug!("Store session");
                store.put(session.clone());
            }
        }
        Ok(ConnectionState::End)
    }
}

/// Whether `ours` is no newer than the client's highest version.
fn not_newer(ours: ProtocolVersion, client: ProtocolVersion) -> bool {
    if ours.is_dtls() {
        // DTLS version numbers count down.
        client.major() == 0xfe && ours.as_u16() >= client.as_u16()
    } else {
        client.major() == 3 && ours.as_u16() <= client.as_u16()
    }
}

/// First suite in our order that the client offers and we can serve.
fn select_suite(
    config: &Config,
    ch: &ClientHello,
    version: ProtocolVersion,
    key_schemes: &[SignatureScheme],
    client_schemes: Option<&[SignatureScheme]>,
    client_groups: Option<&[NamedGroup]>,
) -> Result<(CipherSuite, Option<NamedGroup>), Error> {
    use KeyExchangeAlgorithm::*;

    // RFC 4492 5.1: no extension means the client takes any curve, use P-256.
    let client_groups = client_groups.unwrap_or(&[NamedGroup::Secp256r1]);
    let group = config
        .named_groups()
        .iter()
        .copied()
        .find(|g| g.is_ecdhe() && client_groups.contains(g));

    for suite in config.cipher_suites().iter().copied() {
        if suite.is_tls13() || !ch.offers(suite) || !suite.is_usable_with(version) {
            continue;
        }
        let Some(algorithm) = suite.key_exchange() else {
            continue;
        };
        let usable = match algorithm {
            EcdheEcdsa => key_schemes.iter().any(|s| s.is_ecdsa()),
            DheRsa => key_schemes.iter().any(|s| s.is_rsa_pkcs1()),
            Psk | DhePsk | EcdhePsk => config.psk_store().is_some(),
            DhAnon | EcdhAnon => true,
            Tls13 => false,
        };
        if !usable {
            continue;
        }
        if algorithm.requires_server_certificate() && choose_scheme(key_schemes, version, client_schemes).is_err() {
            continue;
        }
        if algorithm.is_ecc() && group.is_none() {
            continue;
        }
        debug!("Selected {}", suite);
        return Ok((suite, group.filter(|_| algorithm.is_ecc())));
    }
    Err(Error::handshake_failure("no shared cipher suite"))
}

/// Extensions both hello flavours answer the same way. `out` receives what
/// goes back to the client.
pub(super) fn negotiate_extensions(
    config: &Config,
    ch: &ClientHello,
    params: &mut HandshakeParams,
    out: &mut Extensions,
    resumed: bool,
) -> Result<(), Error> {
    if let Some(mfl) = ch.extensions.max_fragment_length()? {
        if !mfl.is_known() {
            return Err(Error::illegal_parameter(format!("max fragment length {}", mfl)));
        }
        params.max_fragment_length = Some(mfl);
        out.set_max_fragment_length(mfl);
    }

    if let (Some(peer), Some(local)) = (ch.extensions.heartbeat()?, config.heartbeat_mode()) {
        params.heartbeat = Some(peer);
        out.set_heartbeat(local);
    }

    if let Some(offered) = ch.extensions.alpn()? {
        if !config.alpn_protocols().is_empty() {
            let Some(p) = config.alpn_protocols().iter().find(|p| offered.contains(p)) else {
                return Err(Error::Alert {
                    description: AlertDescription::NoApplicationProtocol,
                    reason: "no common application protocol".into(),
                });
            };
            debug!("Selected ALPN {}", String::from_utf8_lossy(p));
            params.alpn_protocol = Some(p.clone());
            out.set_alpn(std::slice::from_ref(p))?;
        }
    }

    if !resumed && ch.extensions.contains(ExtensionType::ServerName) {
        if let Some(name) = ch.extensions.server_name()? {
            debug!("Client asked for {}", name);
        }
        out.set_flag(ExtensionType::ServerName);
    }
    Ok(())
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}
