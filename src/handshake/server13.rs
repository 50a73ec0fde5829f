//! Server side of the TLS 1.3 handshake (RFC 8446), full handshake only.
//!
//! A ClientHello without a key share for any of our groups gets one
//! HelloRetryRequest naming a group the client supports. The server's whole
//! flight goes out in one go after ServerHello, so the client answers with
//! its optional certificate and its Finished.

use super::server::{negotiate_extensions, Server};
use super::{check_peer_chain, choose_scheme, sign, tls13_signed_content, verify};
use super::{ConnectionState, CLIENT_CONTEXT, SERVER_CONTEXT};
use crate::codec::parse_all;
use crate::crypto::key_schedule::{finished_verify_data, KeySchedule};
use crate::crypto::prf::ct_eq;
use crate::crypto::Secret;
use crate::engine::{Engine, HandshakeMessage, Incoming};
use crate::message::random::HELLO_RETRY_REQUEST_RANDOM;
use crate::message::{Certificate, CertificateRequest13, ClientHello, DigitallySigned};
use crate::message::{EncryptedExtensions, Extensions, Finished, KeyShareEntry, Random, ServerHello};
use crate::types::{AlertDescription, CipherSuite, ExtensionType, HandshakeType, NamedGroup};
use crate::types::{ProtocolVersion, SignatureScheme};
use crate::{Config, Error};

impl Server {
    pub(super) fn handle13(&mut self, engine: &mut Engine, incoming: Incoming) -> Result<ConnectionState, Error> {
        use ConnectionState as S;
        use HandshakeType as H;

        let state = self.shared.state;
        let msg = match incoming {
            Incoming::ChangeCipherSpec => {
                self.shared.compat_change_cipher_spec()?;
                return Ok(state);
            }
            Incoming::Handshake(m) => m,
        };
        trace!("Received {} in {}", msg.msg_type, state);

        let authenticated = !self.shared.params.peer_certificates.is_empty();
        match (state, msg.msg_type) {
            (S::ServerHelloRetryRequest, H::ClientHello) => {
                let ch = parse_all(&msg.body, "client hello", |i| ClientHello::parse(i, false))?;
                let versions = ch.extensions.supported_versions()?.unwrap_or_default();
                if !versions.contains(&ProtocolVersion::Tls1_3) {
                    return Err(Error::illegal_parameter("TLS 1.3 dropped after hello retry request"));
                }
                self.handle_client_hello13(engine, ch, &msg.raw)
            }
            (S::ServerFinished, H::Certificate) if self.cert_requested => self.handle_certificate13(engine, &msg),
            (S::ServerFinished, H::Finished) if !self.cert_requested => self.handle_finished13(engine, &msg),
            (S::ClientCertificate, H::CertificateVerify) if authenticated => {
                self.handle_certificate_verify13(engine, &msg)
            }
            (S::ClientCertificate, H::Finished) if !authenticated => self.handle_finished13(engine, &msg),
            (S::ClientCertificateVerify, H::Finished) => self.handle_finished13(engine, &msg),
            (s, t) => Err(Error::unexpected(format!("{} in state {}", t, s))),
        }
    }

    pub(super) fn handle_client_hello13(
        &mut self,
        engine: &mut Engine,
        ch: ClientHello,
        raw: &[u8],
    ) -> Result<ConnectionState, Error> {
        let config = engine.config_handle();
        let provider = config.crypto_provider();

        let suite = match self.hrr_suite {
            Some(s) if ch.offers(s) => s,
            Some(s) => return Err(Error::illegal_parameter(format!("{} withdrawn after hello retry request", s))),
            None => config
                .cipher_suites()
                .iter()
                .copied()
                .find(|s| s.is_tls13() && ch.offers(*s))
                .ok_or_else(|| Error::handshake_failure("no shared TLS 1.3 suite"))?,
        };
        if ch.compression_methods != [0] {
            return Err(Error::illegal_parameter("TLS 1.3 hello with compression"));
        }

        let client_schemes = ch
            .extensions
            .signature_algorithms()?
            .ok_or_else(|| Error::missing_extension("no signature_algorithms"))?;
        let shares = ch
            .extensions
            .key_shares()?
            .ok_or_else(|| Error::missing_extension("no key_share"))?;
        let client_groups = ch
            .extensions
            .supported_groups()?
            .ok_or_else(|| Error::missing_extension("no supported_groups"))?;

        let ours = self.shared.key_schemes(&config);
        let scheme = choose_scheme(ours, ProtocolVersion::Tls1_3, Some(&client_schemes))?;

        let share = config
            .named_groups()
            .iter()
            .filter(|g| g.is_ecdhe())
            .find_map(|g| shares.iter().find(|s| s.group == *g));

        let Some(share) = share else {
            if self.hrr_group.is_some() {
                return Err(Error::illegal_parameter("no key share after hello retry request"));
            }
            let group = config
                .named_groups()
                .iter()
                .copied()
                .find(|g| g.is_ecdhe() && client_groups.contains(g))
                .ok_or_else(|| Error::handshake_failure("no shared group"))?;
            return self.send_hello_retry_request(engine, &ch, raw, suite, group);
        };
        if self.hrr_group.is_some_and(|g| g != share.group) {
            return Err(Error::illegal_parameter(format!("key share for {} after hello retry request", share.group)));
        }

        let active = provider
            .kx_group(share.group)
            .ok_or_else(|| Error::internal(format!("provider lacks {}", share.group)))?
            .start_exchange()
            .map_err(Error::internal)?;
        let server_share = KeyShareEntry {
            group: share.group,
            key_exchange: active.pub_key().to_vec(),
        };
        let shared_secret = Secret::new(
            active
                .complete(&share.key_exchange)
                .map_err(|e| Error::illegal_parameter(format!("key share: {e}")))?,
        );
        debug!("TLS 1.3 with {} over {}", suite, share.group);

        let random = Random::new(engine.now(), provider)?;
        let params = &mut self.shared.params;
        params.version = Some(ProtocolVersion::Tls1_3);
        params.cipher_suite = Some(suite);
        params.client_random = Some(ch.random);
        params.server_random = Some(random);
        params.session_id = ch.session_id.clone();
        params.extended_master_secret = false;
        self.shared.transcript.add(raw);

        let mut extensions = Extensions::new();
        extensions.set_selected_version(ProtocolVersion::Tls1_3);
        extensions.set_key_share(&server_share)?;
        let sh = ServerHello {
            server_version: ProtocolVersion::Tls1_2,
            random,
            session_id: ch.session_id.clone(),
            cipher_suite: suite,
            compression_method: 0,
            extensions,
        };
        let mut body = Vec::new();
        sh.serialize(&mut body)?;
        let raw = engine.send_handshake(HandshakeType::ServerHello, body)?;
        self.shared.transcript.add(&raw);
        if !self.ccs_sent && !ch.session_id.is_empty() {
            engine.send_compat_change_cipher_spec()?;
            self.ccs_sent = true;
        }
        engine.set_tls13();
        engine.set_version(ProtocolVersion::Tls1_3);
        self.tls13 = true;

        let hash = suite.hash();
        let th = self.shared.transcript.hash(provider, hash)?;
        let mut schedule = KeySchedule::new(provider, hash)?;
        let (c_hs, s_hs) = schedule.handshake_secrets(provider, shared_secret.expose()?, &th)?;
        engine.install_tls13_write(suite, &s_hs)?;
        engine.install_tls13_read(suite, &c_hs)?;

        let mut ee = EncryptedExtensions::default();
        negotiate_extensions(&config, &ch, &mut self.shared.params, &mut ee.extensions, false)?;
        let mut body = Vec::new();
        ee.serialize(&mut body)?;
        let raw = engine.send_handshake(HandshakeType::EncryptedExtensions, body)?;
        self.shared.transcript.add(&raw);
        if let Some(limit) = self.shared.params.max_fragment_length.and_then(|m| m.limit()) {
            engine.set_plaintext_limit(limit);
        }

        if config.require_client_certificate() || config.cert_verifier().is_some() {
            let mut extensions = Extensions::new();
            extensions.set_signature_algorithms(&tls13_schemes(&config))?;
            let cr = CertificateRequest13 {
                context: Vec::new(),
                extensions,
            };
            let mut body = Vec::new();
            cr.serialize(&mut body)?;
            let raw = engine.send_handshake(HandshakeType::CertificateRequest, body)?;
            self.shared.transcript.add(&raw);
            self.cert_requested = true;
        }

        let chain = config.certificate_chain().to_vec();
        let mut body = Vec::new();
        Certificate::new(&chain, true).serialize(&mut body)?;
        let raw = engine.send_handshake(HandshakeType::Certificate, body)?;
        self.shared.transcript.add(&raw);
        self.shared.params.local_certificates = chain;

        let th = self.shared.transcript.hash(provider, hash)?;
        let content = tls13_signed_content(SERVER_CONTEXT, &th);
        let key = self.shared.signing_key(&config)?;
        let signed = sign(key, scheme, ProtocolVersion::Tls1_3, &content)?;
        let mut body = Vec::new();
        signed.serialize(&mut body)?;
        let raw = engine.send_handshake(HandshakeType::CertificateVerify, body)?;
        self.shared.transcript.add(&raw);

        let th = self.shared.transcript.hash(provider, hash)?;
        let verify_data = finished_verify_data(provider, hash, &s_hs, &th)?;
        let mut body = Vec::new();
        Finished {
            verify_data: verify_data.clone(),
        }
        .serialize(&mut body);
        let raw = engine.send_handshake(HandshakeType::Finished, body)?;
        self.shared.transcript.add(&raw);
        self.shared.params.local_verify_data = Some(verify_data);

        let th = self.shared.transcript.hash(provider, hash)?;
        let (c_ap, s_ap) = schedule.application_secrets(provider, &th)?;
        engine.install_tls13_write(suite, &s_ap)?;

        self.schedule = Some(schedule);
        self.hs_secrets = Some((c_hs, s_hs));
        self.app_secrets = Some((c_ap, s_ap));
        Ok(ConnectionState::ServerFinished)
    }

    fn send_hello_retry_request(
        &mut self,
        engine: &mut Engine,
        ch: &ClientHello,
        raw: &[u8],
        suite: CipherSuite,
        group: NamedGroup,
    ) -> Result<ConnectionState, Error> {
        debug!("Send HelloRetryRequest for {}", group);
        self.shared.transcript.add(raw);
        self.shared
            .transcript
            .replace_with_message_hash(engine.provider(), suite.hash())?;

        let mut extensions = Extensions::new();
        extensions.set_selected_version(ProtocolVersion::Tls1_3);
        extensions.set_selected_group(group);
        let hrr = ServerHello {
            server_version: ProtocolVersion::Tls1_2,
            random: Random(HELLO_RETRY_REQUEST_RANDOM),
            session_id: ch.session_id.clone(),
            cipher_suite: suite,
            compression_method: 0,
            extensions,
        };
        let mut body = Vec::new();
        hrr.serialize(&mut body)?;
        let raw = engine.send_handshake(HandshakeType::ServerHello, body)?;
        self.shared.transcript.add(&raw);
        if !ch.session_id.is_empty() {
            engine.send_compat_change_cipher_spec()?;
            self.ccs_sent = true;
        }

        engine.set_tls13();
        self.tls13 = true;
        self.hrr_suite = Some(suite);
        self.hrr_group = Some(group);
        Ok(ConnectionState::ServerHelloRetryRequest)
    }

    fn handle_certificate13(&mut self, engine: &mut Engine, msg: &HandshakeMessage) -> Result<ConnectionState, Error> {
        let cert = parse_all(&msg.body, "certificate", |i| Certificate::parse(i, true))?;
        if cert.context.as_ref().is_some_and(|c| !c.is_empty()) {
            return Err(Error::illegal_parameter("certificate request context mismatch"));
        }
        let chain = cert.chain();
        if chain.is_empty() {
            if engine.config().require_client_certificate() {
                return Err(Error::Alert {
                    description: AlertDescription::CertificateRequired,
                    reason: "client sent no certificate".into(),
                });
            }
            debug!("Client sent no certificate");
        } else {
            check_peer_chain(engine, &chain)?;
        }
        self.shared.params.peer_certificates = chain;
        self.shared.transcript.add(&msg.raw);
        Ok(ConnectionState::ClientCertificate)
    }

    fn handle_certificate_verify13(
        &mut self,
        engine: &mut Engine,
        msg: &HandshakeMessage,
    ) -> Result<ConnectionState, Error> {
        let signed = parse_all(&msg.body, "certificate verify", |i| DigitallySigned::parse(i, true))?;
        let suite = self.shared.params.cipher_suite()?;
        let th = self.shared.transcript.hash(engine.provider(), suite.hash())?;
        let content = tls13_signed_content(CLIENT_CONTEXT, &th);
        let leaf = self
            .shared
            .params
            .peer_certificates
            .first()
            .ok_or_else(|| Error::internal("no client certificate"))?;
        verify(engine.config(), ProtocolVersion::Tls1_3, leaf, &content, &signed)?;
        self.shared.transcript.add(&msg.raw);
        Ok(ConnectionState::ClientCertificateVerify)
    }

    fn handle_finished13(&mut self, engine: &mut Engine, msg: &HandshakeMessage) -> Result<ConnectionState, Error> {
        let config = engine.config_handle();
        let provider = config.crypto_provider();
        let suite = self.shared.params.cipher_suite()?;
        let hash = suite.hash();
        let (Some((c_hs, s_hs)), Some(schedule)) = (self.hs_secrets.as_mut(), self.schedule.as_mut()) else {
            return Err(Error::internal("no handshake secrets"));
        };
        let (c_ap, s_ap) = self
            .app_secrets
            .take()
            .ok_or_else(|| Error::internal("no application secrets"))?;

        let th = self.shared.transcript.hash(provider, hash)?;
        let expected = finished_verify_data(provider, hash, c_hs, &th)?;
        let finished = Finished::decode(&msg.body, hash.output_len())?;
        if !ct_eq(&expected, &finished.verify_data) {
            return Err(Error::decrypt_error("client finished mismatch"));
        }
        self.shared.transcript.add(&msg.raw);

        engine.install_tls13_read(suite, &c_ap)?;
        engine.set_traffic_secrets(suite, s_ap, c_ap);

        let params = &mut self.shared.params;
        params.peer_verify_data = Some(finished.verify_data);
        params.master_secret = Some(schedule.stage_secret().clone());

        schedule.destroy();
        c_hs.destroy();
        s_hs.destroy();
        self.schedule = None;
        self.hs_secrets = None;

        self.shared.finish(engine, false, &[])?;
        Ok(ConnectionState::End)
    }
}

/// Our schemes that TLS 1.3 permits.
fn tls13_schemes(config: &Config) -> Vec<SignatureScheme> {
    config
        .signature_schemes()
        .iter()
        .copied()
        .filter(|s| s.is_allowed_in_tls13())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::client::test_engine;
    use crate::message::encode_tls;

    fn record(msg_type: HandshakeType, body: &[u8]) -> Vec<u8> {
        let handshake = encode_tls(msg_type, body).unwrap();
        let mut out = vec![22, 3, 3];
        out.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
        out.extend_from_slice(&handshake);
        out
    }

    fn hello(shares: &[NamedGroup]) -> ClientHello {
        let mut ch = ClientHello::new(
            ProtocolVersion::Tls1_2,
            Random([9; 32]),
            vec![CipherSuite::TLS_AES_128_GCM_SHA256],
        );
        ch.extensions
            .set_supported_versions(&[ProtocolVersion::Tls1_3])
            .unwrap();
        ch.extensions
            .set_signature_algorithms(&[SignatureScheme::EcdsaSecp256r1Sha256])
            .unwrap();
        ch.extensions
            .set_supported_groups(&[NamedGroup::X25519, NamedGroup::Secp256r1])
            .unwrap();
        let entries: Vec<_> = shares
            .iter()
            .map(|g| KeyShareEntry {
                group: *g,
                key_exchange: vec![4; 65],
            })
            .collect();
        ch.extensions.set_key_shares(&entries).unwrap();
        ch
    }

    fn server_config() -> Config {
        let cert = crate::certificate::generate_self_signed_certificate().unwrap();
        Config::builder()
            .certificate(cert.certificate, cert.private_key)
            .build()
            .unwrap()
    }

    #[test]
    fn missing_share_triggers_hello_retry() {
        let mut engine = test_engine(server_config());
        let mut server = Server::new();

        let mut body = Vec::new();
        hello(&[]).serialize(&mut body).unwrap();
        engine
            .push_input(&record(HandshakeType::ClientHello, &body), std::time::Instant::now())
            .unwrap();
        server.make_progress(&mut engine).unwrap();

        assert_eq!(server.shared.state, ConnectionState::ServerHelloRetryRequest);
        assert_eq!(server.hrr_group, Some(NamedGroup::X25519));
        assert!(server.tls13);
    }

    #[test]
    fn second_hello_without_share_is_illegal() {
        let mut engine = test_engine(server_config());
        let mut server = Server::new();

        let now = std::time::Instant::now();
        let mut body = Vec::new();
        hello(&[]).serialize(&mut body).unwrap();
        engine.push_input(&record(HandshakeType::ClientHello, &body), now).unwrap();
        server.make_progress(&mut engine).unwrap();

        engine.push_input(&record(HandshakeType::ClientHello, &body), now).unwrap();
        let err = server.make_progress(&mut engine).unwrap_err();
        assert_eq!(err.alert(), Some(AlertDescription::IllegalParameter));
    }

    #[test]
    fn scheme_filter_drops_legacy_hashes() {
        let config = Config::builder()
            .signature_schemes([SignatureScheme::EcdsaSha1, SignatureScheme::EcdsaSecp256r1Sha256])
            .build()
            .unwrap();
        assert_eq!(tls13_schemes(&config), vec![SignatureScheme::EcdsaSecp256r1Sha256]);
    }
}
