//! Client side of the TLS 1.3 handshake (RFC 8446), full handshake only.
//!
//! ```text
//! ClientHello + key_share     -------->
//!                             <--------   HelloRetryRequest
//! ClientHello + key_share     -------->
//!                                               ServerHello
//!                                     {EncryptedExtensions}
//!                                     {CertificateRequest*}
//!                                            {Certificate}
//!                                      {CertificateVerify}
//!                             <--------          {Finished}
//! {Certificate*}
//! {CertificateVerify*}
//! {Finished}                  -------->
//! ```

use super::client::{accept_server_extensions, Client};
use super::{check_peer_chain, choose_scheme, sign, tls13_signed_content, verify};
use super::{ConnectionState, CLIENT_CONTEXT, SERVER_CONTEXT};
use crate::codec::parse_all;
use crate::crypto::key_schedule::{finished_verify_data, KeySchedule};
use crate::crypto::prf::ct_eq;
use crate::crypto::Secret;
use crate::engine::{Engine, HandshakeMessage, Incoming};
use crate::message::{Certificate, CertificateRequest13, DigitallySigned, EncryptedExtensions};
use crate::message::{Finished, KeyShareEntry, ServerHello};
use crate::types::{ExtensionType, HandshakeType, ProtocolVersion};
use crate::Error;

impl Client {
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

        match (state, msg.msg_type) {
            (S::ClientHelloRetry, H::ServerHello) => {
                let sh = parse_all(&msg.body, "server hello", ServerHello::parse)?;
                if sh.is_hello_retry_request() {
                    return Err(Error::unexpected("second hello retry request"));
                }
                if !sh.negotiated_version()?.is_tls13() {
                    return Err(Error::illegal_parameter("TLS 1.3 abandoned after hello retry request"));
                }
                self.handle_server_hello13(engine, sh, &msg.raw)
            }
            (S::ServerHello, H::EncryptedExtensions) => self.handle_encrypted_extensions(engine, &msg),
            (S::ServerEncryptedExtensions, H::CertificateRequest) => self.handle_certificate_request13(&msg),
            (S::ServerEncryptedExtensions | S::ServerCertificateRequest, H::Certificate) => {
                self.handle_certificate13(engine, &msg)
            }
            (S::ServerCertificate, H::CertificateVerify) => self.handle_certificate_verify13(engine, &msg),
            (S::ServerCertificateVerify, H::Finished) => self.handle_finished13(engine, &msg),
            (s, t) => Err(Error::unexpected(format!("{} in state {}", t, s))),
        }
    }

    pub(super) fn handle_hello_retry_request(
        &mut self,
        engine: &mut Engine,
        hrr: ServerHello,
        raw: &[u8],
    ) -> Result<ConnectionState, Error> {
        let config = engine.config_handle();
        let provider = config.crypto_provider();

        if !hrr.negotiated_version()?.is_tls13() {
            return Err(Error::illegal_parameter("hello retry request without TLS 1.3"));
        }
        let ch = self
            .hello
            .as_mut()
            .ok_or_else(|| Error::internal("no client hello sent"))?;
        let suite = hrr.cipher_suite;
        if !ch.offers(suite) || !suite.is_tls13() {
            return Err(Error::illegal_parameter(format!("hello retry request selected {}", suite)));
        }
        if hrr.session_id != ch.session_id {
            return Err(Error::illegal_parameter("session id not echoed"));
        }
        for e in hrr.extensions.iter() {
            match e.extension_type {
                ExtensionType::SupportedVersions | ExtensionType::KeyShare | ExtensionType::Cookie => {}
                t => return Err(Error::unsupported_extension(format!("{} in hello retry request", t))),
            }
        }

        let group = hrr.extensions.selected_group()?;
        let cookie = hrr.extensions.cookie()?;
        if group.is_none() && cookie.is_none() {
            return Err(Error::illegal_parameter("hello retry request changes nothing"));
        }

        self.shared.transcript.replace_with_message_hash(provider, suite.hash())?;
        self.shared.transcript.add(raw);

        if let Some(group) = group {
            let current = self.key_share.as_ref().map(|k| k.group());
            if !group.is_ecdhe() || !config.named_groups().contains(&group) || current == Some(group) {
                return Err(Error::illegal_parameter(format!("hello retry request for group {}", group)));
            }
            debug!("Server asks for a {} key share", group);
            let active = provider
                .kx_group(group)
                .ok_or_else(|| Error::internal(format!("provider lacks {}", group)))?
                .start_exchange()
                .map_err(Error::internal)?;
            ch.extensions.set_key_shares(&[KeyShareEntry {
                group,
                key_exchange: active.pub_key().to_vec(),
            }])?;
            self.key_share = Some(active);
        }
        if let Some(cookie) = cookie {
            ch.extensions.set_cookie(&cookie)?;
        }

        engine.set_tls13();
        let mut body = Vec::new();
        ch.serialize(&mut body)?;
        let raw = engine.send_handshake(HandshakeType::ClientHello, body)?;
        self.shared.transcript.add(&raw);

        self.hrr_suite = Some(suite);
        self.tls13 = true;
        Ok(ConnectionState::ClientHelloRetry)
    }

    pub(super) fn handle_server_hello13(
        &mut self,
        engine: &mut Engine,
        sh: ServerHello,
        raw: &[u8],
    ) -> Result<ConnectionState, Error> {
        let config = engine.config_handle();
        let provider = config.crypto_provider();
        let ch = self
            .hello
            .as_ref()
            .ok_or_else(|| Error::internal("no client hello sent"))?;

        if sh.session_id != ch.session_id {
            return Err(Error::illegal_parameter("session id not echoed"));
        }
        let suite = sh.cipher_suite;
        if !ch.offers(suite) || !suite.is_tls13() {
            return Err(Error::illegal_parameter(format!("server selected {} for TLS 1.3", suite)));
        }
        if self.hrr_suite.is_some_and(|s| s != suite) {
            return Err(Error::illegal_parameter("suite changed after hello retry request"));
        }
        if sh.compression_method != 0 {
            return Err(Error::illegal_parameter("compression selected"));
        }
        for e in sh.extensions.iter() {
            match e.extension_type {
                ExtensionType::SupportedVersions | ExtensionType::KeyShare => {}
                t => return Err(Error::illegal_parameter(format!("{} in TLS 1.3 server hello", t))),
            }
        }

        let share = sh
            .extensions
            .key_share()?
            .ok_or_else(|| Error::missing_extension("no key share in server hello"))?;
        let active = self
            .key_share
            .take()
            .ok_or_else(|| Error::internal("no key share sent"))?;
        if share.group != active.group() {
            return Err(Error::illegal_parameter(format!("key share for {} not offered", share.group)));
        }
        let shared_secret = Secret::new(
            active
                .complete(&share.key_exchange)
                .map_err(|e| Error::illegal_parameter(format!("key share: {e}")))?,
        );

        self.shared.transcript.add(raw);
        engine.set_tls13();
        engine.set_version(ProtocolVersion::Tls1_3);

        let params = &mut self.shared.params;
        params.version = Some(ProtocolVersion::Tls1_3);
        params.cipher_suite = Some(suite);
        params.server_random = Some(sh.random);
        params.extended_master_secret = false;
        // A TLS 1.3 handshake never resumes a legacy session.
        self.shared.session = None;

        let hash = suite.hash();
        let th = self.shared.transcript.hash(provider, hash)?;
        let mut schedule = KeySchedule::new(provider, hash)?;
        let (c_hs, s_hs) = schedule.handshake_secrets(provider, shared_secret.expose()?, &th)?;
        engine.install_tls13_read(suite, &s_hs)?;
        engine.install_tls13_write(suite, &c_hs)?;

        self.schedule = Some(schedule);
        self.hs_secrets = Some((c_hs, s_hs));
        self.tls13 = true;
        Ok(ConnectionState::ServerHello)
    }

    fn handle_encrypted_extensions(
        &mut self,
        engine: &mut Engine,
        msg: &HandshakeMessage,
    ) -> Result<ConnectionState, Error> {
        let config = engine.config_handle();
        let ee = parse_all(&msg.body, "encrypted extensions", EncryptedExtensions::parse)?;
        let ch = self
            .hello
            .as_ref()
            .ok_or_else(|| Error::internal("no client hello sent"))?;

        for e in ee.extensions.iter() {
            let t = e.extension_type;
            let allowed = matches!(
                t,
                ExtensionType::ServerName
                    | ExtensionType::MaxFragmentLength
                    | ExtensionType::SupportedGroups
                    | ExtensionType::Heartbeat
                    | ExtensionType::ApplicationLayerProtocolNegotiation
            );
            if !allowed {
                return Err(Error::illegal_parameter(format!("{} in encrypted extensions", t)));
            }
            if !ch.extensions.contains(t) {
                return Err(Error::unsupported_extension(format!("unsolicited {}", t)));
            }
        }

        let params = &mut self.shared.params;
        accept_server_extensions(&config, params, &ee.extensions)?;
        if let Some(limit) = params.max_fragment_length.and_then(|m| m.limit()) {
            engine.set_plaintext_limit(limit);
        }
        self.shared.transcript.add(&msg.raw);
        Ok(ConnectionState::ServerEncryptedExtensions)
    }

    fn handle_certificate_request13(&mut self, msg: &HandshakeMessage) -> Result<ConnectionState, Error> {
        let cr = parse_all(&msg.body, "certificate request", CertificateRequest13::parse)?;
        if !cr.extensions.contains(ExtensionType::SignatureAlgorithms) {
            return Err(Error::missing_extension("certificate request without signature_algorithms"));
        }
        debug!("Server requests a certificate");
        self.shared.transcript.add(&msg.raw);
        self.cert_request13 = Some(cr);
        Ok(ConnectionState::ServerCertificateRequest)
    }

    fn handle_certificate13(&mut self, engine: &mut Engine, msg: &HandshakeMessage) -> Result<ConnectionState, Error> {
        let cert = parse_all(&msg.body, "certificate", |i| Certificate::parse(i, true))?;
        if cert.context.as_ref().is_some_and(|c| !c.is_empty()) {
            return Err(Error::illegal_parameter("server certificate with request context"));
        }
        if cert.is_empty() {
            return Err(Error::bad_certificate("server sent no certificate"));
        }
        let chain = cert.chain();
        check_peer_chain(engine, &chain)?;
        self.shared.params.peer_certificates = chain;
        self.shared.transcript.add(&msg.raw);
        Ok(ConnectionState::ServerCertificate)
    }

    fn handle_certificate_verify13(
        &mut self,
        engine: &mut Engine,
        msg: &HandshakeMessage,
    ) -> Result<ConnectionState, Error> {
        let signed = parse_all(&msg.body, "certificate verify", |i| DigitallySigned::parse(i, true))?;
        let suite = self.shared.params.cipher_suite()?;
        let th = self.shared.transcript.hash(engine.provider(), suite.hash())?;
        let content = tls13_signed_content(SERVER_CONTEXT, &th);
        let leaf = self
            .shared
            .params
            .peer_certificates
            .first()
            .ok_or_else(|| Error::internal("no server certificate"))?;
        verify(engine.config(), ProtocolVersion::Tls1_3, leaf, &content, &signed)?;
        self.shared.transcript.add(&msg.raw);
        Ok(ConnectionState::ServerCertificateVerify)
    }

    fn handle_finished13(&mut self, engine: &mut Engine, msg: &HandshakeMessage) -> Result<ConnectionState, Error> {
        let config = engine.config_handle();
        let provider = config.crypto_provider();
        let suite = self.shared.params.cipher_suite()?;
        let hash = suite.hash();
        let (Some((c_hs, s_hs)), Some(schedule)) = (self.hs_secrets.as_mut(), self.schedule.as_mut()) else {
            return Err(Error::internal("no handshake secrets"));
        };

        let th = self.shared.transcript.hash(provider, hash)?;
        let expected = finished_verify_data(provider, hash, s_hs, &th)?;
        let finished = Finished::decode(&msg.body, hash.output_len())?;
        if !ct_eq(&expected, &finished.verify_data) {
            return Err(Error::decrypt_error("server finished mismatch"));
        }
        self.shared.transcript.add(&msg.raw);

        let th = self.shared.transcript.hash(provider, hash)?;
        let (c_ap, s_ap) = schedule.application_secrets(provider, &th)?;
        engine.install_tls13_read(suite, &s_ap)?;

        if let Some(cr) = self.cert_request13.take() {
            let peer_schemes = cr.extensions.signature_algorithms()?;
            let mut scheme = None;
            if !config.certificate_chain().is_empty() && config.private_key().is_some() {
                let ours = self.shared.key_schemes(&config);
                match choose_scheme(ours, ProtocolVersion::Tls1_3, peer_schemes.as_deref()) {
                    Ok(s) => scheme = Some(s),
                    Err(e) => debug!("Send empty certificate: {}", e),
                }
            }
            let chain = match scheme {
                Some(_) => config.certificate_chain().to_vec(),
                None => Vec::new(),
            };
            let mut cert = Certificate::new(&chain, true);
            cert.context = Some(cr.context);
            let mut body = Vec::new();
            cert.serialize(&mut body)?;
            let raw = engine.send_handshake(HandshakeType::Certificate, body)?;
            self.shared.transcript.add(&raw);

            if let Some(scheme) = scheme {
                let th = self.shared.transcript.hash(provider, hash)?;
                let content = tls13_signed_content(CLIENT_CONTEXT, &th);
                let key = self.shared.signing_key(&config)?;
                let signed = sign(key, scheme, ProtocolVersion::Tls1_3, &content)?;
                let mut body = Vec::new();
                signed.serialize(&mut body)?;
                let raw = engine.send_handshake(HandshakeType::CertificateVerify, body)?;
                self.shared.transcript.add(&raw);
            }
            self.shared.params.local_certificates = chain;
        }

        let th = self.shared.transcript.hash(provider, hash)?;
        let verify_data = finished_verify_data(provider, hash, c_hs, &th)?;
        let mut body = Vec::new();
        Finished {
            verify_data: verify_data.clone(),
        }
        .serialize(&mut body);
        let raw = engine.send_handshake(HandshakeType::Finished, body)?;
        self.shared.transcript.add(&raw);

        engine.install_tls13_write(suite, &c_ap)?;
        engine.set_traffic_secrets(suite, c_ap, s_ap);

        let params = &mut self.shared.params;
        params.local_verify_data = Some(verify_data);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::client::test_engine;
    use crate::message::{encode_tls, Random};
    use crate::message::random::HELLO_RETRY_REQUEST_RANDOM;
    use crate::types::{AlertDescription, CipherSuite, NamedGroup};
    use crate::Config;

    fn record(msg_type: HandshakeType, body: &[u8]) -> Vec<u8> {
        let raw = encode_tls(msg_type, body).unwrap();
        let mut out = vec![22, 3, 3];
        out.extend_from_slice(&(raw.len() as u16).to_be_bytes());
        out.extend_from_slice(&raw);
        out
    }

    fn started(groups: &[NamedGroup]) -> (Client, Engine) {
        let config = Config::builder()
            .versions(ProtocolVersion::Tls1_3, ProtocolVersion::Tls1_3)
            .named_groups(groups.iter().copied())
            .build()
            .unwrap();
        let mut engine = test_engine(config);
        let mut client = Client::new(None);
        client.make_progress(&mut engine).unwrap();
        (client, engine)
    }

    fn hello_retry(client: &Client, group: NamedGroup) -> ServerHello {
        let ch = client.hello.as_ref().unwrap();
        let mut hrr = ServerHello {
            server_version: ProtocolVersion::Tls1_2,
            random: Random(HELLO_RETRY_REQUEST_RANDOM),
            session_id: ch.session_id.clone(),
            cipher_suite: CipherSuite::TLS_AES_128_GCM_SHA256,
            compression_method: 0,
            extensions: Default::default(),
        };
        hrr.extensions.set_selected_version(ProtocolVersion::Tls1_3);
        hrr.extensions.set_selected_group(group);
        hrr
    }

    #[test]
    fn hello_retry_request_resends_with_new_group() {
        let (mut client, mut engine) = started(&[NamedGroup::X25519, NamedGroup::Secp256r1]);
        let mut body = Vec::new();
        hello_retry(&client, NamedGroup::Secp256r1).serialize(&mut body).unwrap();
        engine
            .push_input(&record(HandshakeType::ServerHello, &body), std::time::Instant::now())
            .unwrap();
        client.make_progress(&mut engine).unwrap();

        assert_eq!(client.shared.state, ConnectionState::ClientHelloRetry);
        let shares = client.hello.as_ref().unwrap().extensions.key_shares().unwrap().unwrap();
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].group, NamedGroup::Secp256r1);
        // message_hash of the first ClientHello, the retry request, the second ClientHello
        assert_eq!(client.shared.transcript.bytes()[0], HandshakeType::MessageHash.value());
    }

    #[test]
    fn hello_retry_for_group_already_sent_is_illegal() {
        let (mut client, mut engine) = started(&[NamedGroup::X25519, NamedGroup::Secp256r1]);
        let mut body = Vec::new();
        hello_retry(&client, NamedGroup::X25519).serialize(&mut body).unwrap();
        engine
            .push_input(&record(HandshakeType::ServerHello, &body), std::time::Instant::now())
            .unwrap();
        let err = client.make_progress(&mut engine).unwrap_err();
        assert_eq!(err.alert(), Some(AlertDescription::IllegalParameter));
    }
}
