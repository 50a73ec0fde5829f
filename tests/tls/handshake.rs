//! Full TLS 1.0 to 1.2 handshakes across the key exchange families.

use std::time::Instant;

use tlsproto::{AlertDescription, CipherSuite, Config, Connection, Error, ProtocolVersion};

use crate::common::*;

fn assert_agree(client: &Connection, server: &Connection) {
    let c = client.security_parameters().expect("client parameters");
    let s = server.security_parameters().expect("server parameters");
    assert_eq!(c.version(), s.version());
    assert_eq!(c.cipher_suite(), s.cipher_suite());
    assert_eq!(c.client_random(), s.client_random());
    assert_eq!(c.server_random(), s.server_random());
    assert!(c.master_secret() == s.master_secret(), "master secrets differ");
    assert_eq!(c.local_verify_data(), s.peer_verify_data());
    assert_eq!(s.local_verify_data(), c.peer_verify_data());
}

fn exchange_data(client: &mut Connection, server: &mut Connection, now: Instant) {
    let got = transfer(client, server, b"hello server", now);
    assert_eq!(got, b"hello server");
    let got = transfer(server, client, b"hello client", now);
    assert_eq!(got, b"hello client");
}

#[test]
fn tls12_ecdhe_ecdsa() {
    init_log();
    let now = Instant::now();
    let c = cert();
    let server_config = std::sync::Arc::new(
        builder(ProtocolVersion::Tls1_2)
            .certificate(c.certificate.clone(), c.private_key)
            .build()
            .unwrap(),
    );
    let client_config = client_config(builder(ProtocolVersion::Tls1_2));

    let mut client = Connection::client(client_config, now);
    let mut server = Connection::server(server_config, now);
    let ex = connect(&mut client, &mut server, now);

    assert_eq!(ex.client.peer_cert.as_deref(), Some(&c.certificate[..]));
    assert_eq!(client.peer_certificates(), &[c.certificate]);
    assert!(server.peer_certificates().is_empty());

    let sp = client.security_parameters().unwrap();
    assert_eq!(sp.version(), ProtocolVersion::Tls1_2);
    assert_eq!(sp.cipher_suite(), CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256);
    assert!(sp.extended_master_secret());
    assert!(!sp.is_resumed());
    assert_agree(&client, &server);
    exchange_data(&mut client, &mut server, now);
}

#[test]
fn tls10_and_tls11_cbc() {
    init_log();
    for version in [ProtocolVersion::Tls1_0, ProtocolVersion::Tls1_1] {
        let now = Instant::now();
        let suites = [CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA];
        let server_config = server_config(builder(version).cipher_suites(suites));
        let client_config = client_config(builder(version).cipher_suites(suites));

        let mut client = Connection::client(client_config, now);
        let mut server = Connection::server(server_config, now);
        connect(&mut client, &mut server, now);

        assert_eq!(client.security_parameters().unwrap().version(), version);
        assert_agree(&client, &server);
        exchange_data(&mut client, &mut server, now);
    }
}

#[test]
fn tls10_record_splitting_keeps_the_data_intact() {
    init_log();
    let now = Instant::now();
    let suites = [CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA];
    let server_config = server_config(builder(ProtocolVersion::Tls1_0).cipher_suites(suites));
    let client_config = client_config(builder(ProtocolVersion::Tls1_0).cipher_suites(suites));

    let mut client = Connection::client(client_config, now);
    let mut server = Connection::server(server_config, now);
    connect(&mut client, &mut server, now);

    client.send_application_data(b"split me").unwrap();
    let out = drain_outputs(&mut client);
    let bytes = out.packets.concat();
    let records: Vec<_> = parse_records(&bytes)
        .into_iter()
        .filter(|r| r.ctype == APPLICATION_DATA)
        .collect();
    assert_eq!(records.len(), 2, "1/n-1 split writes two records");

    deliver(&out.packets, &mut server, now).unwrap();
    assert_eq!(drain_outputs(&mut server).app_bytes(), b"split me");
}

#[test]
fn anonymous_key_exchanges() {
    init_log();
    for suite in [
        CipherSuite::TLS_DH_anon_WITH_AES_128_GCM_SHA256,
        CipherSuite::TLS_ECDH_anon_WITH_AES_128_CBC_SHA,
    ] {
        let now = Instant::now();
        let config = || client_config(builder(ProtocolVersion::Tls1_2).cipher_suites([suite]));

        let mut client = Connection::client(config(), now);
        let mut server = Connection::server(config(), now);
        let ex = connect(&mut client, &mut server, now);

        assert!(ex.client.peer_cert.is_none());
        assert_eq!(client.security_parameters().unwrap().cipher_suite(), suite);
        assert_agree(&client, &server);
        exchange_data(&mut client, &mut server, now);
    }
}

#[test]
fn psk_key_exchanges() {
    init_log();
    for suite in [
        CipherSuite::TLS_PSK_WITH_AES_128_GCM_SHA256,
        CipherSuite::TLS_DHE_PSK_WITH_AES_128_GCM_SHA256,
        CipherSuite::TLS_ECDHE_PSK_WITH_AES_128_CBC_SHA,
    ] {
        let now = Instant::now();
        let client_config = client_config(
            builder(ProtocolVersion::Tls1_2)
                .cipher_suites([suite])
                .psk(PSK_IDENTITY.to_vec(), PSK_KEY.to_vec()),
        );
        let server_config = psk_server_config(suite);

        let mut client = Connection::client(client_config, now);
        let mut server = Connection::server(server_config, now);
        connect(&mut client, &mut server, now);

        assert_eq!(server.security_parameters().unwrap().cipher_suite(), suite);
        assert_agree(&client, &server);
        exchange_data(&mut client, &mut server, now);
    }
}

fn psk_server_config(suite: CipherSuite) -> std::sync::Arc<Config> {
    client_config(
        builder(ProtocolVersion::Tls1_2)
            .cipher_suites([suite])
            .psk_store(psk_store())
            .psk_identity_hint(b"hint".to_vec()),
    )
}

#[test]
fn unknown_psk_identity_is_fatal() {
    init_log();
    let now = Instant::now();
    let suite = CipherSuite::TLS_PSK_WITH_AES_128_GCM_SHA256;
    let client_config = client_config(
        builder(ProtocolVersion::Tls1_2)
            .cipher_suites([suite])
            .psk(b"stranger".to_vec(), PSK_KEY.to_vec()),
    );

    let mut client = Connection::client(client_config, now);
    let mut server = Connection::server(psk_server_config(suite), now);
    client.handle_timeout(now).unwrap();
    let ex = pump(&mut client, &mut server, now);

    let err = ex.server_error.expect("server rejects the identity");
    assert_eq!(err.alert(), Some(AlertDescription::UnknownPskIdentity));
    assert!(matches!(
        ex.client_error,
        Some(Error::PeerAlert(AlertDescription::UnknownPskIdentity))
    ));
    assert!(!client.is_connected());
}

#[test]
fn client_certificate() {
    init_log();
    let now = Instant::now();
    let client_cert = cert();
    let server_config = server_config(builder(ProtocolVersion::Tls1_2).require_client_certificate(true));
    let client_config = client_config(
        builder(ProtocolVersion::Tls1_2).certificate(client_cert.certificate.clone(), client_cert.private_key),
    );

    let mut client = Connection::client(client_config, now);
    let mut server = Connection::server(server_config, now);
    let ex = connect(&mut client, &mut server, now);

    assert_eq!(ex.server.peer_cert.as_deref(), Some(&client_cert.certificate[..]));
    assert_eq!(server.peer_certificates(), &[client_cert.certificate]);
    assert_agree(&client, &server);
}

#[test]
fn missing_client_certificate_is_fatal() {
    init_log();
    let now = Instant::now();
    let server_config = server_config(builder(ProtocolVersion::Tls1_2).require_client_certificate(true));
    let client_config = client_config(builder(ProtocolVersion::Tls1_2));

    let mut client = Connection::client(client_config, now);
    let mut server = Connection::server(server_config, now);
    client.handle_timeout(now).unwrap();
    let ex = pump(&mut client, &mut server, now);

    let err = ex.server_error.expect("server requires a certificate");
    assert_eq!(err.alert(), Some(AlertDescription::HandshakeFailure));
    assert!(!client.is_connected());
    assert!(!server.is_connected());
}

#[test]
fn alpn_selection_and_mismatch() {
    init_log();
    let now = Instant::now();
    let server_config = server_config(
        builder(ProtocolVersion::Tls1_2).alpn_protocols(vec![b"h2".to_vec(), b"http/1.1".to_vec()]),
    );
    let preferred = client_config(
        builder(ProtocolVersion::Tls1_2).alpn_protocols(vec![b"http/1.1".to_vec(), b"h2".to_vec()]),
    );
    let mut client = Connection::client(preferred, now);
    let mut server = Connection::server(server_config.clone(), now);
    connect(&mut client, &mut server, now);
    // Server preference wins.
    assert_eq!(client.security_parameters().unwrap().alpn_protocol(), Some(&b"h2"[..]));
    assert_eq!(server.security_parameters().unwrap().alpn_protocol(), Some(&b"h2"[..]));

    let other = client_config(builder(ProtocolVersion::Tls1_2).alpn_protocols(vec![b"spdy/3".to_vec()]));
    let mut client = Connection::client(other, now);
    let mut server = Connection::server(server_config, now);
    client.handle_timeout(now).unwrap();
    let ex = pump(&mut client, &mut server, now);
    let err = ex.server_error.expect("no common protocol");
    assert_eq!(err.alert(), Some(AlertDescription::NoApplicationProtocol));
}

#[test]
fn disjoint_versions_are_refused() {
    init_log();
    let now = Instant::now();
    let server_config = server_config(Config::builder());
    let client_config = client_config(Config::builder().versions(ProtocolVersion::Tls1_0, ProtocolVersion::Tls1_1));

    let mut client = Connection::client(client_config, now);
    let mut server = Connection::server(server_config, now);
    client.handle_timeout(now).unwrap();
    let ex = pump(&mut client, &mut server, now);

    let err = ex.server_error.expect("server refuses old versions");
    assert_eq!(err.alert(), Some(AlertDescription::ProtocolVersion));
}

#[test]
fn client_offering_tls13_settles_for_tls12() {
    init_log();
    let now = Instant::now();
    let server_config = server_config(builder(ProtocolVersion::Tls1_2));
    let client_config = client_config(Config::builder());

    let mut client = Connection::client(client_config, now);
    let mut server = Connection::server(server_config, now);
    connect(&mut client, &mut server, now);

    assert_eq!(client.security_parameters().unwrap().version(), ProtocolVersion::Tls1_2);
    assert_agree(&client, &server);
}

#[test]
fn no_shared_suite_is_a_handshake_failure() {
    init_log();
    let now = Instant::now();
    let server_config = server_config(
        builder(ProtocolVersion::Tls1_2).cipher_suites([CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384]),
    );
    let client_config = client_config(
        builder(ProtocolVersion::Tls1_2).cipher_suites([CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256]),
    );

    let mut client = Connection::client(client_config, now);
    let mut server = Connection::server(server_config, now);
    client.handle_timeout(now).unwrap();
    let ex = pump(&mut client, &mut server, now);

    let err = ex.server_error.expect("nothing to agree on");
    assert_eq!(err.alert(), Some(AlertDescription::HandshakeFailure));
    assert!(matches!(
        ex.client_error,
        Some(Error::PeerAlert(AlertDescription::HandshakeFailure))
    ));
}
