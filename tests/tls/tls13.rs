//! TLS 1.3 handshakes.

use std::time::Instant;

use tlsproto::{AlertDescription, CipherSuite, Config, Connection, NamedGroup, ProtocolVersion};

use crate::common::*;

fn assert_tls13(client: &Connection, server: &Connection) {
    let c = client.security_parameters().expect("client parameters");
    let s = server.security_parameters().expect("server parameters");
    assert_eq!(c.version(), ProtocolVersion::Tls1_3);
    assert_eq!(s.version(), ProtocolVersion::Tls1_3);
    assert_eq!(c.cipher_suite(), s.cipher_suite());
    assert!(c.cipher_suite().is_tls13());
}

#[test]
fn default_configs_negotiate_tls13() {
    init_log();
    let now = Instant::now();
    let c = cert();
    let server_config = std::sync::Arc::new(
        Config::builder()
            .certificate(c.certificate.clone(), c.private_key)
            .build()
            .unwrap(),
    );
    let mut client = Connection::client(client_config(Config::builder()), now);
    let mut server = Connection::server(server_config, now);
    let ex = connect(&mut client, &mut server, now);

    assert_tls13(&client, &server);
    assert_eq!(
        client.security_parameters().unwrap().cipher_suite(),
        CipherSuite::TLS_AES_128_GCM_SHA256
    );
    assert_eq!(ex.client.peer_cert.as_deref(), Some(&c.certificate[..]));

    // One ClientHello, no retry.
    let hellos = plaintext_handshake_types(&ex.client_bytes)
        .into_iter()
        .filter(|t| *t == CLIENT_HELLO)
        .count();
    assert_eq!(hellos, 1);

    // Everything after the hellos is encrypted.
    let server_records = parse_records(&ex.server_bytes);
    assert_eq!(server_records[0].ctype, HANDSHAKE);
    assert!(server_records[1..]
        .iter()
        .all(|r| r.ctype == APPLICATION_DATA || r.ctype == CHANGE_CIPHER_SPEC));

    assert_eq!(transfer(&mut client, &mut server, b"over 1.3", now), b"over 1.3");
    assert_eq!(transfer(&mut server, &mut client, b"and back", now), b"and back");
}

#[test]
fn hello_retry_for_a_missing_share() {
    init_log();
    let now = Instant::now();
    let server_config = server_config(Config::builder().named_groups([NamedGroup::X25519, NamedGroup::Secp256r1]));
    // The client only sends a share for its first group.
    let client_config = client_config(Config::builder().named_groups([NamedGroup::Secp384r1, NamedGroup::X25519]));

    let mut client = Connection::client(client_config, now);
    let mut server = Connection::server(server_config, now);
    let ex = connect(&mut client, &mut server, now);
    assert_tls13(&client, &server);

    let hellos = plaintext_handshake_types(&ex.client_bytes)
        .into_iter()
        .filter(|t| *t == CLIENT_HELLO)
        .count();
    assert_eq!(hellos, 2, "retry must produce a second ClientHello");

    assert_eq!(transfer(&mut client, &mut server, b"after retry", now), b"after retry");
}

#[test]
fn no_common_group_fails() {
    init_log();
    let now = Instant::now();
    let server_config = server_config(
        Config::builder()
            .versions(ProtocolVersion::Tls1_3, ProtocolVersion::Tls1_3)
            .named_groups([NamedGroup::Secp384r1]),
    );
    let client_config = client_config(
        Config::builder()
            .versions(ProtocolVersion::Tls1_3, ProtocolVersion::Tls1_3)
            .named_groups([NamedGroup::X25519]),
    );

    let mut client = Connection::client(client_config, now);
    let mut server = Connection::server(server_config, now);
    client.handle_timeout(now).unwrap();
    let ex = pump(&mut client, &mut server, now);

    let err = ex.server_error.expect("no group to agree on");
    assert_eq!(err.alert(), Some(AlertDescription::HandshakeFailure));
    assert!(!client.is_connected());
}

#[test]
fn key_update_keeps_data_flowing() {
    init_log();
    let now = Instant::now();
    let mut client = Connection::client(client_config(Config::builder()), now);
    let mut server = Connection::server(server_config(Config::builder()), now);
    connect(&mut client, &mut server, now);

    client.send_key_update(true).unwrap();
    client.send_application_data(b"new keys").unwrap();
    deliver(&drain_outputs(&mut client).packets, &mut server, now).unwrap();
    let answer = drain_outputs(&mut server);
    assert_eq!(answer.app_bytes(), b"new keys");
    // The requested update is answered before the server writes again.
    let records = parse_records(&answer.packets.concat());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].ctype, APPLICATION_DATA);
    deliver(&answer.packets, &mut client, now).unwrap();
    assert!(drain_outputs(&mut client).packets.is_empty());

    assert_eq!(transfer(&mut server, &mut client, b"mine too", now), b"mine too");

    server.send_key_update(false).unwrap();
    assert_eq!(transfer(&mut server, &mut client, b"again", now), b"again");
    assert_eq!(transfer(&mut client, &mut server, b"still", now), b"still");
}

#[test]
fn key_update_needs_tls13() {
    init_log();
    let now = Instant::now();
    let mut client = Connection::client(client_config(builder(ProtocolVersion::Tls1_2)), now);
    let mut server = Connection::server(server_config(builder(ProtocolVersion::Tls1_2)), now);
    connect(&mut client, &mut server, now);

    assert!(client.send_key_update(false).is_err());
}

#[test]
fn client_certificate_in_tls13() {
    init_log();
    let now = Instant::now();
    let client_cert = cert();
    let server_config = server_config(Config::builder().require_client_certificate(true));
    let client_config =
        client_config(Config::builder().certificate(client_cert.certificate.clone(), client_cert.private_key));

    let mut client = Connection::client(client_config, now);
    let mut server = Connection::server(server_config, now);
    let ex = connect(&mut client, &mut server, now);

    assert_tls13(&client, &server);
    assert_eq!(ex.server.peer_cert.as_deref(), Some(&client_cert.certificate[..]));
    assert_eq!(server.peer_certificates(), &[client_cert.certificate]);
}

#[test]
fn missing_client_certificate_in_tls13() {
    init_log();
    let now = Instant::now();
    let server_config = server_config(Config::builder().require_client_certificate(true));

    let mut client = Connection::client(client_config(Config::builder()), now);
    let mut server = Connection::server(server_config, now);
    client.handle_timeout(now).unwrap();
    let ex = pump(&mut client, &mut server, now);

    let err = ex.server_error.expect("server requires a certificate");
    assert_eq!(err.alert(), Some(AlertDescription::CertificateRequired));
    assert!(!server.is_connected());
}

#[test]
fn server_without_certificate_falls_back_to_tls12_psk() {
    init_log();
    let now = Instant::now();
    let suites = [
        CipherSuite::TLS_AES_128_GCM_SHA256,
        CipherSuite::TLS_ECDHE_PSK_WITH_AES_128_GCM_SHA256,
    ];
    let client_config =
        client_config(Config::builder().cipher_suites(suites).psk(PSK_IDENTITY.to_vec(), PSK_KEY.to_vec()));
    let server_config = psk_server_config(suites);

    let mut client = Connection::client(client_config, now);
    let mut server = Connection::server(server_config, now);
    connect(&mut client, &mut server, now);

    let sp = client.security_parameters().unwrap();
    assert_eq!(sp.version(), ProtocolVersion::Tls1_2);
    assert_eq!(sp.cipher_suite(), CipherSuite::TLS_ECDHE_PSK_WITH_AES_128_GCM_SHA256);
}

fn psk_server_config(suites: [CipherSuite; 2]) -> std::sync::Arc<Config> {
    client_config(Config::builder().cipher_suites(suites).psk_store(psk_store()))
}
