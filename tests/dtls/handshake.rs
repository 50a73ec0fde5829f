//! DTLS handshakes over a perfect network.

use std::time::Instant;

use tlsproto::{CipherSuite, Connection, ProtocolVersion};

use crate::common::*;

#[test]
fn dtls12_handshake_with_cookie_exchange() {
    init_log();
    let now = Instant::now();
    let mut client = Connection::client(client_config(dtls_builder()), now);
    let mut server = Connection::server(server_config(dtls_builder()), now);
    let net = connect(&mut client, &mut server, now);

    // CH, HVR, CH with cookie, then the real ServerHello.
    let client_types = handshake_types(&net.client_datagrams);
    let server_types = handshake_types(&net.server_datagrams);
    assert_eq!(&client_types[..2], &[CLIENT_HELLO, CLIENT_HELLO]);
    assert_eq!(&server_types[..2], &[HELLO_VERIFY_REQUEST, SERVER_HELLO]);

    // The cookie made the second hello longer.
    let hellos: Vec<_> = net
        .client_datagrams
        .iter()
        .filter(|d| handshake_types(std::slice::from_ref(*d)).first() == Some(&CLIENT_HELLO))
        .collect();
    assert!(hellos[1].len() > hellos[0].len());

    assert!(client.is_dtls() && server.is_dtls());
    let sp = client.security_parameters().unwrap();
    assert_eq!(sp.version(), ProtocolVersion::Dtls1_2);
    assert_eq!(sp.cipher_suite(), CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256);
    assert!(net.client.peer_cert.is_some());

    let got = transfer(&mut client, &mut server, b"datagram one", now);
    assert_eq!(got, vec![b"datagram one".to_vec()]);
    let got = transfer(&mut server, &mut client, b"datagram two", now);
    assert_eq!(got, vec![b"datagram two".to_vec()]);
}

#[test]
fn dtls10_cbc_handshake() {
    init_log();
    let now = Instant::now();
    let builder = || {
        tlsproto::Config::builder()
            .versions(ProtocolVersion::Dtls1_0, ProtocolVersion::Dtls1_0)
            .cipher_suites([CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA])
    };
    let mut client = Connection::client(client_config(builder()), now);
    let mut server = Connection::server(server_config(builder()), now);
    connect(&mut client, &mut server, now);

    assert_eq!(client.security_parameters().unwrap().version(), ProtocolVersion::Dtls1_0);
    let got = transfer(&mut client, &mut server, b"old but fine", now);
    assert_eq!(got, vec![b"old but fine".to_vec()]);
}

#[test]
fn client_limited_to_dtls10_meets_newer_server() {
    init_log();
    let now = Instant::now();
    let client_builder = tlsproto::Config::builder()
        .versions(ProtocolVersion::Dtls1_0, ProtocolVersion::Dtls1_0)
        .cipher_suites([CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA]);
    let mut client = Connection::client(client_config(client_builder), now);
    let mut server = Connection::server(server_config(dtls_builder()), now);
    connect(&mut client, &mut server, now);

    let c = client.security_parameters().unwrap();
    let s = server.security_parameters().unwrap();
    assert_eq!(c.version(), ProtocolVersion::Dtls1_0);
    assert_eq!(s.version(), ProtocolVersion::Dtls1_0);
    assert!(c.master_secret() == s.master_secret());
}

#[test]
fn server_without_cookie_requirement() {
    init_log();
    let now = Instant::now();
    let mut client = Connection::client(client_config(dtls_builder()), now);
    let mut server = Connection::server(server_config(dtls_builder().require_cookie(false)), now);
    let net = connect(&mut client, &mut server, now);

    let server_types = handshake_types(&net.server_datagrams);
    assert_eq!(server_types[0], SERVER_HELLO);
    assert!(!server_types.contains(&HELLO_VERIFY_REQUEST));
}

#[test]
fn small_mtu_fragments_the_flights() {
    init_log();
    let now = Instant::now();
    let mtu = 300;
    let mut client = Connection::client(client_config(dtls_builder().mtu(mtu)), now);
    let mut server = Connection::server(server_config(dtls_builder().mtu(mtu)), now);
    let net = connect(&mut client, &mut server, now);

    assert!(net.client_datagrams.iter().all(|d| d.len() <= mtu));
    assert!(net.server_datagrams.iter().all(|d| d.len() <= mtu));
    // The certificate alone does not fit one datagram.
    let certificate_fragments = handshake_types(&net.server_datagrams)
        .into_iter()
        .filter(|t| *t == CERTIFICATE)
        .count();
    assert!(certificate_fragments > 1);

    let big = vec![7u8; 1000];
    client.send_application_data(&big).unwrap();
    let packets = collect_packets(&mut client);
    assert!(packets.len() > 1);
    assert!(packets.iter().all(|d| d.len() <= mtu));
    deliver_packets(&packets, &mut server, now);
    assert_eq!(drain_outputs(&mut server).app_data.concat(), big);
}

#[test]
fn psk_over_dtls() {
    init_log();
    let now = Instant::now();
    let suites = [CipherSuite::TLS_PSK_WITH_AES_128_GCM_SHA256];
    let mut keys = std::collections::HashMap::new();
    keys.insert(b"sensor-7".to_vec(), vec![9u8; 16]);

    let client = client_config(dtls_builder().cipher_suites(suites).psk(b"sensor-7".to_vec(), vec![9u8; 16]));
    let server = client_config(dtls_builder().cipher_suites(suites).psk_store(std::sync::Arc::new(keys)));
    let mut client = Connection::client(client, now);
    let mut server = Connection::server(server, now);
    let net = connect(&mut client, &mut server, now);

    assert!(net.client.peer_cert.is_none());
    assert_eq!(server.security_parameters().unwrap().cipher_suite(), suites[0]);
}

#[test]
fn dtls_session_resumption() {
    init_log();
    let now = Instant::now();
    let store = std::sync::Arc::new(tlsproto::InMemorySessionStore::new());
    let shared: std::sync::Arc<dyn tlsproto::SessionStore> = store.clone();
    let server_cfg = server_config(dtls_builder().session_store(shared));
    let client_cfg = client_config(dtls_builder());

    let mut client = Connection::client(client_cfg.clone(), now);
    let mut server = Connection::server(server_cfg.clone(), now);
    connect(&mut client, &mut server, now);
    let session = client.session().cloned().expect("session");

    let mut client = Connection::client_resuming(client_cfg, now, session);
    let mut server = Connection::server(server_cfg, now);
    let net = connect(&mut client, &mut server, now);

    assert!(client.security_parameters().unwrap().is_resumed());
    assert!(server.security_parameters().unwrap().is_resumed());
    assert!(!handshake_types(&net.server_datagrams).contains(&CERTIFICATE));
    let got = transfer(&mut client, &mut server, b"again", now);
    assert_eq!(got, vec![b"again".to_vec()]);
}

#[test]
fn replayed_datagram_is_delivered_once() {
    init_log();
    let now = Instant::now();
    let mut client = Connection::client(client_config(dtls_builder()), now);
    let mut server = Connection::server(server_config(dtls_builder()), now);
    connect(&mut client, &mut server, now);

    client.send_application_data(b"once").unwrap();
    let packets = collect_packets(&mut client);
    deliver_packets(&packets, &mut server, now);
    deliver_packets(&packets, &mut server, now);
    assert_eq!(drain_outputs(&mut server).app_data, vec![b"once".to_vec()]);
    assert!(server.is_connected());
}

#[test]
fn tampered_datagram_is_dropped() {
    init_log();
    let now = Instant::now();
    let mut client = Connection::client(client_config(dtls_builder()), now);
    let mut server = Connection::server(server_config(dtls_builder()), now);
    connect(&mut client, &mut server, now);

    client.send_application_data(b"intact").unwrap();
    let mut packets = collect_packets(&mut client);
    let last = packets[0].len() - 1;
    packets[0][last] ^= 0x01;
    deliver_packets(&packets, &mut server, now);
    assert!(drain_outputs(&mut server).app_data.is_empty());
    // Datagram transports drop bad records rather than failing.
    assert!(server.is_connected());

    let got = transfer(&mut client, &mut server, b"next", now);
    assert_eq!(got, vec![b"next".to_vec()]);
}
