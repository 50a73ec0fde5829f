//! Closure, limits and misbehaving peers.

use std::time::Instant;

use tlsproto::{AlertDescription, CipherSuite, Connection, Error, MaxFragmentLength, ProtocolVersion};

use crate::common::*;

fn psk_pair(client: tlsproto::ConfigBuilder, now: Instant) -> (Connection, Connection) {
    let suites = [CipherSuite::TLS_PSK_WITH_AES_128_GCM_SHA256];
    let client_config = client_config(
        client
            .cipher_suites(suites)
            .psk(PSK_IDENTITY.to_vec(), PSK_KEY.to_vec()),
    );
    let server_config = psk_server_config(suites);
    (
        Connection::client(client_config, now),
        Connection::server(server_config, now),
    )
}

fn psk_server_config(suites: [CipherSuite; 1]) -> std::sync::Arc<tlsproto::Config> {
    client_config(
        builder(ProtocolVersion::Tls1_2)
            .cipher_suites(suites)
            .psk_store(psk_store()),
    )
}

#[test]
fn close_notify_during_handshake_is_a_failure() {
    init_log();
    let now = Instant::now();
    let (mut client, mut server) = psk_pair(builder(ProtocolVersion::Tls1_2), now);

    client.handle_timeout(now).unwrap();
    let hello = drain_outputs(&mut client);
    deliver(&hello.packets, &mut server, now).unwrap();
    assert!(!drain_outputs(&mut server).packets.is_empty());

    client.close().unwrap();
    let close = drain_outputs(&mut client);
    assert!(close.closed);

    let err = deliver(&close.packets, &mut server, now).unwrap_err();
    assert_eq!(err.alert(), Some(AlertDescription::HandshakeFailure));
    assert!(server.is_closed());
    assert!(!server.is_connected());

    // The server told the client why.
    let out = drain_outputs(&mut server);
    let alerts: Vec<_> = parse_records(&out.packets.concat())
        .into_iter()
        .filter(|r| r.ctype == ALERT)
        .collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].fragment, vec![2, AlertDescription::HandshakeFailure.value()]);
}

#[test]
fn graceful_close_after_data() {
    init_log();
    let now = Instant::now();
    let (mut client, mut server) = psk_pair(builder(ProtocolVersion::Tls1_2), now);
    connect(&mut client, &mut server, now);

    client.send_application_data(b"last words").unwrap();
    client.close().unwrap();
    let out = drain_outputs(&mut client);
    assert!(out.closed);
    assert!(client.is_closed());
    assert!(matches!(client.send_application_data(b"more"), Err(Error::Closed)));

    deliver(&out.packets, &mut server, now).unwrap();
    let got = drain_outputs(&mut server);
    assert_eq!(got.app_bytes(), b"last words");
    assert!(got.closed);
    assert!(server.is_closed());

    // The server answered with its own close_notify.
    let alerts: Vec<_> = parse_records(&got.packets.concat())
        .into_iter()
        .filter(|r| r.ctype == APPLICATION_DATA || r.ctype == ALERT)
        .collect();
    assert_eq!(alerts.len(), 1);
}

#[test]
fn max_fragment_length_limits_records() {
    init_log();
    let now = Instant::now();
    let (mut client, mut server) = psk_pair(
        builder(ProtocolVersion::Tls1_2).max_fragment_length(MaxFragmentLength::Pow9),
        now,
    );
    connect(&mut client, &mut server, now);
    assert_eq!(
        client.security_parameters().unwrap().max_fragment_length(),
        Some(MaxFragmentLength::Pow9)
    );
    assert_eq!(
        server.security_parameters().unwrap().max_fragment_length(),
        Some(MaxFragmentLength::Pow9)
    );

    let data = vec![0xab; 2000];
    server.send_application_data(&data).unwrap();
    let out = drain_outputs(&mut server);
    let records = parse_records(&out.packets.concat());
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.fragment.len() <= 512 + 256));

    deliver(&out.packets, &mut client, now).unwrap();
    assert_eq!(drain_outputs(&mut client).app_bytes(), data);
}

#[test]
fn oversized_record_is_record_overflow() {
    init_log();
    let now = Instant::now();
    let (mut client, mut server) = psk_pair(
        builder(ProtocolVersion::Tls1_2).max_fragment_length(MaxFragmentLength::Pow9),
        now,
    );
    connect(&mut client, &mut server, now);

    // Far beyond what a 512 byte fragment can expand to.
    let mut record = vec![APPLICATION_DATA, 3, 3];
    record.extend_from_slice(&3000u16.to_be_bytes());
    record.extend(std::iter::repeat(0).take(3000));

    let err = client.handle_input(&record, now).unwrap_err();
    assert_eq!(err.alert(), Some(AlertDescription::RecordOverflow));
    let out = drain_outputs(&mut client);
    assert!(out.app_data.is_empty());
    assert!(out.closed);
}

#[test]
fn message_out_of_order_is_unexpected() {
    init_log();
    let now = Instant::now();
    let (mut client, _) = psk_pair(builder(ProtocolVersion::Tls1_2), now);
    let (mut other, _) = psk_pair(builder(ProtocolVersion::Tls1_2), now);

    client.handle_timeout(now).unwrap();
    other.handle_timeout(now).unwrap();
    let hello = drain_outputs(&mut other);

    // A client waiting for a ServerHello gets a ClientHello.
    let err = deliver(&hello.packets, &mut client, now).unwrap_err();
    assert_eq!(err.alert(), Some(AlertDescription::UnexpectedMessage));
    assert!(matches!(client.handle_timeout(now), Err(Error::Closed)));
}

#[test]
fn application_data_before_handshake_is_unexpected() {
    init_log();
    let now = Instant::now();
    let (_, mut server) = psk_pair(builder(ProtocolVersion::Tls1_2), now);

    let err = server
        .handle_input(&[APPLICATION_DATA, 3, 3, 0, 3, 1, 2, 3], now)
        .unwrap_err();
    assert_eq!(err.alert(), Some(AlertDescription::UnexpectedMessage));
}

#[test]
fn data_written_early_is_sent_after_connecting() {
    init_log();
    let now = Instant::now();
    let (mut client, mut server) = psk_pair(builder(ProtocolVersion::Tls1_2), now);

    client.send_application_data(b"queued").unwrap();
    let ex = connect(&mut client, &mut server, now);
    assert_eq!(ex.server.app_bytes(), b"queued");
}

#[test]
fn handshake_times_out() {
    init_log();
    let now = Instant::now();
    let (mut client, _) = psk_pair(
        builder(ProtocolVersion::Tls1_2).handshake_timeout(std::time::Duration::from_secs(5)),
        now,
    );
    client.handle_timeout(now).unwrap();
    let out = drain_outputs(&mut client);
    let deadline = out.timeout.expect("deadline");
    assert!(deadline <= now + std::time::Duration::from_secs(5));

    let err = client.handle_timeout(deadline).unwrap_err();
    assert!(err.is_timeout());
    assert!(client.is_closed());
}
