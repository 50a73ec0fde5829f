//! Heartbeat keep-alive over DTLS.

use std::time::{Duration, Instant};

use tlsproto::{Connection, HeartbeatMode};

use crate::common::*;

const INTERVAL: Duration = Duration::from_secs(5);

fn heartbeat_pair(server_mode: HeartbeatMode, now: Instant) -> (Connection, Connection) {
    let client = client_config(
        dtls_builder()
            .heartbeat(HeartbeatMode::PeerAllowedToSend)
            .heartbeat_interval(INTERVAL)
            .heartbeat_timeout(Duration::from_secs(20)),
    );
    let server = server_config(dtls_builder().heartbeat(server_mode));
    (Connection::client(client, now), Connection::server(server, now))
}

#[test]
fn request_is_answered_and_rescheduled() {
    init_log();
    let now = Instant::now();
    let (mut client, mut server) = heartbeat_pair(HeartbeatMode::PeerAllowedToSend, now);
    connect(&mut client, &mut server, now);
    assert_eq!(
        client.security_parameters().unwrap().heartbeat(),
        Some(HeartbeatMode::PeerAllowedToSend)
    );

    let idle = drain_outputs(&mut client).timeout.unwrap();
    assert_eq!(idle, now + INTERVAL);

    client.handle_timeout(idle).unwrap();
    let request = collect_packets(&mut client);
    assert_eq!(request.len(), 1);
    assert_eq!(parse_records(&request[0])[0].ctype, HEARTBEAT);

    deliver_packets(&request, &mut server, idle);
    let response = drain_outputs(&mut server);
    assert_eq!(response.packets.len(), 1);
    assert_eq!(parse_records(&response.packets[0])[0].ctype, HEARTBEAT);
    // Heartbeats never surface as application data.
    assert!(response.app_data.is_empty());

    deliver_packets(&response.packets, &mut client, idle);
    let next = drain_outputs(&mut client).timeout.unwrap();
    assert_eq!(next, idle + INTERVAL);

    // Long after the timeout the connection is still alive.
    let later = idle + Duration::from_secs(60);
    client.handle_timeout(later).unwrap();
    assert!(client.is_connected());
}

#[test]
fn unanswered_request_times_out() {
    init_log();
    let now = Instant::now();
    let (mut client, mut server) = heartbeat_pair(HeartbeatMode::PeerAllowedToSend, now);
    let net = connect(&mut client, &mut server, now);
    let mut now = net.now.unwrap();

    let mut requests = 0;
    let err = loop {
        let out = drain_outputs(&mut client);
        requests += out.packets.len();
        now = out.timeout.expect("timer");
        if let Err(e) = client.handle_timeout(now) {
            break e;
        }
        assert!(requests < 20, "heartbeat never timed out");
    };

    assert!(err.is_timeout());
    // Requests are resent while waiting.
    assert!(requests > 1);
    assert!(client.is_closed());
}

#[test]
fn peer_may_forbid_requests() {
    init_log();
    let now = Instant::now();
    let (mut client, mut server) = heartbeat_pair(HeartbeatMode::PeerNotAllowedToSend, now);
    connect(&mut client, &mut server, now);
    assert_eq!(
        client.security_parameters().unwrap().heartbeat(),
        Some(HeartbeatMode::PeerNotAllowedToSend)
    );

    let out = drain_outputs(&mut client);
    assert!(out.timeout.unwrap() > now + Duration::from_secs(24 * 60 * 60));
    client.handle_timeout(now + INTERVAL * 3).unwrap();
    assert!(collect_packets(&mut client).is_empty());
}

#[test]
fn not_negotiated_without_both_sides() {
    init_log();
    let now = Instant::now();
    let mut client = Connection::client(
        client_config(dtls_builder().heartbeat(HeartbeatMode::PeerAllowedToSend).heartbeat_interval(INTERVAL)),
        now,
    );
    let mut server = Connection::server(server_config(dtls_builder()), now);
    connect(&mut client, &mut server, now);

    assert_eq!(client.security_parameters().unwrap().heartbeat(), None);
    client.handle_timeout(now + INTERVAL * 2).unwrap();
    assert!(collect_packets(&mut client).is_empty());
}
