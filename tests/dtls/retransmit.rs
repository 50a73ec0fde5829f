//! DTLS retransmission, loss and handshake timeouts.

use std::time::{Duration, Instant};

use tlsproto::{Connection, Error};

use crate::common::*;

#[test]
fn completes_when_every_third_datagram_is_lost() {
    init_log();
    let now = Instant::now();
    let config = || dtls_builder().handshake_timeout(Duration::from_secs(120));
    let mut client = Connection::client(client_config(config()), now);
    let mut server = Connection::server(server_config(config()), now);

    // Every third datagram is lost, up to five of them.
    let mut dropped = 0;
    let net = run(&mut client, &mut server, now, |n| {
        let lose = n % 3 == 0 && dropped < 5;
        if lose {
            dropped += 1;
        }
        lose
    });

    assert!(net.dropped > 0);
    assert!(client.is_connected(), "client did not connect");
    assert!(server.is_connected(), "server did not connect");
    let c = client.security_parameters().unwrap();
    let s = server.security_parameters().unwrap();
    assert!(c.master_secret() == s.master_secret());

    let later = net.now.unwrap();
    let got = transfer(&mut client, &mut server, b"made it", later);
    assert_eq!(got, vec![b"made it".to_vec()]);
}

#[test]
fn client_hello_resend_increases_sequence() {
    init_log();
    let mut now = Instant::now();
    let mut client = Connection::client(client_config(dtls_builder()), now);

    client.handle_timeout(now).expect("client start");
    let init = collect_packets(&mut client);
    assert_eq!(handshake_types(&init), vec![CLIENT_HELLO]);

    trigger_timeout(&mut client, &mut now);
    let resend = collect_packets(&mut client);
    assert_eq!(handshake_types(&resend), vec![CLIENT_HELLO]);
    assert_epochs_and_seq_increased(&collect_headers(&init), &collect_headers(&resend));
}

#[test]
fn resend_timer_backs_off() {
    init_log();
    let now = Instant::now();
    let mut client = Connection::client(client_config(dtls_builder()), now);
    client.handle_timeout(now).unwrap();

    let first = drain_outputs(&mut client).timeout.unwrap();
    assert_eq!(first - now, Duration::from_secs(1));

    client.handle_timeout(first).unwrap();
    let out = drain_outputs(&mut client);
    assert_eq!(out.packets.len(), 1);
    assert_eq!(out.timeout.unwrap() - first, Duration::from_secs(2));
}

#[test]
fn lost_final_flight_is_resent() {
    init_log();
    let mut now = Instant::now();
    let mut client = Connection::client(client_config(dtls_builder()), now);
    let mut server = Connection::server(server_config(dtls_builder()), now);

    // Walk the handshake by hand up to the server's final flight.
    client.handle_timeout(now).unwrap();
    for _ in 0..2 {
        deliver_packets(&collect_packets(&mut client), &mut server, now);
        deliver_packets(&collect_packets(&mut server), &mut client, now);
    }
    // Client flight 5 goes out, the server completes and answers.
    deliver_packets(&collect_packets(&mut client), &mut server, now);
    assert!(server.is_connected());
    let lost = collect_packets(&mut server);
    assert!(!lost.is_empty());
    assert!(!client.is_connected());

    // The client resends its flight, the server resends the lost one.
    trigger_timeout(&mut client, &mut now);
    deliver_packets(&collect_packets(&mut client), &mut server, now);
    let resent = collect_packets(&mut server);
    assert_eq!(resent.len(), lost.len());
    assert_epochs_and_seq_increased(&collect_headers(&lost), &collect_headers(&resent));

    deliver_packets(&resent, &mut client, now);
    assert!(client.is_connected());
    let got = transfer(&mut client, &mut server, b"finally", now);
    assert_eq!(got, vec![b"finally".to_vec()]);
}

#[test]
fn duplicate_flight_after_completion_is_harmless() {
    init_log();
    let now = Instant::now();
    let mut client = Connection::client(client_config(dtls_builder()), now);
    let mut server = Connection::server(server_config(dtls_builder()), now);
    let net = connect(&mut client, &mut server, now);

    // Replay every server datagram at the client.
    deliver_packets(&net.server_datagrams, &mut client, now);
    let out = drain_outputs(&mut client);
    assert!(!out.closed);
    assert!(client.is_connected());

    let got = transfer(&mut server, &mut client, b"still here", now);
    assert_eq!(got, vec![b"still here".to_vec()]);
}

#[test]
fn silent_server_times_out_the_handshake() {
    init_log();
    let mut now = Instant::now();
    let config = client_config(dtls_builder().handshake_timeout(Duration::from_secs(10)));
    let mut client = Connection::client(config, now);
    client.handle_timeout(now).unwrap();

    let mut resends = 0;
    let err = loop {
        let out = drain_outputs(&mut client);
        resends += out.packets.len();
        now = out.timeout.expect("timer");
        match client.handle_timeout(now) {
            Ok(()) => {}
            Err(e) => break e,
        }
    };
    assert!(err.is_timeout(), "unexpected {err:?}");
    // 1s, 2s, 4s then the 10s deadline.
    assert_eq!(resends, 4);
    assert!(client.is_closed());
    assert!(matches!(client.handle_timeout(now), Err(Error::Closed)));
}
