//! Shared helpers for DTLS integration tests.

#![allow(unused)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tlsproto::certificate::generate_self_signed_certificate;
use tlsproto::{Config, ConfigBuilder, Connection, Output, ProtocolVersion};

/// Parsed DTLS record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecHdr {
    pub ctype: u8,
    pub epoch: u16,
    pub seq: u64,
}

pub const ALERT: u8 = 21;
pub const HANDSHAKE: u8 = 22;
pub const APPLICATION_DATA: u8 = 23;
pub const HEARTBEAT: u8 = 24;

/// Handshake message types (RFC 6347).
pub const CLIENT_HELLO: u8 = 1;
pub const SERVER_HELLO: u8 = 2;
pub const HELLO_VERIFY_REQUEST: u8 = 3;
pub const CERTIFICATE: u8 = 11;

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Parse DTLS record headers from a datagram.
pub fn parse_records(datagram: &[u8]) -> Vec<RecHdr> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i + 13 <= datagram.len() {
        let ctype = datagram[i];
        let epoch = u16::from_be_bytes([datagram[i + 3], datagram[i + 4]]);
        let mut seq_bytes = [0u8; 8];
        seq_bytes[2..].copy_from_slice(&datagram[i + 5..i + 11]);
        let len = u16::from_be_bytes([datagram[i + 11], datagram[i + 12]]) as usize;
        out.push(RecHdr {
            ctype,
            epoch,
            seq: u64::from_be_bytes(seq_bytes),
        });
        i += 13 + len;
    }
    out
}

pub fn collect_headers(datagrams: &[Vec<u8>]) -> Vec<RecHdr> {
    datagrams.iter().flat_map(|d| parse_records(d)).collect()
}

/// Handshake message types of the plaintext (epoch 0) handshake records.
pub fn handshake_types(datagrams: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for d in datagrams {
        let mut i = 0usize;
        while i + 13 < d.len() {
            let epoch = u16::from_be_bytes([d[i + 3], d[i + 4]]);
            let len = u16::from_be_bytes([d[i + 11], d[i + 12]]) as usize;
            if d[i] == HANDSHAKE && epoch == 0 {
                out.push(d[i + 13]);
            }
            i += 13 + len;
        }
    }
    out
}

/// Resent records keep their epochs and get new sequence numbers.
pub fn assert_epochs_and_seq_increased(init: &[RecHdr], resend: &[RecHdr]) {
    assert_eq!(init.len(), resend.len(), "record count must match between initial and resend");
    for (a, b) in init.iter().zip(resend.iter()) {
        assert_eq!(a.epoch, b.epoch, "epoch must match for the same record on resend");
        assert!(b.seq > a.seq, "sequence must increase on resend: {:?} -> {:?}", a, b);
    }
}

/// Poll until `Timeout`, collecting only packets.
pub fn collect_packets(endpoint: &mut Connection) -> Vec<Vec<u8>> {
    drain_outputs(endpoint).packets
}

/// Collected outputs from polling an endpoint to `Timeout`.
#[derive(Default, Debug)]
pub struct DrainedOutputs {
    pub packets: Vec<Vec<u8>>,
    pub connected: bool,
    pub peer_cert: Option<Vec<u8>>,
    pub app_data: Vec<Vec<u8>>,
    pub closed: bool,
    pub timeout: Option<Instant>,
}

/// Poll until `Timeout`, collecting everything.
pub fn drain_outputs(endpoint: &mut Connection) -> DrainedOutputs {
    let mut result = DrainedOutputs::default();
    let mut buf = vec![0u8; 2048];
    loop {
        match endpoint.poll_output(&mut buf) {
            Output::Packet(p) => result.packets.push(p.to_vec()),
            Output::Connected => result.connected = true,
            Output::PeerCert(cert) => result.peer_cert = Some(cert.to_vec()),
            Output::ApplicationData(data) => result.app_data.push(data.to_vec()),
            Output::Closed => result.closed = true,
            Output::Timeout(t) => {
                result.timeout = Some(t);
                break;
            }
        }
    }
    result
}

/// Deliver datagrams one by one.
pub fn deliver_packets(packets: &[Vec<u8>], dest: &mut Connection, now: Instant) {
    for p in packets {
        // Ignore errors - they may be expected for duplicates/replays
        let _ = dest.handle_input(p, now);
    }
}

/// Trigger a timeout by advancing time 2 seconds.
pub fn trigger_timeout(ep: &mut Connection, now: &mut Instant) {
    *now += Duration::from_secs(2);
    ep.handle_timeout(*now).expect("handle_timeout");
}

pub fn dtls_builder() -> ConfigBuilder {
    Config::builder().dtls()
}

pub fn server_config(builder: ConfigBuilder) -> Arc<Config> {
    let c = generate_self_signed_certificate().expect("generate certificate");
    Arc::new(
        builder
            .certificate(c.certificate, c.private_key)
            .build()
            .expect("server config"),
    )
}

pub fn client_config(builder: ConfigBuilder) -> Arc<Config> {
    Arc::new(builder.build().expect("client config"))
}

/// Outcome of driving a pair over a simulated network.
#[derive(Default, Debug)]
pub struct Network {
    pub client: DrainedOutputs,
    pub server: DrainedOutputs,
    pub client_datagrams: Vec<Vec<u8>>,
    pub server_datagrams: Vec<Vec<u8>>,
    pub dropped: usize,
    pub now: Option<Instant>,
}

fn merge(into: &mut DrainedOutputs, from: DrainedOutputs) {
    into.connected |= from.connected;
    into.closed |= from.closed;
    if from.peer_cert.is_some() {
        into.peer_cert = from.peer_cert;
    }
    into.app_data.extend(from.app_data);
    into.timeout = from.timeout;
}

/// Run the handshake, losing a datagram whenever `drop` says so. When both
/// sides go quiet before connecting, time jumps to the earliest timer.
pub fn run(
    client: &mut Connection,
    server: &mut Connection,
    mut now: Instant,
    mut drop: impl FnMut(usize) -> bool,
) -> Network {
    let mut net = Network::default();
    let mut count = 0usize;
    client.handle_timeout(now).expect("client start");

    for _ in 0..200 {
        let c = drain_outputs(client);
        let s = drain_outputs(server);

        let mut moved = false;
        for p in &c.packets {
            count += 1;
            net.client_datagrams.push(p.clone());
            if drop(count) {
                net.dropped += 1;
                continue;
            }
            moved = true;
            let _ = server.handle_input(p, now);
        }
        for p in &s.packets {
            count += 1;
            net.server_datagrams.push(p.clone());
            if drop(count) {
                net.dropped += 1;
                continue;
            }
            moved = true;
            let _ = client.handle_input(p, now);
        }

        let next = [c.timeout, s.timeout].into_iter().flatten().min();
        merge(&mut net.client, c);
        merge(&mut net.server, s);

        if client.is_connected() && server.is_connected() && !moved {
            break;
        }
        if !moved {
            let Some(next) = next else { break };
            now = now.max(next);
            let _ = client.handle_timeout(now);
            let _ = server.handle_timeout(now);
        }
    }
    net.now = Some(now);
    net
}

/// Handshake over a perfect network.
pub fn connect(client: &mut Connection, server: &mut Connection, now: Instant) -> Network {
    let net = run(client, server, now, |_| false);
    assert!(client.is_connected(), "client did not connect");
    assert!(server.is_connected(), "server did not connect");
    net
}

/// Send one message and return what arrives on the other side.
pub fn transfer(from: &mut Connection, to: &mut Connection, data: &[u8], now: Instant) -> Vec<Vec<u8>> {
    from.send_application_data(data).expect("send application data");
    let packets = collect_packets(from);
    deliver_packets(&packets, to, now);
    drain_outputs(to).app_data
}
