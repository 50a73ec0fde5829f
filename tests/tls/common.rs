//! Shared helpers for TLS integration tests.

#![allow(unused)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tlsproto::certificate::{generate_self_signed_certificate, CertifiedKey};
use tlsproto::{CipherSuite, Config, ConfigBuilder, Connection, Output, ProtocolVersion};

/// Record content types (RFC 5246).
pub const CHANGE_CIPHER_SPEC: u8 = 20;
pub const ALERT: u8 = 21;
pub const HANDSHAKE: u8 = 22;
pub const APPLICATION_DATA: u8 = 23;

/// Handshake message types.
pub const CLIENT_HELLO: u8 = 1;
pub const SERVER_HELLO: u8 = 2;

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn cert() -> CertifiedKey {
    generate_self_signed_certificate().expect("generate certificate")
}

/// Builder pinned to a single version.
pub fn builder(version: ProtocolVersion) -> ConfigBuilder {
    Config::builder().versions(version, version)
}

/// Server config presenting a fresh ECDSA certificate.
pub fn server_config(builder: ConfigBuilder) -> Arc<Config> {
    let c = cert();
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

pub const PSK_IDENTITY: &[u8] = b"client-1";
pub const PSK_KEY: &[u8] = &[0x5a; 32];

pub fn psk_store() -> Arc<HashMap<Vec<u8>, Vec<u8>>> {
    let mut keys = HashMap::new();
    keys.insert(PSK_IDENTITY.to_vec(), PSK_KEY.to_vec());
    Arc::new(keys)
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

impl DrainedOutputs {
    pub fn app_bytes(&self) -> Vec<u8> {
        self.app_data.concat()
    }
}

/// Poll until `Timeout`, collecting everything.
pub fn drain_outputs(endpoint: &mut Connection) -> DrainedOutputs {
    let mut result = DrainedOutputs::default();
    let mut buf = vec![0u8; 32 * 1024];
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

/// Deliver stream bytes, stopping at the first error.
pub fn deliver(packets: &[Vec<u8>], dest: &mut Connection, now: Instant) -> Result<(), tlsproto::Error> {
    for p in packets {
        dest.handle_input(p, now)?;
    }
    Ok(())
}

/// Everything both sides produced while pumping a pair.
#[derive(Default, Debug)]
pub struct Exchange {
    /// Bytes the client wrote, in order.
    pub client_bytes: Vec<u8>,
    /// Bytes the server wrote, in order.
    pub server_bytes: Vec<u8>,
    pub client: DrainedOutputs,
    pub server: DrainedOutputs,
    pub client_error: Option<tlsproto::Error>,
    pub server_error: Option<tlsproto::Error>,
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

/// Move bytes between client and server until neither has anything to
/// send. Errors from `handle_input` are recorded and stop that direction.
pub fn pump(client: &mut Connection, server: &mut Connection, now: Instant) -> Exchange {
    let mut ex = Exchange::default();
    for _ in 0..50 {
        let c = drain_outputs(client);
        let s = drain_outputs(server);
        let quiet = c.packets.is_empty() && s.packets.is_empty();

        for p in &c.packets {
            ex.client_bytes.extend_from_slice(p);
        }
        for p in &s.packets {
            ex.server_bytes.extend_from_slice(p);
        }
        if ex.server_error.is_none() {
            if let Err(e) = deliver(&c.packets, server, now) {
                ex.server_error = Some(e);
            }
        }
        if ex.client_error.is_none() {
            if let Err(e) = deliver(&s.packets, client, now) {
                ex.client_error = Some(e);
            }
        }
        merge(&mut ex.client, c);
        merge(&mut ex.server, s);
        if quiet {
            break;
        }
    }
    ex
}

/// Start the client and run the handshake, asserting both sides connect.
pub fn connect(client: &mut Connection, server: &mut Connection, now: Instant) -> Exchange {
    client.handle_timeout(now).expect("client start");
    let ex = pump(client, server, now);
    assert!(ex.client_error.is_none(), "client error: {:?}", ex.client_error);
    assert!(ex.server_error.is_none(), "server error: {:?}", ex.server_error);
    assert!(ex.client.connected, "client did not connect");
    assert!(ex.server.connected, "server did not connect");
    assert!(client.is_connected() && server.is_connected());
    ex
}

/// Send `data` from `from` and return what `to` receives. Whatever `to`
/// sends in response, such as a KeyUpdate, goes back to `from`.
pub fn transfer(from: &mut Connection, to: &mut Connection, data: &[u8], now: Instant) -> Vec<u8> {
    from.send_application_data(data).expect("send application data");
    let out = drain_outputs(from);
    deliver(&out.packets, to, now).expect("deliver application data");
    let received = drain_outputs(to);
    deliver(&received.packets, from, now).expect("deliver reply");
    received.app_bytes()
}

/// One TLS record from a captured byte stream.
#[derive(Debug, Clone)]
pub struct Record {
    pub ctype: u8,
    pub version: u16,
    pub fragment: Vec<u8>,
}

/// Split a byte stream into TLS records. A trailing partial record is
/// ignored.
pub fn parse_records(stream: &[u8]) -> Vec<Record> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i + 5 <= stream.len() {
        let len = u16::from_be_bytes([stream[i + 3], stream[i + 4]]) as usize;
        if i + 5 + len > stream.len() {
            break;
        }
        out.push(Record {
            ctype: stream[i],
            version: u16::from_be_bytes([stream[i + 1], stream[i + 2]]),
            fragment: stream[i + 5..i + 5 + len].to_vec(),
        });
        i += 5 + len;
    }
    out
}

/// First-byte handshake types of every plaintext handshake record.
pub fn plaintext_handshake_types(stream: &[u8]) -> Vec<u8> {
    parse_records(stream)
        .iter()
        .filter(|r| r.ctype == HANDSHAKE && !r.fragment.is_empty())
        .map(|r| r.fragment[0])
        .collect()
}
