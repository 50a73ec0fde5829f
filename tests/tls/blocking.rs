//! Blocking connections over loopback TCP.

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tlsproto::blocking::{BlockingConnection, Transport};
use tlsproto::{Config, Connection, ProtocolVersion};

use crate::common::*;

struct Tcp(TcpStream);

impl Transport for Tcp {
    fn receive(&self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<Option<usize>> {
        // A zero timeout would mean "block forever" to the socket.
        let timeout = timeout.map(|t| t.max(Duration::from_millis(1)));
        self.0.set_read_timeout(timeout)?;
        match (&self.0).read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn send(&self, buf: &[u8]) -> io::Result<()> {
        (&self.0).write_all(buf)
    }
}

fn tcp_pair() -> (Tcp, Tcp) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (server, _) = listener.accept().unwrap();
    (Tcp(client), Tcp(server))
}

fn echo_round_trip(client_config: Arc<Config>, server_config: Arc<Config>) -> ProtocolVersion {
    let (client_io, server_io) = tcp_pair();
    let now = Instant::now();

    let server = thread::spawn(move || {
        let server = BlockingConnection::new(Connection::server(server_config, now), server_io);
        server.handshake().unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = server.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
            if received.ends_with(b"\n") {
                server.write(&received).unwrap();
                received.clear();
            }
        }
    });

    let client = BlockingConnection::new(Connection::client(client_config, now), client_io);
    client.handshake().unwrap();

    let message = [b'x'; 5000];
    let mut line = message.to_vec();
    line.push(b'\n');
    client.write(&line).unwrap();

    let mut echoed = Vec::new();
    let mut buf = [0u8; 1024];
    while echoed.len() < line.len() {
        let n = client.read(&mut buf).unwrap();
        assert!(n > 0, "closed before the echo completed");
        echoed.extend_from_slice(&buf[..n]);
    }
    assert_eq!(echoed, line);

    let version = client.with_connection(|c| c.security_parameters().unwrap().version());
    client.close().unwrap();
    server.join().unwrap();
    version
}

#[test]
fn tls13_echo_over_tcp() {
    init_log();
    let version = echo_round_trip(client_config(Config::builder()), server_config(Config::builder()));
    assert_eq!(version, ProtocolVersion::Tls1_3);
}

#[test]
fn tls12_echo_over_tcp() {
    init_log();
    let version = echo_round_trip(
        client_config(builder(ProtocolVersion::Tls1_2)),
        server_config(builder(ProtocolVersion::Tls1_2)),
    );
    assert_eq!(version, ProtocolVersion::Tls1_2);
}
