//! The sans-IO connection.
//!
//! Bytes from the transport go in through [`Connection::handle_input`],
//! everything that must happen in response comes out of
//! [`Connection::poll_output`]. Time only moves when the caller says so with
//! [`Connection::handle_timeout`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::Engine;
use crate::handshake::{Client, ConnectionState, Handshake, SecurityParameters, Server};
use crate::session::TlsSession;
use crate::{Config, Error};

/// Returned by [`Connection::poll_output`] when nothing is scheduled.
const DISTANT_FUTURE: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Output from [`Connection::poll_output`].
#[derive(Debug, PartialEq, Eq)]
pub enum Output<'a> {
    /// Bytes for the transport. A DTLS packet is one datagram.
    Packet(&'a [u8]),
    /// Call [`Connection::handle_timeout`] at this instant.
    Timeout(Instant),
    /// The handshake completed.
    Connected,
    /// The peer's end-entity certificate (DER).
    PeerCert(&'a [u8]),
    /// Decrypted application data.
    ApplicationData(&'a [u8]),
    /// The connection closed, gracefully or not. Reported once.
    Closed,
}

/// A TLS or DTLS connection, client or server.
pub struct Connection {
    engine: Engine,
    handshake: Handshake,
    now: Instant,
    closed_reported: bool,
}

impl Connection {
    /// A client connection. The ClientHello goes out on the first
    /// [`handle_timeout`](Self::handle_timeout).
    pub fn client(config: Arc<Config>, now: Instant) -> Connection {
        Self::new(config, now, Handshake::Client(Client::new(None)))
    }

    /// A client connection offering to resume `session`.
    pub fn client_resuming(config: Arc<Config>, now: Instant, session: TlsSession) -> Connection {
        Self::new(config, now, Handshake::Client(Client::new(Some(session))))
    }

    /// A server connection. It waits for the ClientHello.
    pub fn server(config: Arc<Config>, now: Instant) -> Connection {
        Self::new(config, now, Handshake::Server(Server::new()))
    }

    fn new(config: Arc<Config>, now: Instant, handshake: Handshake) -> Connection {
        Connection {
            engine: Engine::new(config, now),
            handshake,
            now,
            closed_reported: false,
        }
    }

    /// Feed bytes from the transport. A DTLS transport passes one datagram
    /// per call.
    ///
    /// Input after a local close is ignored.
    pub fn handle_input(&mut self, data: &[u8], now: Instant) -> Result<(), Error> {
        self.now = now;
        if self.engine.is_failed() {
            return Err(Error::Closed);
        }
        if self.engine.is_closed() {
            trace!("Ignore {} bytes after close", data.len());
            return Ok(());
        }
        let result = self
            .engine
            .push_input(data, now)
            .and_then(|_| self.handshake.make_progress(&mut self.engine));
        self.check(result)
    }

    /// Advance time. Starts the handshake on a fresh client.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        self.now = now;
        if self.engine.is_failed() {
            return Err(Error::Closed);
        }
        let result = self
            .engine
            .handle_timeout(now)
            .and_then(|_| self.handshake.make_progress(&mut self.engine));
        self.check(result)
    }

    /// Next thing to act on.
    ///
    /// Events come first, then received application data, then packets for
    /// the transport. A closed connection reports [`Output::Closed`] once its
    /// packets are drained. Otherwise the answer is the next timeout.
    pub fn poll_output<'a>(&mut self, buf: &'a mut [u8]) -> Output<'a> {
        if let Some(event) = self.engine.poll_event() {
            return event.into_output(buf);
        }

        let buf = match self.engine.poll_app_data(buf) {
            Ok(data) => return Output::ApplicationData(data),
            Err(b) => b,
        };

        if let Ok(packet) = self.engine.poll_packet(buf) {
            return Output::Packet(packet);
        }

        if self.engine.is_closed() && !self.closed_reported {
            self.closed_reported = true;
            return Output::Closed;
        }

        let timeout = self.engine.poll_timeout().unwrap_or(self.now + DISTANT_FUTURE);
        Output::Timeout(timeout)
    }

    /// Pull outgoing bytes only, for callers that read the transport side
    /// separately. Returns the number of bytes written to `buf`, zero when
    /// nothing is queued.
    pub fn read_output(&mut self, buf: &mut [u8]) -> usize {
        match self.engine.poll_packet(buf) {
            Ok(packet) => packet.len(),
            Err(_) => 0,
        }
    }

    /// Encrypt and queue application data. Data written before the handshake
    /// completes is held back until it does.
    pub fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        let result = self.engine.send_application_data(data);
        self.check(result)
    }

    /// Send close_notify. Queued packets still drain through
    /// [`poll_output`](Self::poll_output).
    pub fn close(&mut self) -> Result<(), Error> {
        let result = self.engine.close();
        self.check(result)
    }

    /// TLS 1.3 only. Switch to new sending keys, asking the peer to do the
    /// same when `request_peer` is set.
    pub fn send_key_update(&mut self, request_peer: bool) -> Result<(), Error> {
        let result = self.engine.send_key_update(request_peer);
        self.check(result)
    }

    pub fn state(&self) -> ConnectionState {
        self.handshake.state()
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_connected() && !self.engine.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.engine.is_closed()
    }

    pub fn is_dtls(&self) -> bool {
        self.engine.is_dtls()
    }

    /// What the completed handshake negotiated.
    pub fn security_parameters(&self) -> Option<&SecurityParameters> {
        self.handshake.security_parameters()
    }

    /// The session this connection established or resumed. Hand it to
    /// [`client_resuming`](Self::client_resuming) to resume later.
    pub fn session(&self) -> Option<&TlsSession> {
        self.handshake.session()
    }

    pub fn peer_certificates(&self) -> &[Vec<u8>] {
        self.security_parameters()
            .map(|sp| sp.peer_certificates())
            .unwrap_or(&[])
    }

    /// Tear down on errors that end the connection.
    fn check<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        let e = match result {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        match e {
            Error::Closed | Error::TransmitQueueFull | Error::ReceiveQueueFull | Error::Config(_) => {}
            _ => {
                warn!("Connection failed in {}: {}", self.handshake.state(), e);
                self.engine.fail(&e);
                self.handshake.fail();
            }
        }
        Err(e)
    }
}
