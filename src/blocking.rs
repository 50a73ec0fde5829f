//! Blocking use over a transport.
//!
//! [`BlockingConnection`] drives a [`Connection`] from the calling thread.
//! The connection sits behind a mutex that is held while processing and
//! while sending, never while waiting in [`Transport::receive`]. A writer
//! thread and a reader thread can therefore share one connection.

use std::collections::VecDeque;
use std::io;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::connection::{Connection, Output};
use crate::Error;

/// Transport under a [`BlockingConnection`].
pub trait Transport: Send + Sync {
    /// Wait up to `timeout` (forever when `None`) for input. `Ok(None)` means
    /// the timeout passed. `Ok(Some(0))` is end of stream.
    ///
    /// A datagram transport returns exactly one datagram.
    fn receive(&self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<Option<usize>>;

    fn send(&self, buf: &[u8]) -> io::Result<()>;

    /// Largest single send, when the transport has one.
    fn max_send_size(&self) -> Option<usize> {
        None
    }
}

const BUFFER_SIZE: usize = 18 * 1024;

struct Inner {
    conn: Connection,
    /// Application data pulled out while flushing.
    received: VecDeque<u8>,
    deadline: Option<Instant>,
    closed: bool,
}

pub struct BlockingConnection<T: Transport> {
    inner: Mutex<Inner>,
    transport: T,
}

impl<T: Transport> BlockingConnection<T> {
    pub fn new(conn: Connection, transport: T) -> Self {
        BlockingConnection {
            inner: Mutex::new(Inner {
                conn,
                received: VecDeque::new(),
                deadline: None,
                closed: false,
            }),
            transport,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking holder leaves the connection consistent enough to fail.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run the handshake to completion.
    pub fn handshake(&self) -> Result<(), Error> {
        {
            let mut inner = self.lock();
            inner.conn.handle_timeout(Instant::now())?;
            self.flush(&mut inner)?;
        }
        loop {
            {
                let inner = self.lock();
                if inner.conn.is_connected() {
                    return Ok(());
                }
                if inner.closed {
                    return Err(Error::Closed);
                }
            }
            self.receive_once()?;
        }
    }

    /// Read application data. Returns 0 once the peer closed.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, Error> {
        loop {
            {
                let mut inner = self.lock();
                if !inner.received.is_empty() {
                    let n = buf.len().min(inner.received.len());
                    for (d, s) in buf.iter_mut().zip(inner.received.drain(..n)) {
                        *d = s;
                    }
                    return Ok(n);
                }
                if inner.closed {
                    return Ok(0);
                }
            }
            self.receive_once()?;
        }
    }

    /// Write application data, starting the handshake if needed.
    pub fn write(&self, data: &[u8]) -> Result<(), Error> {
        let mut inner = self.lock();
        match self.transport.max_send_size() {
            Some(max) if !inner.conn.is_dtls() => {
                for chunk in data.chunks(max.max(1)) {
                    inner.conn.send_application_data(chunk)?;
                }
            }
            _ => inner.conn.send_application_data(data)?,
        }
        self.flush(&mut inner)
    }

    /// Send close_notify.
    pub fn close(&self) -> Result<(), Error> {
        let mut inner = self.lock();
        inner.conn.close()?;
        self.flush(&mut inner)
    }

    /// Run `f` against the connection, e.g. to read its parameters.
    pub fn with_connection<R>(&self, f: impl FnOnce(&Connection) -> R) -> R {
        f(&self.lock().conn)
    }

    /// One blocking receive, bounded by the connection's next deadline.
    fn receive_once(&self) -> Result<(), Error> {
        let timeout = {
            let inner = self.lock();
            inner
                .deadline
                .map(|d| d.saturating_duration_since(Instant::now()))
        };

        let mut buf = vec![0u8; BUFFER_SIZE];
        let received = self.transport.receive(&mut buf, timeout)?;

        let mut inner = self.lock();
        match received {
            Some(0) => {
                debug!("Transport reached end of stream");
                inner.closed = true;
                if !inner.conn.is_closed() {
                    return Err(Error::Io(io::ErrorKind::UnexpectedEof.into()));
                }
            }
            Some(n) => inner.conn.handle_input(&buf[..n], Instant::now())?,
            None => inner.conn.handle_timeout(Instant::now())?,
        }
        self.flush(&mut inner)
    }

    /// Send queued packets and collect everything else the connection has.
    fn flush(&self, inner: &mut Inner) -> Result<(), Error> {
        let mut buf = vec![0u8; BUFFER_SIZE];
        loop {
            match inner.conn.poll_output(&mut buf) {
                Output::Packet(p) => self.transport.send(p)?,
                Output::ApplicationData(data) => inner.received.extend(data),
                Output::Connected => debug!("Blocking connection established"),
                Output::PeerCert(cert) => trace!("Peer certificate of {} bytes", cert.len()),
                Output::Closed => inner.closed = true,
                Output::Timeout(t) => {
                    inner.deadline = Some(t);
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
    use std::sync::Arc;

    use crate::types::{CipherSuite, ProtocolVersion};
    use crate::Config;

    struct Pipe {
        tx: Sender<Vec<u8>>,
        rx: Mutex<Receiver<Vec<u8>>>,
    }

    impl Transport for Pipe {
        fn receive(&self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<Option<usize>> {
            let rx = self.rx.lock().unwrap();
            let data = match timeout {
                Some(t) => match rx.recv_timeout(t) {
                    Ok(d) => d,
                    Err(RecvTimeoutError::Timeout) => return Ok(None),
                    Err(RecvTimeoutError::Disconnected) => return Ok(Some(0)),
                },
                None => rx.recv().unwrap_or_default(),
            };
            buf[..data.len()].copy_from_slice(&data);
            Ok(Some(data.len()))
        }

        fn send(&self, buf: &[u8]) -> io::Result<()> {
            self.tx
                .send(buf.to_vec())
                .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    fn pipes() -> (Pipe, Pipe) {
        let (a_tx, b_rx) = channel();
        let (b_tx, a_rx) = channel();
        (
            Pipe {
                tx: a_tx,
                rx: Mutex::new(a_rx),
            },
            Pipe {
                tx: b_tx,
                rx: Mutex::new(b_rx),
            },
        )
    }

    #[test]
    fn threads_handshake_and_echo() {
        let psk = || {
            Config::builder()
                .versions(ProtocolVersion::Tls1_2, ProtocolVersion::Tls1_2)
                .cipher_suites([CipherSuite::TLS_PSK_WITH_AES_128_GCM_SHA256])
        };
        let mut store = std::collections::HashMap::new();
        store.insert(b"me".to_vec(), vec![3u8; 32]);
        let client_config = Arc::new(psk().psk(b"me".to_vec(), vec![3u8; 32]).build().unwrap());
        let server_config = Arc::new(psk().psk_store(Arc::new(store)).build().unwrap());

        let (a, b) = pipes();
        let now = Instant::now();
        let server = BlockingConnection::new(Connection::server(server_config, now), b);
        let handle = std::thread::spawn(move || {
            server.handshake().unwrap();
            let mut buf = [0u8; 64];
            let n = server.read(&mut buf).unwrap();
            server.write(&buf[..n]).unwrap();
        });

        let client = BlockingConnection::new(Connection::client(client_config, now), a);
        client.handshake().unwrap();
        client.write(b"hello").unwrap();
        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        handle.join().unwrap();
    }
}
