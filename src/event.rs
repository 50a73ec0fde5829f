//! Local events.
//!
//! Queued by the engine and the state machines, delivered through
//! [`Connection::poll_output`](crate::Connection::poll_output) ahead of any
//! other output.

use crate::Output;

/// Events queued for delivery to the application.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LocalEvent {
    /// The peer presented this end-entity certificate (DER).
    PeerCert(Vec<u8>),
    /// Handshake completed.
    Connected,
}

impl LocalEvent {
    /// Convert this event into an `Output`, copying certificate bytes into `buf`.
    ///
    /// A certificate that does not fit is truncated to `buf` with a warning.
    pub(crate) fn into_output(self, buf: &mut [u8]) -> Output<'_> {
        match self {
            LocalEvent::PeerCert(cert) => {
                if cert.len() > buf.len() {
                    warn!(
                        "Buffer of {} bytes too small for peer certificate of {}",
                        buf.len(),
                        cert.len()
                    );
                }
                let l = cert.len().min(buf.len());
                buf[..l].copy_from_slice(&cert[..l]);
                Output::PeerCert(&buf[..l])
            }
            LocalEvent::Connected => Output::Connected,
        }
    }
}
