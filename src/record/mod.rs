//! Record layers.
//!
//! Both layers take transport bytes in, hand decrypted records out one at a
//! time, and frame outgoing plaintext. Records are surfaced one by one since
//! processing a handshake message can change the read cipher for the very
//! next record in the same input.

use crate::crypto::record_cipher::TlsCipher;
use crate::types::{ContentType, ProtocolVersion};
use crate::Error;

mod datagram;
mod heartbeat;
mod stream;

pub(crate) use datagram::DatagramRecordLayer;
pub(crate) use heartbeat::Heartbeat;
pub(crate) use stream::StreamRecordLayer;

/// Largest plaintext fragment (RFC 5246 section 6.2.1).
pub(crate) const MAX_PLAINTEXT_LEN: usize = 16384;

pub(crate) const TLS_RECORD_HEADER_LEN: usize = 5;
pub(crate) const DTLS_RECORD_HEADER_LEN: usize = 13;

/// A decrypted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Record {
    pub content_type: ContentType,
    /// Always 0 on a stream.
    pub epoch: u16,
    pub fragment: Vec<u8>,
}

/// Record layer of a connection.
#[derive(Debug)]
pub(crate) enum RecordLayer {
    Stream(StreamRecordLayer),
    Datagram(DatagramRecordLayer),
}

impl RecordLayer {
    pub fn new(dtls: bool) -> Self {
        if dtls {
            RecordLayer::Datagram(DatagramRecordLayer::new())
        } else {
            RecordLayer::Stream(StreamRecordLayer::new())
        }
    }

    pub fn is_datagram(&self) -> bool {
        matches!(self, RecordLayer::Datagram(_))
    }

    /// Feed transport input. For datagrams this is exactly one datagram.
    pub fn push_input(&mut self, data: &[u8]) {
        match self {
            RecordLayer::Stream(s) => s.push_input(data),
            RecordLayer::Datagram(d) => d.push_datagram(data),
        }
    }

    /// The next complete record. Datagram failures are dropped silently and
    /// never surface as errors.
    pub fn next_record(&mut self) -> Result<Option<Record>, Error> {
        match self {
            RecordLayer::Stream(s) => s.next_record(),
            RecordLayer::Datagram(d) => Ok(d.next_record()),
        }
    }

    /// Protect and frame `data` in the current write epoch.
    ///
    /// The result holds one or more complete records.
    pub fn write_record(&mut self, content_type: ContentType, data: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
        match self {
            RecordLayer::Stream(s) => s.write_record(content_type, data),
            RecordLayer::Datagram(d) => d.write_record(content_type, data),
        }
    }

    pub fn set_write_version(&mut self, version: ProtocolVersion) {
        match self {
            RecordLayer::Stream(s) => s.set_write_version(version),
            RecordLayer::Datagram(d) => d.set_write_version(version),
        }
    }

    pub fn set_plaintext_limit(&mut self, limit: usize) {
        match self {
            RecordLayer::Stream(s) => s.set_plaintext_limit(limit),
            RecordLayer::Datagram(d) => d.set_plaintext_limit(limit),
        }
    }

    pub fn plaintext_limit(&self) -> usize {
        match self {
            RecordLayer::Stream(s) => s.plaintext_limit(),
            RecordLayer::Datagram(d) => d.plaintext_limit(),
        }
    }

    pub fn set_pending_read(&mut self, cipher: Box<dyn TlsCipher>) {
        match self {
            RecordLayer::Stream(s) => s.set_pending_read(cipher),
            RecordLayer::Datagram(d) => d.set_pending_read(cipher),
        }
    }

    pub fn set_pending_write(&mut self, cipher: Box<dyn TlsCipher>) {
        match self {
            RecordLayer::Stream(s) => s.set_pending_write(cipher),
            RecordLayer::Datagram(d) => d.set_pending_write(cipher),
        }
    }

    /// Promote the pending write cipher. On datagrams this starts a new epoch.
    pub fn enable_pending_write(&mut self) -> Result<(), Error> {
        match self {
            RecordLayer::Stream(s) => s.enable_pending_write(),
            RecordLayer::Datagram(d) => d.enable_pending_write(),
        }
    }

    /// Release buffers held for the handshake.
    pub fn shrink(&mut self) {
        match self {
            RecordLayer::Stream(s) => s.shrink(),
            RecordLayer::Datagram(d) => d.shrink(),
        }
    }

    pub fn as_stream(&mut self) -> Option<&mut StreamRecordLayer> {
        match self {
            RecordLayer::Stream(s) => Some(s),
            RecordLayer::Datagram(_) => None,
        }
    }

    pub fn as_datagram(&mut self) -> Option<&mut DatagramRecordLayer> {
        match self {
            RecordLayer::Stream(_) => None,
            RecordLayer::Datagram(d) => Some(d),
        }
    }
}

/// Content types that must never arrive as an empty fragment.
fn must_not_be_empty(content_type: ContentType) -> bool {
    matches!(
        content_type,
        ContentType::Handshake | ContentType::Alert | ContentType::ChangeCipherSpec
    )
}
