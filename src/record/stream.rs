use std::fmt;

use crate::buffer::ByteQueue;
use crate::config::RecordSplitting;
use crate::crypto::record_cipher::{NullCipher, TlsCipher};
use crate::types::{ContentType, ProtocolVersion};
use crate::Error;

use super::{must_not_be_empty, Record, MAX_PLAINTEXT_LEN, TLS_RECORD_HEADER_LEN};

/// Ciphertext may exceed the plaintext limit by this much before TLS 1.3.
const LEGACY_EXPANSION_LIMIT: usize = 2048;

/// TLS 1.3 allows the content type byte and up to 255 bytes of padding.
const TLS13_EXPANSION_LIMIT: usize = 256;

/// Record layer over a reliable byte stream.
///
/// Input is defragmented in a [`ByteQueue`] until a whole record is present.
/// Sequence numbers are implicit and start at 0 whenever a cipher is enabled.
pub(crate) struct StreamRecordLayer {
    input: ByteQueue,
    read_cipher: Box<dyn TlsCipher>,
    write_cipher: Box<dyn TlsCipher>,
    pending_read: Option<Box<dyn TlsCipher>>,
    pending_write: Option<Box<dyn TlsCipher>>,
    read_seq: u64,
    write_seq: u64,
    write_version: ProtocolVersion,
    plaintext_limit: usize,
    splitting: RecordSplitting,
    tls13: bool,
}

impl StreamRecordLayer {
    pub fn new() -> Self {
        StreamRecordLayer {
            input: ByteQueue::new(),
            read_cipher: Box::new(NullCipher),
            write_cipher: Box::new(NullCipher),
            pending_read: None,
            pending_write: None,
            read_seq: 0,
            write_seq: 0,
            // Widely accepted record version for the first ClientHello.
            write_version: ProtocolVersion::Tls1_0,
            plaintext_limit: MAX_PLAINTEXT_LEN,
            splitting: RecordSplitting::Disabled,
            tls13: false,
        }
    }

    pub fn push_input(&mut self, data: &[u8]) {
        self.input.add_data(data);
    }

    /// Bytes received but not yet consumed as records.
    pub fn buffered(&self) -> usize {
        self.input.available()
    }

    pub fn set_write_version(&mut self, version: ProtocolVersion) {
        self.write_version = version;
    }

    pub fn set_plaintext_limit(&mut self, limit: usize) {
        self.plaintext_limit = limit.min(MAX_PLAINTEXT_LEN);
    }

    pub fn plaintext_limit(&self) -> usize {
        self.plaintext_limit
    }

    pub fn set_record_splitting(&mut self, splitting: RecordSplitting) {
        self.splitting = splitting;
    }

    /// TLS 1.3 record rules: smaller expansion limit and unprotected
    /// ChangeCipherSpec records pass through untouched.
    pub fn set_tls13(&mut self) {
        self.tls13 = true;
    }

    fn ciphertext_limit(&self) -> usize {
        let expansion = if self.tls13 {
            TLS13_EXPANSION_LIMIT
        } else {
            LEGACY_EXPANSION_LIMIT
        };
        self.plaintext_limit + expansion
    }

    pub fn next_record(&mut self) -> Result<Option<Record>, Error> {
        let Some(header) = self.input.peek(TLS_RECORD_HEADER_LEN) else {
            return Ok(None);
        };

        let content_type = ContentType::from_value(header[0]);
        let version = ProtocolVersion::from_u16(u16::from_be_bytes([header[1], header[2]]));
        let length = u16::from_be_bytes([header[3], header[4]]) as usize;

        if !content_type.is_recognized() {
            return Err(Error::unexpected(format!(
                "unknown record content type {}",
                content_type.value()
            )));
        }
        if !version.is_tls() {
            return Err(Error::decode(format!("record version {}", version)));
        }
        if length > self.ciphertext_limit() {
            return Err(Error::record_overflow(format!(
                "record of {} bytes exceeds {}",
                length,
                self.ciphertext_limit()
            )));
        }

        if self.input.available() < TLS_RECORD_HEADER_LEN + length {
            return Ok(None);
        }
        self.input.skip(TLS_RECORD_HEADER_LEN);
        let Some(fragment) = self.input.take(length) else {
            return Err(Error::internal("record vanished from input"));
        };

        // Middlebox compatibility records are never protected.
        if self.tls13 && content_type == ContentType::ChangeCipherSpec {
            return Ok(Some(Record {
                content_type,
                epoch: 0,
                fragment,
            }));
        }

        let seq = self.read_seq;
        let (content_type, plaintext) =
            self.read_cipher
                .decode_ciphertext(seq, content_type, version, &fragment)?;
        self.read_seq += 1;

        if plaintext.len() > self.plaintext_limit {
            return Err(Error::record_overflow(format!(
                "plaintext of {} bytes exceeds {}",
                plaintext.len(),
                self.plaintext_limit
            )));
        }
        if plaintext.is_empty() && must_not_be_empty(content_type) {
            return Err(Error::unexpected(format!("empty {} record", content_type)));
        }

        trace!("Read {} record seq {} len {}", content_type, seq, plaintext.len());

        Ok(Some(Record {
            content_type,
            epoch: 0,
            fragment: plaintext,
        }))
    }

    pub fn write_record(&mut self, content_type: ContentType, data: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
        let mut records = Vec::new();

        let mut rest = data;
        if content_type == ContentType::ApplicationData
            && !rest.is_empty()
            && self.write_cipher.needs_record_splitting()
        {
            match self.splitting {
                RecordSplitting::Disabled => {}
                RecordSplitting::ZeroN => {
                    records.push(self.seal(content_type, &[])?);
                }
                RecordSplitting::OneNMinusOne => {
                    records.push(self.seal(content_type, &rest[..1])?);
                    rest = &rest[1..];
                }
            }
        }

        for chunk in rest.chunks(self.plaintext_limit) {
            records.push(self.seal(content_type, chunk)?);
        }

        // A lone empty handshake write never happens, but an empty message
        // body still needs its record.
        if rest.is_empty() && records.is_empty() && content_type != ContentType::ApplicationData {
            records.push(self.seal(content_type, &[])?);
        }

        Ok(records)
    }

    fn seal(&mut self, content_type: ContentType, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        if self.write_seq == u64::MAX {
            return Err(Error::internal("write sequence number exhausted"));
        }
        let seq = self.write_seq;
        let (wire_type, fragment) =
            self.write_cipher
                .encode_plaintext(seq, content_type, self.write_version, plaintext)?;
        self.write_seq += 1;

        let mut record = Vec::with_capacity(TLS_RECORD_HEADER_LEN + fragment.len());
        record.push(wire_type.value());
        record.extend_from_slice(&self.write_version.as_u16().to_be_bytes());
        record.extend_from_slice(&(fragment.len() as u16).to_be_bytes());
        record.extend_from_slice(&fragment);
        Ok(record)
    }

    pub fn set_pending_read(&mut self, cipher: Box<dyn TlsCipher>) {
        self.pending_read = Some(cipher);
    }

    pub fn set_pending_write(&mut self, cipher: Box<dyn TlsCipher>) {
        self.pending_write = Some(cipher);
    }

    pub fn enable_pending_read(&mut self) -> Result<(), Error> {
        let cipher = self
            .pending_read
            .take()
            .ok_or_else(|| Error::internal("no pending read cipher"))?;
        self.read_cipher = cipher;
        self.read_seq = 0;
        debug!("Read cipher enabled");
        Ok(())
    }

    pub fn enable_pending_write(&mut self) -> Result<(), Error> {
        let cipher = self
            .pending_write
            .take()
            .ok_or_else(|| Error::internal("no pending write cipher"))?;
        self.write_cipher = cipher;
        self.write_seq = 0;
        debug!("Write cipher enabled");
        Ok(())
    }

    pub fn shrink(&mut self) {
        self.input.shrink();
    }
}

impl fmt::Debug for StreamRecordLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRecordLayer")
            .field("read_seq", &self.read_seq)
            .field("write_seq", &self.write_seq)
            .field("write_version", &self.write_version)
            .field("plaintext_limit", &self.plaintext_limit)
            .finish_non_exhaustive()
    }
}
