use std::fmt;

use crate::codec::U48_MAX;
use crate::crypto::record_cipher::{NullCipher, TlsCipher};
use crate::types::{ContentType, ProtocolVersion};
use crate::window::ReplayWindow;
use crate::Error;

use super::{must_not_be_empty, Record, DTLS_RECORD_HEADER_LEN, MAX_PLAINTEXT_LEN};

const EXPANSION_LIMIT: usize = 2048;

struct ReadEpoch {
    epoch: u16,
    cipher: Box<dyn TlsCipher>,
    window: ReplayWindow,
}

struct WriteEpoch {
    epoch: u16,
    cipher: Box<dyn TlsCipher>,
    seq: u64,
}

impl ReadEpoch {
    fn new(epoch: u16, cipher: Box<dyn TlsCipher>) -> Self {
        ReadEpoch {
            epoch,
            cipher,
            window: ReplayWindow::new(),
        }
    }
}

/// Record layer over datagrams (RFC 6347 section 4.1).
///
/// Every record names its epoch and carries an explicit 48-bit sequence
/// number. Anything that fails to parse, decrypt or pass the replay check is
/// dropped without an alert.
///
/// Three read epochs are tracked: the current one, the pending one the next
/// ChangeCipherSpec switches to, and the previous one kept so a peer's
/// retransmitted final flight stays readable. On the write side the previous
/// epoch is kept to retransmit messages first sent in it.
pub(crate) struct DatagramRecordLayer {
    datagram: Vec<u8>,
    pos: usize,
    read_current: ReadEpoch,
    read_pending: Option<Box<dyn TlsCipher>>,
    read_retained: Option<ReadEpoch>,
    write_current: WriteEpoch,
    write_pending: Option<Box<dyn TlsCipher>>,
    write_retransmit: Option<WriteEpoch>,
    write_version: ProtocolVersion,
    plaintext_limit: usize,
}

impl DatagramRecordLayer {
    pub fn new() -> Self {
        DatagramRecordLayer {
            datagram: Vec::new(),
            pos: 0,
            read_current: ReadEpoch::new(0, Box::new(NullCipher)),
            read_pending: None,
            read_retained: None,
            write_current: WriteEpoch {
                epoch: 0,
                cipher: Box::new(NullCipher),
                seq: 0,
            },
            write_pending: None,
            write_retransmit: None,
            write_version: ProtocolVersion::Dtls1_0,
            plaintext_limit: MAX_PLAINTEXT_LEN,
        }
    }

    /// Start reading a new datagram. Unread bytes of the previous one are lost.
    pub fn push_datagram(&mut self, datagram: &[u8]) {
        self.datagram.clear();
        self.datagram.extend_from_slice(datagram);
        self.pos = 0;
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

    pub fn read_epoch(&self) -> u16 {
        self.read_current.epoch
    }

    pub fn write_epoch(&self) -> u16 {
        self.write_current.epoch
    }

    /// Largest plaintext a record of at most `limit` bytes carries in the
    /// current write epoch.
    pub fn max_plaintext(&self, limit: usize) -> usize {
        let mut len = limit
            .saturating_sub(DTLS_RECORD_HEADER_LEN)
            .min(self.plaintext_limit);
        while len > 0 && DTLS_RECORD_HEADER_LEN + len + self.write_current.cipher.expansion(len) > limit {
            len -= 1;
        }
        len
    }

    /// The next record of the current datagram that survives all checks.
    pub fn next_record(&mut self) -> Option<Record> {
        loop {
            let rest = &self.datagram[self.pos..];
            if rest.len() < DTLS_RECORD_HEADER_LEN {
                if !rest.is_empty() {
                    trace!("Discard {} trailing bytes", rest.len());
                }
                self.pos = self.datagram.len();
                return None;
            }

            let content_type = ContentType::from_value(rest[0]);
            let version = ProtocolVersion::from_u16(u16::from_be_bytes([rest[1], rest[2]]));
            let epoch = u16::from_be_bytes([rest[3], rest[4]]);
            let mut seq_bytes = [0u8; 8];
            seq_bytes[2..].copy_from_slice(&rest[5..11]);
            let seq = u64::from_be_bytes(seq_bytes);
            let length = u16::from_be_bytes([rest[11], rest[12]]) as usize;

            if rest.len() < DTLS_RECORD_HEADER_LEN + length {
                trace!("Discard truncated record of {} bytes", length);
                self.pos = self.datagram.len();
                return None;
            }
            let start = self.pos + DTLS_RECORD_HEADER_LEN;
            self.pos = start + length;

            if let Some(record) = self.open(content_type, version, epoch, seq, start, length) {
                return Some(record);
            }
        }
    }

    fn open(
        &mut self,
        content_type: ContentType,
        version: ProtocolVersion,
        epoch: u16,
        seq: u64,
        start: usize,
        length: usize,
    ) -> Option<Record> {
        if !content_type.is_recognized() || !version.is_dtls() {
            trace!("Drop record type {} version {}", content_type, version);
            return None;
        }
        if length > self.plaintext_limit + EXPANSION_LIMIT {
            trace!("Drop oversized record of {} bytes", length);
            return None;
        }

        let current = self.read_current.epoch;
        let read = if epoch == current {
            &mut self.read_current
        } else {
            match &mut self.read_retained {
                Some(r) if r.epoch == epoch => r,
                _ => {
                    trace!("Drop record from epoch {} (current {})", epoch, current);
                    return None;
                }
            }
        };

        if read.window.should_discard(seq) {
            trace!("Drop replayed record epoch {} seq {}", epoch, seq);
            return None;
        }

        let nonce_seq = ((epoch as u64) << 48) | seq;
        let fragment = &self.datagram[start..start + length];
        let (content_type, plaintext) =
            match read
                .cipher
                .decode_ciphertext(nonce_seq, content_type, version, fragment)
            {
                Ok(v) => v,
                Err(e) => {
                    debug!("Drop record epoch {} seq {}: {}", epoch, seq, e);
                    return None;
                }
            };

        if plaintext.len() > self.plaintext_limit {
            debug!("Drop record with {} bytes of plaintext", plaintext.len());
            return None;
        }
        if plaintext.is_empty() && must_not_be_empty(content_type) {
            debug!("Drop empty {} record", content_type);
            return None;
        }

        read.window.report_authenticated(seq);

        match content_type {
            ContentType::ChangeCipherSpec => {
                if plaintext != [1] {
                    debug!("Drop malformed ChangeCipherSpec");
                    return None;
                }
                if epoch == current {
                    self.promote_read();
                }
                None
            }
            ContentType::ApplicationData if epoch == current => {
                if self.read_retained.take().is_some() {
                    debug!("Peer is sending in epoch {}, forget epoch {}", epoch, epoch.wrapping_sub(1));
                    self.write_retransmit = None;
                }
                Some(Record {
                    content_type,
                    epoch,
                    fragment: plaintext,
                })
            }
            _ => Some(Record {
                content_type,
                epoch,
                fragment: plaintext,
            }),
        }
    }

    fn promote_read(&mut self) {
        let Some(cipher) = self.read_pending.take() else {
            trace!("Drop ChangeCipherSpec without pending read epoch");
            return;
        };
        let next = ReadEpoch::new(self.read_current.epoch.wrapping_add(1), cipher);
        let previous = std::mem::replace(&mut self.read_current, next);
        debug!("Read epoch {}", self.read_current.epoch);
        self.read_retained = Some(previous);
    }

    pub fn set_pending_read(&mut self, cipher: Box<dyn TlsCipher>) {
        self.read_pending = Some(cipher);
    }

    pub fn set_pending_write(&mut self, cipher: Box<dyn TlsCipher>) {
        self.write_pending = Some(cipher);
    }

    pub fn enable_pending_write(&mut self) -> Result<(), Error> {
        let cipher = self
            .write_pending
            .take()
            .ok_or_else(|| Error::internal("no pending write cipher"))?;
        let epoch = self
            .write_current
            .epoch
            .checked_add(1)
            .ok_or_else(|| Error::internal("write epoch exhausted"))?;
        let next = WriteEpoch {
            epoch,
            cipher,
            seq: 0,
        };
        let previous = std::mem::replace(&mut self.write_current, next);
        self.write_retransmit = Some(previous);
        debug!("Write epoch {}", epoch);
        Ok(())
    }

    /// Forget the epochs kept for retransmissions.
    pub fn discard_previous_epochs(&mut self) {
        self.read_retained = None;
        self.write_retransmit = None;
    }

    pub fn write_record(&mut self, content_type: ContentType, data: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
        let epoch = self.write_current.epoch;
        let mut records = Vec::new();
        for chunk in data.chunks(self.plaintext_limit) {
            if let Some(r) = self.seal_in_epoch(epoch, content_type, chunk)? {
                records.push(r);
            }
        }
        if data.is_empty() && content_type != ContentType::ApplicationData {
            if let Some(r) = self.seal_in_epoch(epoch, content_type, &[])? {
                records.push(r);
            }
        }
        Ok(records)
    }

    /// Protect one record in `epoch`. `None` if that epoch is gone.
    pub fn seal_in_epoch(
        &mut self,
        epoch: u16,
        content_type: ContentType,
        plaintext: &[u8],
    ) -> Result<Option<Vec<u8>>, Error> {
        let version = self.write_version;
        let target = if epoch == self.write_current.epoch {
            &mut self.write_current
        } else {
            match &mut self.write_retransmit {
                Some(w) if w.epoch == epoch => w,
                _ => return Ok(None),
            }
        };

        if target.seq > U48_MAX {
            return Err(Error::internal("record sequence number exhausted"));
        }
        let seq = target.seq;
        let nonce_seq = ((epoch as u64) << 48) | seq;
        let (wire_type, fragment) = target
            .cipher
            .encode_plaintext(nonce_seq, content_type, version, plaintext)?;
        target.seq += 1;

        let mut record = Vec::with_capacity(DTLS_RECORD_HEADER_LEN + fragment.len());
        record.push(wire_type.value());
        record.extend_from_slice(&version.as_u16().to_be_bytes());
        record.extend_from_slice(&epoch.to_be_bytes());
        record.extend_from_slice(&seq.to_be_bytes()[2..]);
        record.extend_from_slice(&(fragment.len() as u16).to_be_bytes());
        record.extend_from_slice(&fragment);
        Ok(Some(record))
    }

    pub fn shrink(&mut self) {
        self.datagram = Vec::new();
        self.pos = 0;
    }
}

impl fmt::Debug for DatagramRecordLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatagramRecordLayer")
            .field("read_epoch", &self.read_current.epoch)
            .field("read_pending", &self.read_pending.is_some())
            .field("read_retained", &self.read_retained.as_ref().map(|r| r.epoch))
            .field("write_epoch", &self.write_current.epoch)
            .field("write_seq", &self.write_current.seq)
            .field("write_retransmit", &self.write_retransmit.as_ref().map(|w| w.epoch))
            .finish_non_exhaustive()
    }
}
