//! Reliable delivery of DTLS handshake messages (RFC 6347 section 4.2).
//!
//! Outgoing messages are numbered, kept as a flight and fragmented to the
//! MTU. Incoming fragments are reassembled per message_seq and handed out
//! strictly in order. A flight is retransmitted whole when its timer fires,
//! or at once when the peer re-sends its previous flight, which means our
//! answer got lost.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use tinyvec::TinyVec;

use crate::message::{HandshakeHeader, DTLS_HEADER_LEN};
use crate::timer::{ExponentialBackoff, Timeout};
use crate::types::HandshakeType;
use crate::Error;

/// Messages further ahead than this are dropped.
pub(crate) const RECEIVE_WINDOW: u16 = 16;

/// Upper bound for a reassembled message.
pub(crate) const MAX_MESSAGE_LEN: usize = 1 << 17;

/// One entry of an outbound flight, with the epoch it was first sent in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FlightEntry {
    Message {
        seq: u16,
        msg_type: HandshakeType,
        body: Vec<u8>,
        epoch: u16,
    },
    ChangeCipherSpec {
        epoch: u16,
    },
}

/// A complete incoming handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InboundMessage {
    pub msg_type: HandshakeType,
    pub seq: u16,
    pub epoch: u16,
    pub body: Vec<u8>,
}

/// Collects the fragments of one message.
struct Reassembler {
    msg_type: HandshakeType,
    epoch: u16,
    body: Vec<u8>,
    /// Byte ranges not yet received, `[start, end)`.
    missing: TinyVec<[(u32, u32); 4]>,
}

impl Reassembler {
    fn new(msg_type: HandshakeType, length: u32, epoch: u16) -> Self {
        let mut r = Reassembler {
            msg_type,
            epoch,
            body: vec![0; length as usize],
            missing: TinyVec::new(),
        };
        r.reset();
        r
    }

    fn reset(&mut self) {
        self.missing.clear();
        if !self.body.is_empty() {
            self.missing.push((0, self.body.len() as u32));
        }
    }

    fn matches(&self, header: &HandshakeHeader) -> bool {
        self.msg_type == header.msg_type && self.body.len() == header.length as usize
    }

    fn contribute(&mut self, offset: u32, data: &[u8]) {
        let start = offset;
        let end = offset + data.len() as u32;
        self.body[start as usize..end as usize].copy_from_slice(data);

        let mut remaining = TinyVec::new();
        for &(a, b) in self.missing.iter() {
            if end <= a || start >= b {
                remaining.push((a, b));
                continue;
            }
            if a < start {
                remaining.push((a, start));
            }
            if end < b {
                remaining.push((end, b));
            }
        }
        self.missing = remaining;
    }

    fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Handshake message sequencing, reassembly and the retransmission timer.
pub(crate) struct ReliableHandshake {
    next_send_seq: u16,
    next_receive_seq: u16,
    incoming: BTreeMap<u16, Reassembler>,
    /// Messages delivered since our last flight began.
    current_inbound: BTreeMap<u16, (HandshakeType, u32, u16)>,
    /// The peer's flight our current flight answers.
    previous_inbound: BTreeMap<u16, Reassembler>,
    flight: Vec<FlightEntry>,
    backoff: ExponentialBackoff,
    resend: Timeout,
}

impl ReliableHandshake {
    pub fn new(start_rto: Duration, max_rto: Duration) -> Self {
        ReliableHandshake {
            next_send_seq: 0,
            next_receive_seq: 0,
            incoming: BTreeMap::new(),
            current_inbound: BTreeMap::new(),
            previous_inbound: BTreeMap::new(),
            flight: Vec::new(),
            backoff: ExponentialBackoff::new(start_rto, max_rto),
            resend: Timeout::Disabled,
        }
    }

    pub fn next_receive_seq(&self) -> u16 {
        self.next_receive_seq
    }

    pub fn next_send_seq(&self) -> u16 {
        self.next_send_seq
    }

    /// Take the handshake fragments of one record.
    ///
    /// Returns true if the peer completely re-sent a message of the flight
    /// we last answered, which calls for resending our flight.
    pub fn handle_record(&mut self, epoch: u16, mut data: &[u8]) -> bool {
        let mut resend = false;

        while !data.is_empty() {
            let Ok((rest, header)) = HandshakeHeader::parse_dtls(data) else {
                debug!("Drop malformed handshake fragment");
                return resend;
            };
            let len = header.fragment_length as usize;
            if rest.len() < len || !header.is_consistent() {
                debug!("Drop inconsistent handshake fragment {:?}", header);
                return resend;
            }
            let (fragment, rest) = rest.split_at(len);
            data = rest;

            resend |= self.handle_fragment(epoch, &header, fragment);
        }

        resend
    }

    fn handle_fragment(&mut self, epoch: u16, header: &HandshakeHeader, fragment: &[u8]) -> bool {
        let seq = header.message_seq;

        if seq < self.next_receive_seq {
            let Some(r) = self.previous_inbound.get_mut(&seq) else {
                trace!("Drop old handshake fragment seq {}", seq);
                return false;
            };
            if !r.matches(header) {
                return false;
            }
            r.contribute(header.fragment_offset, fragment);
            if !r.is_complete() {
                return false;
            }
            debug!("Peer re-sent message seq {}", seq);
            self.previous_inbound.values_mut().for_each(|r| r.reset());
            return !self.flight.is_empty();
        }

        if seq - self.next_receive_seq >= RECEIVE_WINDOW {
            debug!("Drop handshake fragment seq {} beyond window", seq);
            return false;
        }
        if header.length as usize > MAX_MESSAGE_LEN {
            warn!("Drop handshake message of {} bytes", header.length);
            return false;
        }

        let r = self
            .incoming
            .entry(seq)
            .or_insert_with(|| Reassembler::new(header.msg_type, header.length, epoch));
        if !r.matches(header) {
            warn!(
                "Drop fragment for seq {}: {:?}/{} does not match {:?}/{}",
                seq,
                header.msg_type,
                header.length,
                r.msg_type,
                r.body.len()
            );
            return false;
        }
        r.contribute(header.fragment_offset, fragment);
        false
    }

    /// The next message in sequence, once all its fragments arrived.
    pub fn next_message(&mut self) -> Option<InboundMessage> {
        let seq = self.next_receive_seq;
        if !self.incoming.get(&seq)?.is_complete() {
            return None;
        }
        let r = self.incoming.remove(&seq)?;
        self.next_receive_seq = seq.wrapping_add(1);
        self.current_inbound
            .insert(seq, (r.msg_type, r.body.len() as u32, r.epoch));

        // Whatever the peer sends next acknowledges our flight.
        self.resend = Timeout::Disabled;

        Some(InboundMessage {
            msg_type: r.msg_type,
            seq,
            epoch: r.epoch,
            body: r.body,
        })
    }

    /// Start a new outbound flight. The inbound messages since the last
    /// flight become the flight this one answers.
    pub fn begin_flight(&mut self) {
        self.previous_inbound = std::mem::take(&mut self.current_inbound)
            .into_iter()
            .map(|(seq, (t, len, epoch))| (seq, Reassembler::new(t, len, epoch)))
            .collect();
        self.flight.clear();
        self.backoff.reset();
        self.resend = Timeout::Disabled;
    }

    /// Append a message to the flight and number it.
    pub fn add_message(&mut self, msg_type: HandshakeType, body: Vec<u8>, epoch: u16) -> Result<u16, Error> {
        let seq = self.next_send_seq;
        self.next_send_seq = seq
            .checked_add(1)
            .ok_or_else(|| Error::internal("handshake message sequence exhausted"))?;
        self.flight.push(FlightEntry::Message {
            seq,
            msg_type,
            body,
            epoch,
        });
        Ok(seq)
    }

    pub fn add_change_cipher_spec(&mut self, epoch: u16) {
        self.flight.push(FlightEntry::ChangeCipherSpec { epoch });
    }

    pub fn flight(&self) -> &[FlightEntry] {
        &self.flight
    }

    /// Start the retransmission timer for the flight just sent.
    pub fn arm(&mut self, now: Instant) {
        self.resend = Timeout::Armed(now + self.backoff.rto());
    }

    /// True when the flight is due for retransmission. Re-arms with a
    /// doubled timeout.
    pub fn handle_timeout(&mut self, now: Instant) -> bool {
        if !self.resend.is_expired(now) {
            return false;
        }
        self.backoff.attempt();
        self.resend = Timeout::Armed(now + self.backoff.rto());
        debug!(
            "Flight timeout, attempt {} next in {:.03}s",
            self.backoff.attempts(),
            self.backoff.rto().as_secs_f32()
        );
        true
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        self.resend.deadline()
    }

    /// Handshake done. The side that sent the final flight keeps it, and the
    /// flight it answered, to serve retransmissions of the peer.
    pub fn finish(&mut self, keep_flight: bool) {
        self.resend = Timeout::Disabled;
        self.incoming.clear();
        if !keep_flight {
            self.flight.clear();
            self.previous_inbound.clear();
        }
        self.current_inbound.clear();
    }

    /// Forget everything kept for retransmissions.
    pub fn release(&mut self) {
        self.flight = Vec::new();
        self.previous_inbound.clear();
    }
}

impl fmt::Debug for ReliableHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReliableHandshake")
            .field("next_send_seq", &self.next_send_seq)
            .field("next_receive_seq", &self.next_receive_seq)
            .field("incoming", &self.incoming.keys().collect::<Vec<_>>())
            .field("flight", &self.flight.len())
            .field("resend", &self.resend)
            .finish()
    }
}

/// Split a message into fragments of at most `max_len` bytes each,
/// headers included. An empty body still yields one fragment.
pub(crate) fn fragment_message(
    msg_type: HandshakeType,
    seq: u16,
    body: &[u8],
    max_len: usize,
) -> Result<Vec<Vec<u8>>, Error> {
    if max_len <= DTLS_HEADER_LEN {
        return Err(Error::internal(format!("no room for fragments in {} bytes", max_len)));
    }
    let chunk = max_len - DTLS_HEADER_LEN;

    let mut fragments = Vec::with_capacity(body.len() / chunk + 1);
    let mut offset = 0;
    loop {
        let len = chunk.min(body.len() - offset);
        let mut out = Vec::with_capacity(DTLS_HEADER_LEN + len);
        crate::message::encode_dtls_fragment(msg_type, seq, body, offset, len, &mut out)?;
        fragments.push(out);
        offset += len;
        if offset >= body.len() {
            break;
        }
    }
    Ok(fragments)
}
