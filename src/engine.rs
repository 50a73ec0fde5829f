//! Transport plumbing shared by the client and server state machines.
//!
//! The engine owns the record layer, the DTLS reliability layer and the
//! output queues. The state machines pull handshake messages out of it with
//! [`Engine::next_incoming`] and push their own messages back in. Everything
//! that is not a handshake message (alerts, application data, heartbeats) is
//! dealt with here.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use crate::buffer::{Buf, BufferPool, ByteQueue};
use crate::crypto::key_schedule::next_traffic_secret;
use crate::crypto::record_cipher::{tls13_cipher, TlsCipher};
use crate::crypto::{CryptoProvider, Secret};
use crate::event::LocalEvent;
use crate::message::{encode_dtls, encode_tls, Alert, HeartbeatMessage, KeyUpdate, TLS_HEADER_LEN};
use crate::record::{Heartbeat, RecordLayer};
use crate::reliable::{fragment_message, FlightEntry, ReliableHandshake, MAX_MESSAGE_LEN};
use crate::timer::{ExponentialBackoff, Timeout};
use crate::types::{AlertDescription, AlertLevel, CipherSuite, ContentType, HandshakeType};
use crate::types::{HeartbeatMode, KeyUpdateRequest, ProtocolVersion};
use crate::{Config, Error};

/// A complete handshake message.
#[derive(Debug, Clone)]
pub(crate) struct HandshakeMessage {
    pub msg_type: HandshakeType,
    /// Epoch the message arrived in. Always 0 on a stream.
    pub epoch: u16,
    pub body: Vec<u8>,
    /// The message as it enters the transcript.
    pub raw: Vec<u8>,
}

/// What the state machines get to see.
#[derive(Debug)]
pub(crate) enum Incoming {
    Handshake(HandshakeMessage),
    /// Stream only. On datagrams the record layer consumes it.
    ChangeCipherSpec,
}

/// TLS 1.3 application traffic secrets, kept for KeyUpdate.
struct TrafficSecrets {
    suite: CipherSuite,
    local: Secret,
    peer: Secret,
}

pub(crate) struct Engine {
    config: Arc<Config>,
    record: RecordLayer,
    reliable: Option<ReliableHandshake>,

    /// Stream handshake bytes waiting to form complete messages.
    handshake_in: ByteQueue,

    buffers: BufferPool,
    queue_tx: VecDeque<Buf>,
    /// Bytes of the front of `queue_tx` already handed out (stream only).
    tx_offset: usize,

    queue_rx: VecDeque<Vec<u8>>,
    rx_offset: usize,

    /// Application data written before the handshake completed.
    pending_app: VecDeque<Vec<u8>>,

    events: VecDeque<LocalEvent>,
    heartbeat: Option<Heartbeat>,
    handshake_deadline: Timeout,
    traffic: Option<TrafficSecrets>,
    now: Instant,

    /// The peer's flight was already resent for the current input.
    resent: bool,
    connected: bool,
    tls13: bool,
    closed: bool,
    failed: bool,
    peer_closed: bool,
}

impl Engine {
    pub fn new(config: Arc<Config>, now: Instant) -> Self {
        let mut record = RecordLayer::new(config.is_dtls());
        if let Some(stream) = record.as_stream() {
            stream.set_record_splitting(config.record_splitting());
        }
        let reliable = config
            .is_dtls()
            .then(|| ReliableHandshake::new(config.flight_start_rto(), config.flight_max_rto()));
        let handshake_deadline = Timeout::Armed(now + config.handshake_timeout());

        Engine {
            config,
            record,
            reliable,
            handshake_in: ByteQueue::new(),
            buffers: BufferPool::default(),
            queue_tx: VecDeque::new(),
            tx_offset: 0,
            queue_rx: VecDeque::new(),
            rx_offset: 0,
            pending_app: VecDeque::new(),
            events: VecDeque::new(),
            heartbeat: None,
            handshake_deadline,
            traffic: None,
            now,
            resent: false,
            connected: false,
            tls13: false,
            closed: false,
            failed: false,
            peer_closed: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// An owned handle, for holding the config across mutable engine calls.
    pub fn config_handle(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    pub fn provider(&self) -> &CryptoProvider {
        self.config.crypto_provider()
    }

    pub fn is_dtls(&self) -> bool {
        self.reliable.is_some()
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn is_tls13(&self) -> bool {
        self.tls13
    }

    /// Current DTLS read epoch. 0 on a stream.
    pub fn read_epoch(&mut self) -> u16 {
        self.record.as_datagram().map(|d| d.read_epoch()).unwrap_or(0)
    }

    pub fn push_event(&mut self, event: LocalEvent) {
        self.events.push_back(event);
    }

    pub fn poll_event(&mut self) -> Option<LocalEvent> {
        self.events.pop_front()
    }

    /// Feed transport input. A datagram transport gets exactly one datagram.
    pub fn push_input(&mut self, data: &[u8], now: Instant) -> Result<(), Error> {
        self.now = now;
        if self.queue_rx.len() >= self.config.max_queue_rx() {
            return Err(Error::ReceiveQueueFull);
        }
        self.resent = false;
        self.record.push_input(data);
        Ok(())
    }

    /// The next handshake message or ChangeCipherSpec.
    ///
    /// Records are read one at a time so that a message that changes the read
    /// cipher is acted on before the next record is opened.
    pub fn next_incoming(&mut self) -> Result<Option<Incoming>, Error> {
        loop {
            if let Some(m) = self.buffered_handshake()? {
                return Ok(Some(Incoming::Handshake(m)));
            }
            if self.peer_closed || self.failed {
                return Ok(None);
            }

            let Some(record) = self.record.next_record()? else {
                return Ok(None);
            };
            if let Some(hb) = &mut self.heartbeat {
                hb.on_activity(self.now);
            }

            match record.content_type {
                ContentType::Handshake => self.handle_handshake_record(record.epoch, &record.fragment)?,
                ContentType::ChangeCipherSpec => {
                    if record.fragment != [1] {
                        return Err(Error::unexpected("malformed change cipher spec"));
                    }
                    if !self.handshake_in.is_empty() {
                        return Err(Error::unexpected("change cipher spec inside a handshake message"));
                    }
                    return Ok(Some(Incoming::ChangeCipherSpec));
                }
                ContentType::Alert => self.handle_alert(&record.fragment)?,
                ContentType::ApplicationData => self.handle_application_data(record.epoch, record.fragment)?,
                ContentType::Heartbeat => self.handle_heartbeat(&record.fragment)?,
                ContentType::Unknown(t) => {
                    if !self.is_dtls() {
                        return Err(Error::unexpected(format!("unknown content type {}", t)));
                    }
                    trace!("Drop record of unknown content type {}", t);
                }
            }
        }
    }

    fn buffered_handshake(&mut self) -> Result<Option<HandshakeMessage>, Error> {
        if let Some(reliable) = &mut self.reliable {
            let Some(m) = reliable.next_message() else {
                return Ok(None);
            };
            let raw = encode_dtls(m.msg_type, m.seq, &m.body)?;
            return Ok(Some(HandshakeMessage {
                msg_type: m.msg_type,
                epoch: m.epoch,
                body: m.body,
                raw,
            }));
        }

        let Some(header) = self.handshake_in.peek(TLS_HEADER_LEN) else {
            return Ok(None);
        };
        let msg_type = HandshakeType::from_value(header[0]);
        let len = u32::from_be_bytes([0, header[1], header[2], header[3]]) as usize;
        if len > MAX_MESSAGE_LEN {
            return Err(Error::decode(format!("{} of {} bytes is too long", msg_type, len)));
        }
        let Some(raw) = self.handshake_in.take(TLS_HEADER_LEN + len) else {
            return Ok(None);
        };
        let body = raw[TLS_HEADER_LEN..].to_vec();
        Ok(Some(HandshakeMessage {
            msg_type,
            epoch: 0,
            body,
            raw,
        }))
    }

    fn handle_handshake_record(&mut self, epoch: u16, data: &[u8]) -> Result<(), Error> {
        let Some(reliable) = &mut self.reliable else {
            self.handshake_in.add_data(data);
            return Ok(());
        };
        if reliable.handle_record(epoch, data) && !self.resent {
            self.resent = true;
            debug!("Peer retransmitted, resend our flight");
            self.resend_flight()?;
        }
        Ok(())
    }

    fn handle_alert(&mut self, fragment: &[u8]) -> Result<(), Error> {
        let alert = match Alert::decode(fragment) {
            Ok(a) => a,
            Err(e) if self.is_dtls() => {
                debug!("Drop malformed alert: {}", e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match alert.level {
            AlertLevel::Fatal => {
                warn!("Peer sent fatal alert {}", alert.description);
                return Err(Error::PeerAlert(alert.description));
            }
            AlertLevel::Unknown(l) => {
                return Err(Error::illegal_parameter(format!("alert level {}", l)));
            }
            AlertLevel::Warning => {}
        }

        match alert.description {
            AlertDescription::CloseNotify => {
                if !self.connected {
                    return Err(Error::handshake_failure("close_notify during handshake"));
                }
                debug!("Peer closed the connection");
                if !self.closed {
                    self.send_alert(Alert::warning(AlertDescription::CloseNotify))?;
                }
                self.peer_closed = true;
                self.closed = true;
                self.pending_app.clear();
                self.heartbeat = None;
            }
            d if self.tls13 && !d.is_closure() => {
                warn!("Peer sent alert {} as warning", d);
                return Err(Error::PeerAlert(d));
            }
            AlertDescription::UserCanceled | AlertDescription::NoRenegotiation => {
                debug!("Ignore warning alert {}", alert.description);
            }
            d => warn!("Ignore warning alert {}", d),
        }
        Ok(())
    }

    fn handle_application_data(&mut self, epoch: u16, data: Vec<u8>) -> Result<(), Error> {
        if !self.connected {
            if self.is_dtls() {
                debug!("Drop application data before handshake completion");
                return Ok(());
            }
            return Err(Error::unexpected("application data before handshake completion"));
        }
        if self.is_dtls() && epoch != self.read_epoch() {
            debug!("Drop application data in epoch {}", epoch);
            return Ok(());
        }
        if data.is_empty() || self.closed {
            return Ok(());
        }
        self.queue_rx.push_back(data);
        Ok(())
    }

    fn handle_heartbeat(&mut self, fragment: &[u8]) -> Result<(), Error> {
        let dtls = self.is_dtls();
        let provider = self.config.crypto_provider();
        let Some(hb) = self.heartbeat.as_mut().filter(|_| self.connected) else {
            if dtls {
                debug!("Drop heartbeat, not negotiated");
                return Ok(());
            }
            return Err(Error::unexpected("heartbeat not negotiated"));
        };
        let Some(message) = HeartbeatMessage::decode(fragment) else {
            debug!("Drop malformed heartbeat");
            return Ok(());
        };
        let response = hb.handle_message(self.now, &message, provider)?;
        if let Some(r) = response {
            self.send_heartbeat(&r)?;
        }
        Ok(())
    }

    fn send_heartbeat(&mut self, message: &HeartbeatMessage) -> Result<(), Error> {
        let mut out = Vec::new();
        message.serialize(&mut out)?;
        self.write(ContentType::Heartbeat, &out)
    }

    pub fn send_alert(&mut self, alert: Alert) -> Result<(), Error> {
        debug!("Send alert {:?} {}", alert.level, alert.description);
        let mut out = Vec::with_capacity(2);
        alert.serialize(&mut out);
        self.write(ContentType::Alert, &out)
    }

    fn write(&mut self, content_type: ContentType, data: &[u8]) -> Result<(), Error> {
        for record in self.record.write_record(content_type, data)? {
            self.queue_record(&record);
        }
        Ok(())
    }

    /// Datagram records share a datagram while they fit the MTU.
    fn queue_record(&mut self, record: &[u8]) {
        let mtu = self.config.mtu();
        if self.is_dtls() {
            if let Some(back) = self.queue_tx.back_mut() {
                if back.len() + record.len() <= mtu {
                    back.extend_from_slice(record);
                    return;
                }
            }
        }
        let mut buf = self.buffers.pop();
        buf.extend_from_slice(record);
        self.queue_tx.push_back(buf);
    }

    /// Send a handshake message, returning it as it enters the transcript.
    pub fn send_handshake(&mut self, msg_type: HandshakeType, body: Vec<u8>) -> Result<Vec<u8>, Error> {
        trace!("Send {} ({} bytes)", msg_type, body.len());
        let Some(epoch) = self.record.as_datagram().map(|d| d.write_epoch()) else {
            let raw = encode_tls(msg_type, &body)?;
            self.write(ContentType::Handshake, &raw)?;
            return Ok(raw);
        };

        let raw;
        let seq = {
            let reliable = self
                .reliable
                .as_mut()
                .ok_or_else(|| Error::internal("datagram without reliability layer"))?;
            let seq = reliable.add_message(msg_type, body.clone(), epoch)?;
            raw = encode_dtls(msg_type, seq, &body)?;
            seq
        };
        self.transmit_message(msg_type, seq, &body, epoch)?;
        Ok(raw)
    }

    fn transmit_message(&mut self, msg_type: HandshakeType, seq: u16, body: &[u8], epoch: u16) -> Result<(), Error> {
        let mtu = self.config.mtu();
        let datagram = self
            .record
            .as_datagram()
            .ok_or_else(|| Error::internal("fragmenting on a stream"))?;
        let max = datagram.max_plaintext(mtu);
        for fragment in fragment_message(msg_type, seq, body, max)? {
            let datagram = self
                .record
                .as_datagram()
                .ok_or_else(|| Error::internal("fragmenting on a stream"))?;
            match datagram.seal_in_epoch(epoch, ContentType::Handshake, &fragment)? {
                Some(r) => self.queue_record(&r),
                None => {
                    debug!("Epoch {} is gone, skip {} seq {}", epoch, msg_type, seq);
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Send ChangeCipherSpec and switch to the pending write cipher.
    pub fn send_change_cipher_spec(&mut self) -> Result<(), Error> {
        if let Some(epoch) = self.record.as_datagram().map(|d| d.write_epoch()) {
            if let Some(r) = &mut self.reliable {
                r.add_change_cipher_spec(epoch);
            }
        }
        self.write(ContentType::ChangeCipherSpec, &[1])?;
        self.record.enable_pending_write()
    }

    /// TLS 1.3 compatibility ChangeCipherSpec. No cipher change.
    pub fn send_compat_change_cipher_spec(&mut self) -> Result<(), Error> {
        self.write(ContentType::ChangeCipherSpec, &[1])
    }

    pub fn begin_flight(&mut self) {
        if let Some(r) = &mut self.reliable {
            r.begin_flight();
        }
    }

    /// Start the retransmission timer when the peer is expected to answer.
    pub fn end_flight(&mut self, expect_answer: bool) {
        let now = self.now;
        if let (Some(r), true) = (&mut self.reliable, expect_answer) {
            r.arm(now);
        }
    }

    fn resend_flight(&mut self) -> Result<(), Error> {
        let Some(reliable) = &self.reliable else {
            return Ok(());
        };
        let flight = reliable.flight().to_vec();
        debug!("Resend flight of {} entries", flight.len());
        for entry in flight {
            match entry {
                FlightEntry::Message {
                    seq,
                    msg_type,
                    body,
                    epoch,
                } => self.transmit_message(msg_type, seq, &body, epoch)?,
                FlightEntry::ChangeCipherSpec { epoch } => {
                    let Some(d) = self.record.as_datagram() else {
                        continue;
                    };
                    if let Some(r) = d.seal_in_epoch(epoch, ContentType::ChangeCipherSpec, &[1])? {
                        self.queue_record(&r);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn set_version(&mut self, version: ProtocolVersion) {
        // TLS 1.3 records claim TLS 1.2.
        let v = if version.is_tls13() {
            ProtocolVersion::Tls1_2
        } else {
            version
        };
        self.record.set_write_version(v);
    }

    pub fn set_plaintext_limit(&mut self, limit: usize) {
        debug!("Plaintext limit {}", limit);
        self.record.set_plaintext_limit(limit);
    }

    pub fn set_tls13(&mut self) {
        self.tls13 = true;
        if let Some(s) = self.record.as_stream() {
            s.set_tls13();
        }
    }

    /// Stage the legacy ciphers that ChangeCipherSpec switches to.
    pub fn set_pending_ciphers(&mut self, read: Box<dyn TlsCipher>, write: Box<dyn TlsCipher>) {
        self.record.set_pending_read(read);
        self.record.set_pending_write(write);
    }

    /// The peer's ChangeCipherSpec arrived on a stream.
    pub fn change_read_cipher(&mut self) -> Result<(), Error> {
        match self.record.as_stream() {
            Some(s) => s.enable_pending_read(),
            None => Err(Error::internal("explicit read cipher change on a datagram")),
        }
    }

    pub fn install_tls13_read(&mut self, suite: CipherSuite, secret: &Secret) -> Result<(), Error> {
        let cipher = tls13_cipher(self.config.crypto_provider(), suite, secret)?;
        self.install_read(cipher)
    }

    pub fn install_tls13_write(&mut self, suite: CipherSuite, secret: &Secret) -> Result<(), Error> {
        let cipher = tls13_cipher(self.config.crypto_provider(), suite, secret)?;
        self.record.set_pending_write(cipher);
        self.record.enable_pending_write()
    }

    fn install_read(&mut self, cipher: Box<dyn TlsCipher>) -> Result<(), Error> {
        let stream = self
            .record
            .as_stream()
            .ok_or_else(|| Error::internal("TLS 1.3 over datagrams"))?;
        stream.set_pending_read(cipher);
        stream.enable_pending_read()
    }

    /// Keep the application traffic secrets for KeyUpdate.
    pub fn set_traffic_secrets(&mut self, suite: CipherSuite, local: Secret, peer: Secret) {
        self.traffic = Some(TrafficSecrets { suite, local, peer });
    }

    /// The peer updated its sending keys (RFC 8446 4.6.3).
    pub fn handle_key_update(&mut self, update: &KeyUpdate) -> Result<(), Error> {
        let provider = self.config.crypto_provider();
        let traffic = self
            .traffic
            .as_mut()
            .ok_or_else(|| Error::unexpected("key update before the handshake completed"))?;
        let mut next = next_traffic_secret(provider, traffic.suite.hash(), &traffic.peer)?;
        std::mem::swap(&mut traffic.peer, &mut next);
        next.destroy();
        let cipher = tls13_cipher(provider, traffic.suite, &traffic.peer)?;
        self.install_read(cipher)?;
        debug!("Peer updated its traffic keys");

        if update.request == KeyUpdateRequest::UpdateRequested {
            self.send_key_update(false)?;
        }
        Ok(())
    }

    /// Update our sending keys, optionally asking the peer to do the same.
    pub fn send_key_update(&mut self, request_peer: bool) -> Result<(), Error> {
        if self.closed {
            return Err(Error::Closed);
        }
        if !self.connected || !self.tls13 {
            return Err(Error::internal("key update requires an established TLS 1.3 connection"));
        }
        let request = if request_peer {
            KeyUpdateRequest::UpdateRequested
        } else {
            KeyUpdateRequest::UpdateNotRequested
        };
        let mut body = Vec::with_capacity(1);
        KeyUpdate { request }.serialize(&mut body);
        let raw = encode_tls(HandshakeType::KeyUpdate, &body)?;
        self.write(ContentType::Handshake, &raw)?;

        let provider = self.config.crypto_provider();
        let traffic = self
            .traffic
            .as_mut()
            .ok_or_else(|| Error::internal("no traffic secrets"))?;
        let mut next = next_traffic_secret(provider, traffic.suite.hash(), &traffic.local)?;
        std::mem::swap(&mut traffic.local, &mut next);
        next.destroy();
        let cipher = tls13_cipher(provider, traffic.suite, &traffic.local)?;
        self.record.set_pending_write(cipher);
        self.record.enable_pending_write()?;
        debug!("Updated our traffic keys");
        Ok(())
    }

    /// The handshake completed.
    ///
    /// `keep_flight` is for the side that sent the final DTLS flight, which
    /// must answer retransmissions of the flight before it.
    pub fn complete(&mut self, keep_flight: bool, peer_heartbeat: Option<HeartbeatMode>) -> Result<(), Error> {
        info!("Handshake complete");
        self.connected = true;
        self.handshake_deadline = Timeout::Disabled;
        if let Some(r) = &mut self.reliable {
            r.finish(keep_flight);
        }
        self.handshake_in.shrink();
        if let Some(s) = self.record.as_stream() {
            s.shrink();
        }

        if let (Some(local), Some(peer)) = (self.config.heartbeat_mode(), peer_heartbeat) {
            let backoff = self
                .is_dtls()
                .then(|| ExponentialBackoff::new(self.config.flight_start_rto(), self.config.flight_max_rto()));
            let mut hb = Heartbeat::new(
                local,
                peer,
                self.config.heartbeat_interval(),
                self.config.heartbeat_timeout(),
                backoff,
            );
            hb.start(self.now);
            self.heartbeat = Some(hb);
        }

        self.events.push_back(LocalEvent::Connected);

        while let Some(data) = self.pending_app.pop_front() {
            self.write_application_data(&data)?;
        }
        Ok(())
    }

    pub fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.closed {
            return Err(Error::Closed);
        }
        if !self.connected {
            if self.pending_app.len() >= self.config.max_queue_tx() {
                return Err(Error::TransmitQueueFull);
            }
            self.pending_app.push_back(data.to_vec());
            return Ok(());
        }
        self.write_application_data(data)
    }

    fn write_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }
        let mtu = self.config.mtu();
        match self.record.as_datagram().map(|d| d.max_plaintext(mtu)) {
            Some(max) => {
                for chunk in data.chunks(max.max(1)) {
                    self.write(ContentType::ApplicationData, chunk)?;
                }
                Ok(())
            }
            None => self.write(ContentType::ApplicationData, data),
        }
    }

    /// Next outgoing packet.
    ///
    /// A stream hands out as much as fits, possibly splitting a record across
    /// calls. A datagram is handed out whole or not at all.
    pub fn poll_packet<'a>(&mut self, buf: &'a mut [u8]) -> Result<&'a [u8], &'a mut [u8]> {
        if self.is_dtls() {
            let Some(p) = self.queue_tx.pop_front() else {
                return Err(buf);
            };
            if p.len() > buf.len() {
                warn!("Output buffer too small for datagram {} > {}, dropped", p.len(), buf.len());
                self.buffers.push(p);
                return Err(buf);
            }
            let len = p.len();
            buf[..len].copy_from_slice(&p);
            self.buffers.push(p);
            return Ok(&buf[..len]);
        }

        let mut len = 0;
        while len < buf.len() {
            let Some(front) = self.queue_tx.front() else {
                break;
            };
            let rest = &front[self.tx_offset..];
            let n = rest.len().min(buf.len() - len);
            buf[len..len + n].copy_from_slice(&rest[..n]);
            len += n;
            self.tx_offset += n;
            if self.tx_offset == front.len() {
                self.tx_offset = 0;
                if let Some(done) = self.queue_tx.pop_front() {
                    self.buffers.push(done);
                }
            }
        }
        if len == 0 {
            return Err(buf);
        }
        Ok(&buf[..len])
    }

    pub fn has_packets(&self) -> bool {
        !self.queue_tx.is_empty()
    }

    /// Next chunk of received application data. Records larger than `buf`
    /// are handed out over several calls.
    pub fn poll_app_data<'a>(&mut self, buf: &'a mut [u8]) -> Result<&'a [u8], &'a mut [u8]> {
        let Some(front) = self.queue_rx.front() else {
            return Err(buf);
        };
        if buf.is_empty() {
            return Err(buf);
        }
        let rest = &front[self.rx_offset..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.rx_offset += n;
        if self.rx_offset == front.len() {
            self.rx_offset = 0;
            self.queue_rx.pop_front();
        }
        Ok(&buf[..n])
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        if self.closed {
            return None;
        }
        let t = Timeout::earliest(
            self.handshake_deadline.deadline(),
            self.reliable.as_ref().and_then(|r| r.poll_timeout()),
        );
        Timeout::earliest(t, self.heartbeat.as_ref().and_then(|h| h.poll_timeout()))
    }

    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        self.now = now;
        if self.closed {
            return Ok(());
        }
        if self.handshake_deadline.is_expired(now) {
            return Err(Error::Timeout("handshake"));
        }
        if self.reliable.as_mut().is_some_and(|r| r.handle_timeout(now)) {
            self.resend_flight()?;
        }
        let provider = self.config.crypto_provider();
        let request = match &mut self.heartbeat {
            Some(hb) => hb.handle_timeout(now, provider)?,
            None => None,
        };
        if let Some(r) = request {
            self.send_heartbeat(&r)?;
        }
        Ok(())
    }

    /// Graceful close. Queued output still drains.
    pub fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.send_alert(Alert::warning(AlertDescription::CloseNotify))?;
        self.closed = true;
        self.pending_app.clear();
        self.heartbeat = None;
        self.handshake_deadline = Timeout::Disabled;
        if let Some(r) = &mut self.reliable {
            r.release();
        }
        Ok(())
    }

    /// Tear down after a fatal error, telling the peer when the error maps
    /// to an alert.
    pub fn fail(&mut self, err: &Error) {
        if self.failed {
            return;
        }
        if let Some(description) = err.alert() {
            if let Err(e) = self.send_alert(Alert::fatal(description)) {
                debug!("Failed to send alert {}: {}", description, e);
            }
        }
        self.failed = true;
        self.closed = true;
        self.pending_app.clear();
        self.queue_rx.clear();
        self.heartbeat = None;
        self.handshake_deadline = Timeout::Disabled;
        if let Some(r) = &mut self.reliable {
            r.finish(false);
            r.release();
        }
        if let Some(t) = &mut self.traffic {
            t.local.destroy();
            t.peer.destroy();
        }
        self.traffic = None;
        self.record.shrink();
        self.buffers.shrink();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AlertDescription;

    fn engine(dtls: bool) -> Engine {
        let mut b = Config::builder();
        if dtls {
            b = b.dtls();
        }
        Engine::new(Arc::new(b.build().unwrap()), Instant::now())
    }

    fn drain(e: &mut Engine) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; 2048];
        while let Ok(p) = e.poll_packet(&mut buf) {
            out.push(p.to_vec());
        }
        out
    }

    #[test]
    fn stream_reassembles_split_message() {
        let mut e = engine(false);
        let now = Instant::now();
        // Finished-like message of 3 bytes split over two records.
        e.push_input(&[22, 3, 1, 0, 2, 20, 0], now).unwrap();
        assert!(e.next_incoming().unwrap().is_none());
        e.push_input(&[22, 3, 1, 0, 5, 0, 3, 1, 2, 3], now).unwrap();
        let Some(Incoming::Handshake(m)) = e.next_incoming().unwrap() else {
            panic!("expected a handshake message");
        };
        assert_eq!(m.msg_type, HandshakeType::Finished);
        assert_eq!(m.body, vec![1, 2, 3]);
        assert_eq!(m.raw, vec![20, 0, 0, 3, 1, 2, 3]);
    }

    #[test]
    fn application_data_before_connect_is_unexpected_on_stream() {
        let mut e = engine(false);
        e.push_input(&[23, 3, 3, 0, 1, 9], Instant::now()).unwrap();
        let err = e.next_incoming().unwrap_err();
        assert_eq!(err.alert(), Some(AlertDescription::UnexpectedMessage));
    }

    #[test]
    fn application_data_before_connect_is_dropped_on_datagram() {
        let mut e = engine(true);
        let record = [23, 254, 255, 0, 0, 0, 0, 0, 0, 0, 1, 0, 1, 9];
        e.push_input(&record, Instant::now()).unwrap();
        assert!(e.next_incoming().unwrap().is_none());
    }

    #[test]
    fn fatal_alert_surfaces_as_peer_alert() {
        let mut e = engine(false);
        e.push_input(&[21, 3, 3, 0, 2, 2, 40], Instant::now()).unwrap();
        let err = e.next_incoming().unwrap_err();
        assert!(matches!(err, Error::PeerAlert(AlertDescription::HandshakeFailure)));
    }

    #[test]
    fn close_notify_during_handshake_fails() {
        let mut e = engine(false);
        e.push_input(&[21, 3, 3, 0, 2, 1, 0], Instant::now()).unwrap();
        let err = e.next_incoming().unwrap_err();
        assert_eq!(err.alert(), Some(AlertDescription::HandshakeFailure));
    }

    #[test]
    fn pending_application_data_is_capped() {
        let mut e = engine(false);
        for _ in 0..e.config().max_queue_tx() {
            e.send_application_data(b"x").unwrap();
        }
        assert!(matches!(e.send_application_data(b"x"), Err(Error::TransmitQueueFull)));
    }

    #[test]
    fn pending_application_data_flushes_on_complete() {
        let mut e = engine(false);
        e.send_application_data(b"early").unwrap();
        assert!(drain(&mut e).is_empty());
        e.complete(false, None).unwrap();
        assert_eq!(e.poll_event(), Some(LocalEvent::Connected));
        let out = drain(&mut e).concat();
        assert_eq!(&out[..5], &[23, 3, 1, 0, 5]);
        assert_eq!(&out[5..], b"early");
    }

    #[test]
    fn stream_output_splits_over_small_buffers() {
        let mut e = engine(false);
        e.send_handshake(HandshakeType::Finished, vec![7; 12]).unwrap();
        let mut buf = [0u8; 7];
        let first = e.poll_packet(&mut buf).unwrap().to_vec();
        assert_eq!(first.len(), 7);
        let mut rest = Vec::new();
        while let Ok(p) = e.poll_packet(&mut buf) {
            rest.extend_from_slice(p);
        }
        assert_eq!(first.len() + rest.len(), 5 + 4 + 12);
    }

    #[test]
    fn datagram_records_share_a_datagram() {
        let mut e = engine(true);
        e.send_handshake(HandshakeType::Finished, vec![1; 12]).unwrap();
        e.send_alert(Alert::warning(AlertDescription::UserCanceled)).unwrap();
        let out = drain(&mut e);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 13 + 12 + 12 + 13 + 2);
    }

    #[test]
    fn fail_sends_alert_once_and_closes() {
        let mut e = engine(false);
        let err = Error::decode("bad");
        e.fail(&err);
        e.fail(&err);
        assert!(e.is_closed());
        let out = drain(&mut e).concat();
        assert_eq!(out, vec![21, 3, 1, 0, 2, 2, 50]);
        assert!(matches!(e.send_application_data(b"x"), Err(Error::Closed)));
    }

    #[test]
    fn handshake_deadline_times_out() {
        let mut e = engine(false);
        let later = Instant::now() + e.config().handshake_timeout() * 2;
        let err = e.handle_timeout(later).unwrap_err();
        assert!(err.is_timeout());
    }
}
