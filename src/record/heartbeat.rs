use std::time::{Duration, Instant};

use crate::crypto::CryptoProvider;
use crate::message::HeartbeatMessage;
use crate::timer::{ExponentialBackoff, Timeout};
use crate::types::{HeartbeatMessageType, HeartbeatMode};
use crate::Error;

#[derive(Debug)]
struct InFlight {
    payload: Vec<u8>,
    deadline: Instant,
    resend: Option<Instant>,
}

/// Heartbeat timers (RFC 6520).
///
/// After the handshake an idle timer schedules a request when the peer
/// allows us to send them. Only one request is outstanding at a time. On a
/// datagram transport it is retransmitted with the handshake backoff. No
/// matching response before the timeout is fatal.
#[derive(Debug)]
pub(crate) struct Heartbeat {
    interval: Option<Duration>,
    timeout: Duration,
    /// The peer advertised peer_allowed_to_send.
    may_send: bool,
    /// We advertised peer_allowed_to_send.
    must_answer: bool,
    idle: Timeout,
    in_flight: Option<InFlight>,
    backoff: Option<ExponentialBackoff>,
    counter: u32,
}

impl Heartbeat {
    pub fn new(
        local: HeartbeatMode,
        peer: HeartbeatMode,
        interval: Option<Duration>,
        timeout: Duration,
        backoff: Option<ExponentialBackoff>,
    ) -> Self {
        let may_send = peer == HeartbeatMode::PeerAllowedToSend;
        Heartbeat {
            interval,
            timeout,
            may_send,
            must_answer: local == HeartbeatMode::PeerAllowedToSend,
            idle: if may_send && interval.is_some() {
                Timeout::Unarmed
            } else {
                Timeout::Disabled
            },
            in_flight: None,
            backoff,
            counter: 0,
        }
    }

    /// Arm the idle timer once the handshake completed.
    pub fn start(&mut self, now: Instant) {
        self.rearm(now);
    }

    fn rearm(&mut self, now: Instant) {
        if let (Timeout::Unarmed | Timeout::Armed(_), Some(interval)) = (self.idle, self.interval) {
            self.idle = Timeout::Armed(now + interval);
        }
    }

    /// Traffic from the peer postpones the next request.
    pub fn on_activity(&mut self, now: Instant) {
        if self.in_flight.is_none() && matches!(self.idle, Timeout::Armed(_)) {
            self.rearm(now);
        }
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        match &self.in_flight {
            Some(f) => Timeout::earliest(Some(f.deadline), f.resend),
            None => self.idle.deadline(),
        }
    }

    /// Returns a request to send, new or retransmitted.
    pub fn handle_timeout(
        &mut self,
        now: Instant,
        provider: &CryptoProvider,
    ) -> Result<Option<HeartbeatMessage>, Error> {
        if let Some(f) = &mut self.in_flight {
            if now >= f.deadline {
                return Err(Error::Timeout("heartbeat"));
            }
            let (Some(resend), Some(backoff)) = (f.resend, &mut self.backoff) else {
                return Ok(None);
            };
            if now < resend {
                return Ok(None);
            }
            backoff.attempt();
            f.resend = Some(now + backoff.rto());
            debug!("Resend heartbeat request (attempt {})", backoff.attempts());
            let payload = f.payload.clone();
            return Ok(Some(HeartbeatMessage::request(payload, provider)?));
        }

        if !self.idle.is_expired(now) {
            return Ok(None);
        }

        self.counter = self.counter.wrapping_add(1);
        let payload = self.counter.to_be_bytes().to_vec();
        let resend = self.backoff.as_mut().map(|b| {
            b.reset();
            now + b.rto()
        });
        self.in_flight = Some(InFlight {
            payload: payload.clone(),
            deadline: now + self.timeout,
            resend,
        });
        trace!("Send heartbeat request {}", self.counter);
        Ok(Some(HeartbeatMessage::request(payload, provider)?))
    }

    /// Process a heartbeat from the peer. Returns the response to send, if any.
    pub fn handle_message(
        &mut self,
        now: Instant,
        message: &HeartbeatMessage,
        provider: &CryptoProvider,
    ) -> Result<Option<HeartbeatMessage>, Error> {
        match message.message_type {
            HeartbeatMessageType::Request => {
                if !self.must_answer {
                    debug!("Ignore heartbeat request, peer not allowed to send");
                    return Ok(None);
                }
                Ok(Some(message.response_to(provider)?))
            }
            HeartbeatMessageType::Response => {
                match &self.in_flight {
                    Some(f) if f.payload == message.payload => {
                        trace!("Heartbeat response received");
                        self.in_flight = None;
                        self.rearm(now);
                    }
                    _ => debug!("Drop unsolicited heartbeat response"),
                }
                Ok(None)
            }
            HeartbeatMessageType::Unknown(_) => Ok(None),
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.in_flight.is_some()
    }
}
