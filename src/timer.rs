use std::time::{Duration, Instant};

/// Retransmission backoff: starts at `start_rto` and doubles on every
/// attempt, capped at `max_rto`.
#[derive(Debug, Clone)]
pub(crate) struct ExponentialBackoff {
    start_rto: Duration,
    max_rto: Duration,
    rto: Duration,
    attempts: usize,
}

impl ExponentialBackoff {
    pub fn new(start_rto: Duration, max_rto: Duration) -> Self {
        Self {
            start_rto,
            max_rto,
            rto: start_rto,
            attempts: 0,
        }
    }

    pub fn reset(&mut self) {
        self.rto = self.start_rto;
        self.attempts = 0;
    }

    pub fn rto(&self) -> Duration {
        self.rto
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn attempt(&mut self) {
        self.attempts += 1;
        self.rto = (self.rto * 2).min(self.max_rto);
    }
}

/// A timer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Timeout {
    /// Not in use for this connection.
    Disabled,
    /// In use, waiting for something to arm it.
    Unarmed,
    Armed(Instant),
}

impl Timeout {
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Timeout::Armed(t) => Some(*t),
            _ => None,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self, Timeout::Armed(t) if now >= *t)
    }

    /// Earliest of two optional deadlines.
    pub fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, None) => a,
            (None, b) => b,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn doubles_up_to_cap() {
        let mut exp = ExponentialBackoff::new(Duration::from_millis(1000), Duration::from_secs(60));
        let mut seen = vec![exp.rto().as_millis()];
        for _ in 0..8 {
            exp.attempt();
            seen.push(exp.rto().as_millis());
        }
        assert_eq!(
            seen,
            vec![1000, 2000, 4000, 8000, 16000, 32000, 60000, 60000, 60000]
        );
        assert_eq!(exp.attempts(), 8);

        exp.reset();
        assert_eq!(exp.rto(), Duration::from_millis(1000));
        assert_eq!(exp.attempts(), 0);
    }

    #[test]
    fn timeout_expiry() {
        let now = Instant::now();
        let t = Timeout::Armed(now + Duration::from_secs(1));
        assert!(!t.is_expired(now));
        assert!(t.is_expired(now + Duration::from_secs(1)));
        assert!(!Timeout::Unarmed.is_expired(now));
        assert_eq!(Timeout::Disabled.deadline(), None);
        assert_eq!(Timeout::earliest(Some(now), None), Some(now));
    }
}
