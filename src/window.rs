use crate::codec::U48_MAX;

const WINDOW_SIZE: u64 = 64;

/// Sliding anti-replay window for DTLS record sequence numbers.
///
/// Tracks the highest authenticated sequence number and a 64-bit bitmap of
/// the most recent ones, bit 0 being the highest. Each epoch has its own
/// window.
///
/// Calls come in pairs: [`should_discard`](Self::should_discard) before a
/// record is decrypted, [`report_authenticated`](Self::report_authenticated)
/// only once its integrity check passed. A forged record therefore never
/// marks a sequence number as seen.
#[derive(Debug, Default, Clone)]
pub struct ReplayWindow {
    latest_confirmed: u64,
    bitmap: u64,
}

impl ReplayWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a record with this sequence number must be dropped unread.
    pub fn should_discard(&self, seq: u64) -> bool {
        if seq > U48_MAX {
            return true;
        }

        if seq > self.latest_confirmed {
            return false;
        }

        let diff = self.latest_confirmed - seq;
        if diff >= WINDOW_SIZE {
            return true;
        }

        (self.bitmap & (1 << diff)) != 0
    }

    /// Mark a sequence number as received. Only call after authentication.
    pub fn report_authenticated(&mut self, seq: u64) {
        if seq > U48_MAX {
            return;
        }

        if seq > self.latest_confirmed {
            let delta = seq - self.latest_confirmed;
            if delta >= WINDOW_SIZE {
                self.bitmap = 1;
            } else {
                self.bitmap = (self.bitmap << delta) | 1;
            }
            self.latest_confirmed = seq;
        } else {
            let diff = self.latest_confirmed - seq;
            if diff < WINDOW_SIZE {
                self.bitmap |= 1 << diff;
            }
        }
    }

    /// Forget all history. `seq` becomes the latest confirmed number.
    pub fn reset(&mut self, seq: u64) {
        self.latest_confirmed = seq.min(U48_MAX);
        self.bitmap = 1;
    }
}
