//! Wall clock time from the caller's `Instant`.
//!
//! The engine only ever sees the `Instant` handed to it, but the hello
//! random starts with a UNIX timestamp. An anchor taken once pairs an
//! `Instant` with a `SystemTime`, and every later `Instant` is translated
//! relative to it.

use std::time::{Duration, Instant, SystemTime};

use once_cell::sync::Lazy;

static ANCHOR: Lazy<(Instant, SystemTime)> = Lazy::new(|| (Instant::now(), SystemTime::now()));

pub(crate) trait InstantExt {
    /// Time since the UNIX epoch at this instant.
    fn to_unix_duration(&self) -> Duration;
}

impl InstantExt for Instant {
    fn to_unix_duration(&self) -> Duration {
        let (instant, system) = *ANCHOR;
        let at = if *self >= instant {
            system.checked_add(self.duration_since(instant))
        } else {
            system.checked_sub(instant.duration_since(*self))
        };
        at.and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .unwrap_or_else(|| {
                warn!("System clock before the UNIX epoch");
                Duration::ZERO
            })
    }
}
