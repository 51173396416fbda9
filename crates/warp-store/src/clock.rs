// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Injected clock port.
//!
//! No warp operation reads the wall clock directly. Anything time-dependent
//! (HMAC timestamp windows, doctor deadlines, cursor freshness) takes a
//! [`ClockPort`], so tests drive time with [`ManualClock`] and production
//! uses [`SystemClock`].

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{TimeZone, Utc};

/// Milliseconds-since-epoch clock seam.
pub trait ClockPort: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    /// Current time as an ISO-8601 UTC string.
    fn now_iso8601(&self) -> String {
        let ms = self.now_ms();
        Utc.timestamp_millis_opt(ms)
            .single()
            .map_or_else(|| format!("+{ms}ms"), |t| t.to_rfc3339())
    }
}

/// Wall-clock implementation.
#[derive(Clone, Copy, Default, Debug)]
pub struct SystemClock;

impl ClockPort for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Test clock; starts at zero and moves only when told to.
#[derive(Default, Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    /// Creates a clock pinned at `now_ms`.
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    /// Sets the absolute time.
    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    /// Advances the clock by `delta_ms` (may be negative).
    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl ClockPort for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set(0);
        assert_eq!(clock.now_iso8601(), "1970-01-01T00:00:00+00:00");
    }
}
