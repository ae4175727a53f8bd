use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::DateTime;
use chrono::TimeDelta;
use chrono::Utc;

/// A settable wall clock handle.
///
/// On the device the NTP sync engine owns the authority to adjust time, while
/// the table client reads it for `x-ms-date` and signing. Both hold clones of
/// the same `DeviceClock` instead of reaching for a process-wide singleton.
///
/// The clock is stored as a signed millisecond adjustment over the host
/// clock. Reads are lock-free; the `is_set` flag flips atomically on the
/// first successful sync so callers can gate uploads on "clock is valid".
#[derive(Clone, Debug, Default)]
pub struct DeviceClock {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    adjust_ms: AtomicI64,
    set: AtomicBool,
}

impl DeviceClock {
    /// Create a clock that initially follows the host clock unadjusted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current UTC time with the sync adjustment applied.
    pub fn now_utc(&self) -> DateTime<Utc> {
        Utc::now() + TimeDelta::milliseconds(self.inner.adjust_ms.load(Ordering::Relaxed))
    }

    /// Set the clock to the given UTC instant.
    pub fn set_utc(&self, t: DateTime<Utc>) {
        let adjust = (t - Utc::now()).num_milliseconds();
        self.inner.adjust_ms.store(adjust, Ordering::Relaxed);
        self.inner.set.store(true, Ordering::Release);
    }

    /// Whether the clock has been set since process start.
    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_starts_unset_on_host_time() {
        let clock = DeviceClock::new();
        assert!(!clock.is_set());
        let skew = (clock.now_utc() - Utc::now()).num_milliseconds().abs();
        assert!(skew < 1_000);
    }

    #[test]
    fn test_set_utc_applies_adjustment() {
        let clock = DeviceClock::new();
        let target = Utc::now() + TimeDelta::hours(3);
        clock.set_utc(target);
        assert!(clock.is_set());
        let drift = (clock.now_utc() - target).num_milliseconds().abs();
        assert!(drift < 1_000);
    }

    #[test]
    fn test_clones_share_the_same_clock() {
        let clock = DeviceClock::new();
        let reader = clock.clone();
        clock.set_utc(Utc::now() - TimeDelta::minutes(90));
        assert!(reader.is_set());
        let drift = (reader.now_utc() - clock.now_utc()).num_milliseconds().abs();
        assert!(drift < 1_000);
    }
}
