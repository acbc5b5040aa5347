//! Time sources for observation timestamps and decay

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;
use tracing::warn;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Scene replays pin it to `base + t_start` of the event being processed so
/// decay is measured in scene seconds and every replay produces identical
/// scores.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    /// A clock at the Unix epoch, so `HH:MM:SS` renders scene offsets directly.
    pub fn at_epoch() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            match now.checked_add_signed(by) {
                Some(next) => *now = next,
                None => warn!("Manual clock cannot advance by {}, holding at {}", by, *now),
            }
        }
    }

    /// Pin the clock to a scene offset in seconds from the epoch.
    ///
    /// Offsets outside chrono's range leave the clock where it was; returns
    /// whether the clock moved.
    pub fn set_offset_secs(&self, offset: f64) -> bool {
        match offset_to_time(offset) {
            Some(at) => {
                self.set(at);
                true
            }
            None => {
                warn!("Scene offset {}s is out of range, clock stays at {}", offset, self.now());
                false
            }
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at_epoch()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Scene offset (seconds, fractional) as an absolute time from the epoch.
/// `None` when the result is not representable.
pub fn offset_to_time(offset: f64) -> Option<DateTime<Utc>> {
    let millis = (offset * 1000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    DateTime::<Utc>::UNIX_EPOCH.checked_add_signed(Duration::milliseconds(millis as i64))
}
