//! Clocks used by the measurements.
//!
//! Arrival and arm/hit times are taken from a monotonic clock
//! (`CLOCK_MONOTONIC_RAW` on Linux). The sender's payload uses wall-clock
//! time, which jumps with clock adjustments; keep both ends on one host.

use std::fmt;
use std::time::Duration;

#[cfg(target_os = "linux")]
use self::linux as imp;
#[cfg(not(target_os = "linux"))]
use self::portable as imp;

#[cfg(target_os = "linux")]
mod linux;
mod portable;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A point on the monotonic clock, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonoTime {
    nanos: u64,
}

impl MonoTime {
    pub fn now() -> Self {
        Self { nanos: imp::now_nanos() }
    }

    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    pub const fn as_nanos(&self) -> u64 {
        self.nanos
    }

    /// Microseconds, as printed in the receiver report.
    pub fn as_micros_f64(&self) -> f64 {
        self.nanos as f64 / 1_000.0
    }

    /// Elapsed time since `earlier`, zero if `earlier` is later.
    pub fn saturating_duration_since(&self, earlier: MonoTime) -> Duration {
        Duration::from_nanos(self.nanos.saturating_sub(earlier.nanos))
    }
}

impl fmt::Display for MonoTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:09}",
            self.nanos / NANOS_PER_SEC,
            self.nanos % NANOS_PER_SEC
        )
    }
}

/// Milliseconds since the Unix epoch (wall clock).
pub fn wall_clock_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
