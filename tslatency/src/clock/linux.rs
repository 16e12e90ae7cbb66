use log::warn;
use nix::time::{clock_gettime, ClockId};

use super::NANOS_PER_SEC;

pub(super) fn now_nanos() -> u64 {
    match clock_gettime(ClockId::CLOCK_MONOTONIC_RAW) {
        Ok(ts) => ts.tv_sec() as u64 * NANOS_PER_SEC + ts.tv_nsec() as u64,
        Err(e) => {
            warn!("clock_gettime(CLOCK_MONOTONIC_RAW) failed: {}", e);
            super::portable::now_nanos()
        }
    }
}
