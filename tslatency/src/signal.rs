//! Interrupt handling.
//!
//! SIGINT/SIGTERM flip a shared [`StopFlag`]. Loops poll the flag and
//! return normally, so sockets and readers are released by drop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::info;

use crate::error::LatencyError;

/// Longest uninterrupted nap inside [`StopFlag::sleep`].
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Shared stop request.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Route Ctrl+C (and termination signals) to this flag.
    ///
    /// Can only be installed once per process.
    pub fn install_handler(&self) -> Result<(), LatencyError> {
        let flag = self.clone();
        ctrlc::set_handler(move || {
            info!("Interrupt received, stopping...");
            flag.stop();
        })?;
        Ok(())
    }

    /// Sleep for `duration` unless a stop is requested first.
    ///
    /// Returns `false` if the sleep was cut short.
    /// A duration past the end of the clock sleeps until stopped.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.is_stopped() {
                return false;
            }
            let nap = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    (deadline - now).min(SLEEP_SLICE)
                }
                None => SLEEP_SLICE,
            };
            std::thread::sleep(nap);
        }
    }
}
