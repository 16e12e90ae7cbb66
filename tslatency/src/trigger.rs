//! Edge trigger raised while a watch measurement is armed.
//!
//! On the bench this drives a GPIO line that an external probe watches.
//! The hardware side is not part of this crate; [`LogTrigger`] only
//! records the edges.

use log::debug;

pub trait EdgeTrigger {
    /// Rising edge: measurement armed.
    fn raise(&mut self);
    /// Falling edge: measurement window closed.
    fn lower(&mut self);
}

/// Trigger that logs edges at debug level.
#[derive(Debug, Default)]
pub struct LogTrigger {
    high: bool,
}

impl LogTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_high(&self) -> bool {
        self.high
    }
}

impl EdgeTrigger for LogTrigger {
    fn raise(&mut self) {
        self.high = true;
        debug!("trigger: rising edge");
    }

    fn lower(&mut self) {
        if self.high {
            debug!("trigger: falling edge");
        }
        self.high = false;
    }
}
