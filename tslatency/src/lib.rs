//! tslatency library - latency measurement around an MPEG-TS pipeline
//!
//! This library provides a UDP timestamp sender, a receiver that times
//! arrivals of forwarded TS packets, and an arm/measure loop over a raw
//! TS stream.

pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod signal;
pub mod stats;
pub mod trigger;

// Re-export commonly used types
pub use clock::MonoTime;
pub use config::{ReceiverConfig, SenderConfig, WatchConfig};
pub use error::LatencyError;
pub use signal::StopFlag;
pub use stats::LatencyStats;
pub use trigger::{EdgeTrigger, LogTrigger};
