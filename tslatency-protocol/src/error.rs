//! Error types for the tslatency wire formats.

use thiserror::Error;

/// Errors raised while decoding timestamp messages or TS packets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is shorter than the field being read.
    #[error("Packet too short: need {needed} bytes, got {actual}")]
    PacketTooShort { needed: usize, actual: usize },

    /// First byte is not the TS sync byte.
    #[error("Invalid sync byte: expected 0x47, got 0x{0:02X}")]
    InvalidSyncByte(u8),

    /// Value does not fit in 13 bits.
    #[error("PID out of range: 0x{0:04X} (max: 0x1FFF)")]
    PidOutOfRange(u16),

    /// Payload is not a `time=<ms>` message.
    #[error("Invalid timestamp message: {0}")]
    InvalidTimestamp(String),
}
