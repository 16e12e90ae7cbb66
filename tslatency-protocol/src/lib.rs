//! Wire formats for the tslatency tools.
//!
//! Two payloads are understood:
//!
//! - the sender's `time=<ms>` text datagram ([`TimestampMessage`]),
//! - 188-byte MPEG-TS packets, of which only the header is read
//!   ([`extract_pid`], [`TsHeader`], [`TsStreamBuffer`]).
//!
//! # Example
//!
//! ```rust
//! use tslatency_protocol::{extract_pid, TimestampMessage};
//!
//! let msg = TimestampMessage::from_millis(1_700_000_000_000);
//! let decoded = TimestampMessage::decode(&msg.encode()).unwrap();
//! assert_eq!(decoded.millis(), 1_700_000_000_000);
//!
//! let mut packet = [0u8; 188];
//! packet[..3].copy_from_slice(&[0x47, 0x04, 0x04]);
//! assert_eq!(extract_pid(&packet).unwrap().value(), 0x0404);
//! ```

pub mod error;
pub mod packet;
pub mod timestamp;

pub use error::ProtocolError;
pub use packet::{
    extract_pid, Pid, TsHeader, TsStreamBuffer, DEFAULT_STREAM_PACKETS, PID_HEADER_LEN, SYNC_BYTE,
    TS_PACKET_SIZE,
};
pub use timestamp::{TimestampMessage, TIMESTAMP_PREFIX};
