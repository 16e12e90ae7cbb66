//! `time=<ms>` timestamp datagrams.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use nom::bytes::complete::tag;
use nom::character::complete::digit1;
use nom::combinator::{all_consuming, map_res};
use nom::sequence::preceded;
use nom::IResult;

use crate::error::ProtocolError;

/// Prefix of every timestamp message.
pub const TIMESTAMP_PREFIX: &str = "time=";

/// A timestamp message carrying milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimestampMessage {
    millis: u64,
}

impl TimestampMessage {
    pub const fn from_millis(millis: u64) -> Self {
        Self { millis }
    }

    pub const fn millis(&self) -> u64 {
        self.millis
    }

    /// Encode as the UTF-8 datagram payload.
    pub fn encode(&self) -> Bytes {
        Bytes::from(self.to_string())
    }

    /// Decode a datagram payload.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(data)
            .map_err(|e| ProtocolError::InvalidTimestamp(format!("not UTF-8: {}", e)))?;
        text.parse()
    }
}

impl fmt::Display for TimestampMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", TIMESTAMP_PREFIX, self.millis)
    }
}

fn parse_message(input: &str) -> IResult<&str, u64> {
    preceded(tag(TIMESTAMP_PREFIX), map_res(digit1, |d: &str| d.parse::<u64>()))(input)
}

impl FromStr for TimestampMessage {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all_consuming(parse_message)(s)
            .map(|(_, millis)| TimestampMessage { millis })
            .map_err(|_| ProtocolError::InvalidTimestamp(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let msg = TimestampMessage::from_millis(1_700_000_000_123);
        assert_eq!(msg.to_string(), "time=1700000000123");
        assert_eq!(&msg.encode()[..], b"time=1700000000123");
    }

    #[test]
    fn test_parse_returns_same_millis() {
        for t in [0u64, 1, 9, 10, 1_700_000_000_123, u32::MAX as u64, u64::MAX] {
            let text = format!("time={}", t);
            assert_eq!(text.parse::<TimestampMessage>().unwrap().millis(), t);
            assert_eq!(
                TimestampMessage::decode(TimestampMessage::from_millis(t).encode().as_ref())
                    .unwrap()
                    .millis(),
                t
            );
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "time=", "time=-5", "time=12x", "tim=12", " time=1", "time=18446744073709551616"] {
            assert!(
                matches!(bad.parse::<TimestampMessage>(), Err(ProtocolError::InvalidTimestamp(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_decode_rejects_non_utf8() {
        assert!(TimestampMessage::decode(&[0x74, 0xFF, 0xFE]).is_err());
    }
}
