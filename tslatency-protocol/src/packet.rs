//! MPEG-TS packet handling.
//!
//! Only the 4-byte header is modelled. The receiver needs the PID of a
//! single datagram, the watch mode needs whole packets cut out of an
//! unaligned byte stream.

use std::fmt;

use bytes::{Buf, Bytes, BytesMut};

use crate::error::ProtocolError;

/// TS packet size in bytes.
pub const TS_PACKET_SIZE: usize = 188;

/// TS sync byte (0x47).
pub const SYNC_BYTE: u8 = 0x47;

/// Bytes needed to read the PID (sync byte + two header bytes).
pub const PID_HEADER_LEN: usize = 3;

/// Default number of packets a [`TsStreamBuffer`] holds before dropping.
pub const DEFAULT_STREAM_PACKETS: usize = 64;

/// Packet Identifier, a 13-bit value in `[0, 0x1FFF]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(u16);

impl Pid {
    /// Largest representable PID.
    pub const MAX: u16 = 0x1FFF;
    /// Null packet PID.
    pub const NULL: Pid = Pid(0x1FFF);

    /// Build a PID, rejecting values wider than 13 bits.
    pub fn new(value: u16) -> Result<Self, ProtocolError> {
        if value > Self::MAX {
            return Err(ProtocolError::PidOutOfRange(value));
        }
        Ok(Pid(value))
    }

    /// Build a PID from the low 13 bits of `value`.
    pub const fn masked(value: u16) -> Self {
        Pid(value & Self::MAX)
    }

    /// Raw 13-bit value.
    pub const fn value(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for Pid {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Pid::new(value)
    }
}

impl From<Pid> for u16 {
    fn from(pid: Pid) -> Self {
        pid.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Extract the PID from the start of a TS packet.
///
/// The low 5 bits of byte 1 are the high bits, byte 2 is the low byte.
/// The sync byte is not checked; a buffer shorter than
/// [`PID_HEADER_LEN`] is rejected.
pub fn extract_pid(data: &[u8]) -> Result<Pid, ProtocolError> {
    if data.len() < PID_HEADER_LEN {
        return Err(ProtocolError::PacketTooShort {
            needed: PID_HEADER_LEN,
            actual: data.len(),
        });
    }
    Ok(Pid::masked(((data[1] as u16) << 8) | data[2] as u16))
}

/// Parsed TS packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsHeader {
    /// Transport error indicator.
    pub transport_error: bool,
    /// Payload unit start indicator.
    pub payload_unit_start: bool,
    /// Transport priority.
    pub transport_priority: bool,
    /// Packet Identifier.
    pub pid: Pid,
    /// Transport scrambling control (2 bits).
    pub scrambling_control: u8,
    /// Adaptation field control (2 bits).
    pub adaptation_field_control: u8,
    /// Continuity counter (4 bits).
    pub continuity_counter: u8,
}

impl TsHeader {
    /// Parse the header of a complete 188-byte packet.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < TS_PACKET_SIZE {
            return Err(ProtocolError::PacketTooShort {
                needed: TS_PACKET_SIZE,
                actual: data.len(),
            });
        }

        if data[0] != SYNC_BYTE {
            return Err(ProtocolError::InvalidSyncByte(data[0]));
        }

        Ok(TsHeader {
            transport_error: data[1] & 0x80 != 0,
            payload_unit_start: data[1] & 0x40 != 0,
            transport_priority: data[1] & 0x20 != 0,
            pid: extract_pid(data)?,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_control: (data[3] >> 4) & 0x03,
            continuity_counter: data[3] & 0x0F,
        })
    }

    /// Check if packet has payload.
    pub fn has_payload(&self) -> bool {
        self.adaptation_field_control & 0x01 != 0
    }

    /// Check if packet is scrambled.
    pub fn is_scrambled(&self) -> bool {
        self.scrambling_control != 0
    }
}

/// Reassembles TS packets from an unaligned byte stream.
///
/// Bytes before a sync byte are skipped. When the buffer grows past its
/// capacity the oldest data is dropped in packet-sized steps; readers
/// that must not lose packets cap each read at [`free_space`].
///
/// [`free_space`]: TsStreamBuffer::free_space
#[derive(Debug)]
pub struct TsStreamBuffer {
    buf: BytesMut,
    capacity: usize,
    skipped: u64,
    dropped: u64,
}

impl Default for TsStreamBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TsStreamBuffer {
    /// Create a buffer holding [`DEFAULT_STREAM_PACKETS`] packets.
    pub fn new() -> Self {
        Self::with_packets(DEFAULT_STREAM_PACKETS)
    }

    /// Create a buffer holding up to `packets` packets (at least one).
    pub fn with_packets(packets: usize) -> Self {
        let capacity = packets.max(1) * TS_PACKET_SIZE;
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
            skipped: 0,
            dropped: 0,
        }
    }

    /// Append a chunk read from the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);

        if self.buf.len() > self.capacity {
            let excess = self.buf.len() - self.capacity;
            let drop = ((excess + TS_PACKET_SIZE - 1) / TS_PACKET_SIZE * TS_PACKET_SIZE)
                .min(self.buf.len());
            self.buf.advance(drop);
            self.dropped += drop as u64;
        }
    }

    /// Take the next complete packet, resynchronising on the sync byte.
    pub fn next_packet(&mut self) -> Option<Bytes> {
        let skip = self
            .buf
            .iter()
            .position(|&b| b == SYNC_BYTE)
            .unwrap_or(self.buf.len());
        if skip > 0 {
            self.buf.advance(skip);
            self.skipped += skip as u64;
        }

        if self.buf.len() < TS_PACKET_SIZE {
            return None;
        }
        Some(self.buf.split_to(TS_PACKET_SIZE).freeze())
    }

    /// Bytes that can be pushed without dropping buffered data.
    pub fn free_space(&self) -> usize {
        self.capacity.saturating_sub(self.buf.len())
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes discarded while searching for a sync byte.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    /// Bytes discarded because the buffer was full.
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(pid: u16) -> [u8; TS_PACKET_SIZE] {
        let mut packet = [0u8; TS_PACKET_SIZE];
        packet[0] = SYNC_BYTE;
        packet[1] = ((pid >> 8) as u8) & 0x1F;
        packet[2] = pid as u8;
        packet[3] = 0x10;
        packet
    }

    #[test]
    fn test_extract_pid_watched() {
        let mut data = vec![0x47, 0x04, 0x04];
        data.extend_from_slice(&[0u8; 185]);
        assert_eq!(extract_pid(&data).unwrap().value(), 0x0404);
        assert_eq!(extract_pid(&data).unwrap().value(), 1028);
    }

    #[test]
    fn test_extract_pid_max() {
        let mut data = vec![0x47, 0x1F, 0xFF];
        data.extend_from_slice(&[0u8; 185]);
        assert_eq!(extract_pid(&data).unwrap(), Pid::NULL);
        assert_eq!(extract_pid(&data).unwrap().value(), 8191);
    }

    #[test]
    fn test_extract_pid_ignores_upper_flag_bits() {
        let data = [0x47, 0xE4, 0x04];
        assert_eq!(extract_pid(&data).unwrap().value(), 0x0404);
    }

    #[test]
    fn test_extract_pid_in_range_for_all_header_bytes() {
        for b1 in 0..=255u8 {
            for b2 in [0x00u8, 0x01, 0x7F, 0x80, 0xFF] {
                let pid = extract_pid(&[0x47, b1, b2]).unwrap().value();
                assert!(pid <= Pid::MAX);
                assert_eq!(pid, ((b1 as u16 & 0x1F) << 8) | b2 as u16);
            }
        }
    }

    #[test]
    fn test_extract_pid_short_buffer() {
        assert_eq!(
            extract_pid(&[0x47, 0x04]),
            Err(ProtocolError::PacketTooShort { needed: 3, actual: 2 })
        );
        assert!(extract_pid(&[]).is_err());
    }

    #[test]
    fn test_extract_pid_is_pure() {
        let data = packet(0x0100);
        let first = extract_pid(&data).unwrap();
        for _ in 0..10 {
            assert_eq!(extract_pid(&data).unwrap(), first);
        }
    }

    #[test]
    fn test_pid_range_and_display() {
        assert!(Pid::new(0x2000).is_err());
        assert_eq!(Pid::new(0x0404).unwrap().to_string(), "0x0404");
        assert_eq!(u16::from(Pid::try_from(17u16).unwrap()), 17);
        assert_eq!(Pid::masked(0xE404).value(), 0x0404);
    }

    #[test]
    fn test_parse_header() {
        let mut data = packet(0x0404);
        data[1] |= 0x40;
        data[3] = 0x17;

        let header = TsHeader::parse(&data).unwrap();
        assert_eq!(header.pid.value(), 0x0404);
        assert!(header.payload_unit_start);
        assert!(!header.transport_error);
        assert!(header.has_payload());
        assert!(!header.is_scrambled());
        assert_eq!(header.continuity_counter, 7);
    }

    #[test]
    fn test_parse_header_rejects_bad_input() {
        let mut data = packet(0x0404);
        data[0] = 0x00;
        assert_eq!(TsHeader::parse(&data), Err(ProtocolError::InvalidSyncByte(0x00)));
        assert!(matches!(
            TsHeader::parse(&data[..100]),
            Err(ProtocolError::PacketTooShort { needed: 188, actual: 100 })
        ));
    }

    #[test]
    fn test_stream_buffer_split_chunks() {
        let mut buffer = TsStreamBuffer::new();
        let data = packet(0x0404);

        buffer.push(&data[..100]);
        assert!(buffer.next_packet().is_none());
        buffer.push(&data[100..]);

        let out = buffer.next_packet().unwrap();
        assert_eq!(extract_pid(&out).unwrap().value(), 0x0404);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_stream_buffer_resync() {
        let mut buffer = TsStreamBuffer::new();
        buffer.push(&[0x00, 0x12, 0x34]);
        buffer.push(&packet(0x0011));

        let out = buffer.next_packet().unwrap();
        assert_eq!(extract_pid(&out).unwrap().value(), 0x0011);
        assert_eq!(buffer.skipped_bytes(), 3);
    }

    #[test]
    fn test_stream_buffer_drops_oldest_when_full() {
        let mut buffer = TsStreamBuffer::with_packets(2);
        buffer.push(&packet(1));
        buffer.push(&packet(2));
        buffer.push(&packet(3));

        assert_eq!(buffer.len(), 2 * TS_PACKET_SIZE);
        assert_eq!(buffer.dropped_bytes(), TS_PACKET_SIZE as u64);
        assert_eq!(extract_pid(&buffer.next_packet().unwrap()).unwrap().value(), 2);
        assert_eq!(extract_pid(&buffer.next_packet().unwrap()).unwrap().value(), 3);
        assert!(buffer.next_packet().is_none());
    }

    #[test]
    fn test_stream_buffer_free_space_keeps_boundary_packet() {
        let mut buffer = TsStreamBuffer::with_packets(2);
        let mut stream = packet(1).to_vec();
        stream.extend_from_slice(&packet(2));
        stream.extend_from_slice(&packet(3));

        // Leave a partial packet behind, then fill only the free space.
        buffer.push(&stream[..300]);
        assert_eq!(extract_pid(&buffer.next_packet().unwrap()).unwrap().value(), 1);
        assert_eq!(buffer.free_space(), 2 * TS_PACKET_SIZE - 112);

        let free = buffer.free_space();
        buffer.push(&stream[300..300 + free]);
        assert_eq!(buffer.free_space(), 0);
        assert_eq!(buffer.dropped_bytes(), 0);
        assert_eq!(extract_pid(&buffer.next_packet().unwrap()).unwrap().value(), 2);
    }
}
