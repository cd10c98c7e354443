//! DDP packet framing.
//!
//! A [`WirePacket`] is a 10-byte [`DdpHeader`] followed immediately by
//! the RGB payload. [`DdpEncoder`] builds one packet per frame, or a
//! run of offset-addressed packets when chunking is enabled.

use std::fmt::Debug;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CastError;
use crate::header::{DdpHeader, HEADER_LENGTH, MAX_PAYLOAD_LENGTH};

/// Payload size that keeps a chunk under a 1500-byte Ethernet MTU.
pub const DEFAULT_CHUNK_PAYLOAD: usize = 1440;

/// Highest sequence number before wrapping back to 1.
const MAX_SEQUENCE: u8 = 15;

#[derive(Clone, PartialEq, Eq)]
pub struct WirePacket {
    header: DdpHeader,
    bytes: Bytes,
}

impl WirePacket {
    pub fn new(header: DdpHeader, payload: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(HEADER_LENGTH + payload.len());
        header.write_to(&mut buf);
        buf.put_slice(payload);
        Self {
            header,
            bytes: buf.freeze(),
        }
    }

    /// Parse a received datagram, checking the length field.
    pub fn from_bytes(bytes: Bytes) -> Result<Self, CastError> {
        let header = DdpHeader::decode(&bytes)?;
        if bytes.len() != HEADER_LENGTH + header.payload_length() {
            return Err(CastError::InvalidHeader(
                "length field does not match datagram size",
            ));
        }
        Ok(Self { header, bytes })
    }

    pub fn header(&self) -> DdpHeader {
        self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LENGTH..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Debug for WirePacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WirePacket")
            .field("header", &self.header)
            .field("payload_len", &self.payload().len())
            .finish()
    }
}

// ── PacketMode ───────────────────────────────────────────────────

/// How a frame is split into datagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacketMode {
    /// The whole frame in one packet; relies on IP fragmentation.
    #[default]
    Single,
    /// At most `max_payload` bytes per packet, PUSH on the last one.
    Chunked { max_payload: usize },
}

// ── DdpEncoder ───────────────────────────────────────────────────

/// Stateful frame encoder.
///
/// Tracks the optional 4-bit sequence number across frames. With
/// sequencing disabled every packet carries sequence 0.
#[derive(Debug, Clone)]
pub struct DdpEncoder {
    mode: PacketMode,
    sequencing: bool,
    next_sequence: u8,
}

impl DdpEncoder {
    pub fn new() -> Self {
        Self::with_mode(PacketMode::Single)
    }

    pub fn with_mode(mode: PacketMode) -> Self {
        Self {
            mode,
            sequencing: false,
            next_sequence: 1,
        }
    }

    /// Stamp packets with a sequence number cycling through 1..=15.
    pub fn with_sequencing(mut self, enabled: bool) -> Self {
        self.sequencing = enabled;
        self
    }

    /// Frame `payload` as a single push packet at offset 0.
    pub fn encode(&mut self, payload: &[u8]) -> Result<WirePacket, CastError> {
        let header = DdpHeader::rgb24(self.sequence(), 0, payload.len(), true)?;
        Ok(WirePacket::new(header, payload))
    }

    /// Frame `payload` according to the configured [`PacketMode`].
    ///
    /// Every packet of one frame shares the same sequence number.
    pub fn encode_frame(&mut self, payload: &[u8]) -> Result<Vec<WirePacket>, CastError> {
        let max_payload = match self.mode {
            PacketMode::Single => return Ok(vec![self.encode(payload)?]),
            PacketMode::Chunked { max_payload } => max_payload,
        };
        if max_payload == 0 || max_payload > MAX_PAYLOAD_LENGTH {
            return Err(CastError::InvalidConfiguration(format!(
                "chunk payload must be 1..={MAX_PAYLOAD_LENGTH} bytes, got {max_payload}"
            )));
        }
        if payload.len() > u32::MAX as usize {
            return Err(CastError::PayloadTooLarge {
                size: payload.len(),
                max: u32::MAX as usize,
            });
        }

        let sequence = self.sequence();
        if payload.is_empty() {
            let header = DdpHeader::rgb24(sequence, 0, 0, true)?;
            return Ok(vec![WirePacket::new(header, payload)]);
        }

        let total = payload.len().div_ceil(max_payload);
        let mut packets = Vec::with_capacity(total);
        for (idx, chunk) in payload.chunks(max_payload).enumerate() {
            let offset = (idx * max_payload) as u32;
            let push = idx + 1 == total;
            let header = DdpHeader::rgb24(sequence, offset, chunk.len(), push)?;
            packets.push(WirePacket::new(header, chunk));
        }
        Ok(packets)
    }

    fn sequence(&mut self) -> u8 {
        if !self.sequencing {
            return 0;
        }
        let seq = self.next_sequence;
        self.next_sequence = if seq >= MAX_SEQUENCE { 1 } else { seq + 1 };
        seq
    }
}

impl Default for DdpEncoder {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::DATA_TYPE_RGB24;

    #[test]
    fn single_packet_length_and_length_field() {
        let payload = vec![7u8; 13500];
        let pkt = DdpEncoder::new().encode(&payload).unwrap();
        assert_eq!(pkt.len(), 10 + payload.len());
        let raw = pkt.as_bytes();
        assert_eq!(u16::from_be_bytes([raw[8], raw[9]]) as usize, payload.len());
        assert_eq!(raw[2], DATA_TYPE_RGB24);
        assert_eq!(pkt.payload(), payload.as_slice());
    }

    #[test]
    fn empty_payload_is_header_only() {
        let pkt = DdpEncoder::new().encode(&[]).unwrap();
        assert_eq!(pkt.len(), HEADER_LENGTH);
        assert_eq!(pkt.header().length, 0);
    }

    #[test]
    fn chunked_frame_offsets_and_push() {
        let payload: Vec<u8> = (0..13500u32).map(|i| (i % 251) as u8).collect();
        let mut enc = DdpEncoder::with_mode(PacketMode::Chunked { max_payload: 1440 });
        let packets = enc.encode_frame(&payload).unwrap();
        assert_eq!(packets.len(), 10);

        let mut reassembled = vec![0u8; payload.len()];
        for (i, pkt) in packets.iter().enumerate() {
            let h = pkt.header();
            assert_eq!(h.flags.is_push(), i == packets.len() - 1);
            let off = h.offset as usize;
            reassembled[off..off + pkt.payload().len()].copy_from_slice(pkt.payload());
        }
        assert_eq!(reassembled, payload);
        assert_eq!(packets[9].payload().len(), 13500 - 9 * 1440);
    }

    #[test]
    fn single_mode_encode_frame_is_one_packet() {
        let packets = DdpEncoder::new().encode_frame(&[1, 2, 3]).unwrap();
        assert_eq!(packets.len(), 1);
        assert!(packets[0].header().flags.is_push());
    }

    #[test]
    fn sequence_cycles_when_enabled() {
        let mut enc = DdpEncoder::new().with_sequencing(true);
        let seqs: Vec<u8> = (0..16).map(|_| enc.encode(&[0]).unwrap().header().sequence).collect();
        assert_eq!(seqs[0], 1);
        assert_eq!(seqs[14], 15);
        assert_eq!(seqs[15], 1);

        let mut plain = DdpEncoder::new();
        assert_eq!(plain.encode(&[0]).unwrap().header().sequence, 0);
    }

    #[test]
    fn from_bytes_checks_length() {
        let pkt = DdpEncoder::new().encode(&[1, 2, 3]).unwrap();
        let ok = WirePacket::from_bytes(pkt.clone().into_bytes()).unwrap();
        assert_eq!(ok, pkt);

        let mut truncated = BytesMut::from(pkt.as_bytes());
        truncated.truncate(11);
        assert!(WirePacket::from_bytes(truncated.freeze()).is_err());
    }
}
