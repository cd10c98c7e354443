//! The 10-byte DDP header.
//!
//! ```text
//! offset  size  field
//! 0       1     flags (version, push, timecode)
//! 1       1     sequence number (0 = unused)
//! 2       1     data type
//! 3       1     output / destination id
//! 4       4     data offset (big-endian)
//! 8       2     payload length (big-endian)
//! ```

use bytes::{Buf, BufMut};

use crate::error::CastError;
use crate::flags::DdpFlags;

pub const HEADER_LENGTH: usize = 10;

/// Data type byte for 8-bit-per-channel RGB pixels.
pub const DATA_TYPE_RGB24: u8 = 0x0B;

/// Destination id of the default display output.
pub const OUTPUT_DISPLAY: u8 = 0x01;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD_LENGTH: usize = u16::MAX as usize;

/// Largest UDP payload one IPv4 datagram can carry.
pub const MAX_DATAGRAM_LENGTH: usize = 65_507;

/// Largest DDP payload that still fits in one datagram with its header.
pub const MAX_DATAGRAM_PAYLOAD: usize = MAX_DATAGRAM_LENGTH - HEADER_LENGTH;

pub type DdpHeaderBytes = [u8; HEADER_LENGTH];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdpHeader {
    pub flags: DdpFlags,
    pub sequence: u8,
    pub data_type: u8,
    pub output_id: u8,
    pub offset: u32,
    pub length: u16,
}

impl DdpHeader {
    /// Header for an RGB24 payload of `length` bytes at `offset`.
    pub fn rgb24(sequence: u8, offset: u32, length: usize, push: bool) -> Result<Self, CastError> {
        if length > MAX_PAYLOAD_LENGTH {
            return Err(CastError::PayloadTooLarge {
                size: length,
                max: MAX_PAYLOAD_LENGTH,
            });
        }
        Ok(Self {
            flags: DdpFlags::data(push),
            sequence,
            data_type: DATA_TYPE_RGB24,
            output_id: OUTPUT_DISPLAY,
            offset,
            length: length as u16,
        })
    }

    pub fn to_bytes(&self) -> DdpHeaderBytes {
        let mut bytes = [0u8; HEADER_LENGTH];
        self.write_to(&mut bytes.as_mut_slice());
        bytes
    }

    /// Append the header to `buf`.
    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.flags.bits());
        buf.put_u8(self.sequence);
        buf.put_u8(self.data_type);
        buf.put_u8(self.output_id);
        buf.put_u32(self.offset);
        buf.put_u16(self.length);
    }

    /// Parse the header at the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, CastError> {
        if bytes.len() < HEADER_LENGTH {
            return Err(CastError::InvalidHeader("shorter than 10 bytes"));
        }
        let mut buf = &bytes[..HEADER_LENGTH];
        let flags = DdpFlags::from_bits_retain(buf.get_u8());
        if flags.version() != 1 {
            return Err(CastError::InvalidHeader("unsupported protocol version"));
        }
        if flags.contains(DdpFlags::TIMECODE) {
            return Err(CastError::InvalidHeader("timecode headers are not supported"));
        }
        Ok(Self {
            flags,
            sequence: buf.get_u8(),
            data_type: buf.get_u8(),
            output_id: buf.get_u8(),
            offset: buf.get_u32(),
            length: buf.get_u16(),
        })
    }

    pub fn payload_length(&self) -> usize {
        self.length as usize
    }
}
