//! Transport PDU encoding and decoding.
//!
//! Every LOT segment travels inside a 5-byte transport header:
//! ```text
//! ┌────────┬──────────┬──────────┐
//! │ Opcode │ Port     │ Sequence │
//! │ 1 byte │ 2 bytes  │ 2 bytes  │
//! │ 0x21   │ uint16 LE│ uint16 LE│
//! └────────┴──────────┴──────────┘
//! ```
//!
//! The sequence number counts PDUs, not segments or files, and wraps at 65536.

use bytes::{BufMut, Bytes, BytesMut};

/// PDU header size in bytes (fixed, exactly 5).
pub const PDU_HEADER_SIZE: usize = 5;

/// Opcode carried by every LOT transport PDU.
pub const LOT_OPCODE: u8 = 0x21;

/// Default destination port for LOT data.
pub const DEFAULT_LOT_PORT: u16 = 0x1001;

/// Decoded transport header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PduHeader {
    /// Opcode (always [`LOT_OPCODE`] for frames produced here).
    pub opcode: u8,
    /// Destination port.
    pub port: u16,
    /// PDU stream counter.
    pub sequence: u16,
}

impl PduHeader {
    /// Create a LOT header for the given port and sequence number.
    pub fn new(port: u16, sequence: u16) -> Self {
        Self {
            opcode: LOT_OPCODE,
            port,
            sequence,
        }
    }

    /// Encode header to bytes (Little Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use lotwire::protocol::PduHeader;
    ///
    /// let bytes = PduHeader::new(0x1001, 7).encode();
    /// assert_eq!(bytes, [0x21, 0x01, 0x10, 0x07, 0x00]);
    /// ```
    pub fn encode(&self) -> [u8; PDU_HEADER_SIZE] {
        let mut buf = [0u8; PDU_HEADER_SIZE];
        buf[0] = self.opcode;
        buf[1..3].copy_from_slice(&self.port.to_le_bytes());
        buf[3..5].copy_from_slice(&self.sequence.to_le_bytes());
        buf
    }

    /// Decode header from bytes (Little Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let header: &[u8; PDU_HEADER_SIZE] = buf.get(..PDU_HEADER_SIZE)?.try_into().ok()?;
        Some(Self::from_array(header))
    }

    /// Decode a complete header.
    pub fn from_array(buf: &[u8; PDU_HEADER_SIZE]) -> Self {
        Self {
            opcode: buf[0],
            port: u16::from_le_bytes([buf[1], buf[2]]),
            sequence: u16::from_le_bytes([buf[3], buf[4]]),
        }
    }
}

/// A transport PDU ready for egress: encoded header plus segment bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPdu {
    /// Pre-encoded header (5 bytes).
    pub header: [u8; PDU_HEADER_SIZE],
    /// Encoded segment (shared with the sender's part list).
    pub segment: Bytes,
}

impl OutboundPdu {
    /// Total size of this PDU (header + segment).
    #[inline]
    pub fn size(&self) -> usize {
        PDU_HEADER_SIZE + self.segment.len()
    }

    /// Decode the header back out of this PDU.
    pub fn decoded_header(&self) -> PduHeader {
        PduHeader::from_array(&self.header)
    }

    /// Copy header and segment into one contiguous buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());
        buf.put_slice(&self.header);
        buf.put_slice(&self.segment);
        buf.freeze()
    }
}

/// Wraps segments in transport headers for one port.
///
/// Owns the wrapping PDU counter; it starts at 0.
#[derive(Debug, Clone)]
pub struct PduEncoder {
    port: u16,
    next_sequence: u16,
}

impl PduEncoder {
    /// Create an encoder for the given destination port.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            next_sequence: 0,
        }
    }

    /// Destination port of this encoder.
    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Sequence number the next PDU will carry.
    #[inline]
    pub fn next_sequence(&self) -> u16 {
        self.next_sequence
    }

    /// Wrap one encoded segment and advance the counter.
    pub fn wrap(&mut self, segment: Bytes) -> OutboundPdu {
        let header = PduHeader::new(self.port, self.next_sequence).encode();
        self.next_sequence = self.next_sequence.wrapping_add(1);
        OutboundPdu { header, segment }
    }
}
