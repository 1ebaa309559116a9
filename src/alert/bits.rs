//! LSB-first bit writer and reader for alert frames.
//!
//! Alert frames are little-endian bitstreams: every field is emitted least
//! significant bit first, and bits fill each byte starting at bit 0.
//!
//! # Example
//! ```
//! use lotwire::alert::{BitReader, BitWriter};
//!
//! let mut writer = BitWriter::new();
//! writer.write_bits(0b101, 3);  // bits 1, 0, 1
//! writer.write_bits(0b11, 2);   // bits 1, 1
//! // Byte 0: 0b000_11_101
//!
//! let bytes = writer.finish();
//! assert_eq!(bytes, vec![0b0001_1101]);
//!
//! let mut reader = BitReader::new(&bytes);
//! assert_eq!(reader.read_bits(3), Some(0b101));
//! assert_eq!(reader.read_bits(2), Some(0b11));
//! ```

/// Writes bits LSB-first into a byte buffer.
///
/// # Invariants
/// - `bit_count` < 8
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    /// Completed bytes
    bytes: Vec<u8>,
    /// Accumulator for the current partial byte (filled from bit 0)
    bit_buffer: u8,
    /// Number of bits in bit_buffer (0-7)
    bit_count: u8,
}

impl BitWriter {
    /// Create a new BitWriter with empty output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the lowest `count` bits of `value`, least significant first.
    ///
    /// `count` is capped at 64.
    pub fn write_bits(&mut self, value: u64, count: usize) {
        let count = count.min(64);
        for i in 0..count {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    /// Append a single bit.
    pub fn write_bit(&mut self, bit: bool) {
        if bit {
            self.bit_buffer |= 1 << self.bit_count;
        }
        self.bit_count += 1;

        if self.bit_count == 8 {
            self.bytes.push(self.bit_buffer);
            self.bit_buffer = 0;
            self.bit_count = 0;
        }
    }

    /// Append zero bits until `bit_len() % modulus == remainder`.
    pub fn pad_until(&mut self, modulus: usize, remainder: usize) {
        if modulus == 0 {
            return;
        }
        while self.bit_len() % modulus != remainder % modulus {
            self.write_bit(false);
        }
    }

    /// Total number of bits written.
    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8 + self.bit_count as usize
    }

    /// Finish writing, zero-filling the final partial byte.
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            self.bytes.push(self.bit_buffer);
        }
        self.bytes
    }
}

/// Reads bits LSB-first from a byte buffer.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Current bit position (0 = bit 0 of first byte)
    bit_position: usize,
}

impl<'a> BitReader<'a> {
    /// Create a new BitReader for the given data.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_position: 0,
        }
    }

    /// Read `count` bits (at most 64) as an LSB-first field.
    ///
    /// Returns `None` if not enough bits remain.
    pub fn read_bits(&mut self, count: usize) -> Option<u64> {
        if count > 64 || count > self.bits_remaining() {
            return None;
        }

        let mut value = 0u64;
        for i in 0..count {
            let byte = self.data[self.bit_position / 8];
            let bit = (byte >> (self.bit_position % 8)) & 1;
            value |= (bit as u64) << i;
            self.bit_position += 1;
        }
        Some(value)
    }

    /// Read a single bit.
    pub fn read_bit(&mut self) -> Option<bool> {
        self.read_bits(1).map(|b| b == 1)
    }

    /// Number of bits remaining in the buffer.
    pub fn bits_remaining(&self) -> usize {
        self.data.len() * 8 - self.bit_position
    }
}
