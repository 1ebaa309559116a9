//! Alert module - bit-packed emergency alert frames.
//!
//! An alert frame is a fixed 56-bit header followed by a sorted, adjacency
//! compressed location list, padded so the bit length is `8 mod 16`:
//!
//! ```text
//! bits  field                 value
//!  8    reserved              0
//! 12    CRC placeholder       0 (patched downstream)
//!  8    fixed                 0x49
//!  5    category              0-31
//!  5    test indicator        30 when testing, else 0
//!  9    reserved              0b101101101
//!  3    location format       0 = SAME, 1 = FIPS, 2 = ZIP
//!  5    location count        0-31
//!  1    reserved              0
//!  ...  first location at full width, then per location:
//!       flag 0 + compressed code, or flag 1 + full code
//! ```
//!
//! Fields are written LSB-first and packed LSB-first into bytes.
//!
//! # Example
//!
//! ```
//! use lotwire::alert::{AlertEncoder, GeoCode, GeoFormat};
//!
//! let frame = AlertEncoder::new(5)
//!     .encode(GeoFormat::Same, &[GeoCode::Same(30059), GeoCode::Same(30047)])
//!     .unwrap();
//!
//! assert_eq!(frame.bit_len() % 16, 8);
//! assert_eq!(frame.to_hex(), "00009054405b085f7560070000");
//! ```

mod bits;
mod geo;

pub use bits::{BitReader, BitWriter};
pub use geo::{compress, middle_digits, GeoCode, GeoFormat};

use crate::error::{LotError, Result};

/// Largest number of locations a frame can carry (5-bit count).
pub const MAX_LOCATIONS: usize = 31;

/// Largest category code (5-bit field).
pub const MAX_CATEGORY: u8 = 31;

/// Fixed marker byte following the CRC field.
const FIXED_MARKER: u64 = 0x49;

/// Test indicator value for test alerts.
const TEST_INDICATOR: u64 = 30;

/// Reserved pattern preceding the format selector.
const RESERVED_PATTERN: u64 = 0b1_0110_1101;

/// Bit length of the fixed header.
pub const HEADER_BITS: usize = 56;

/// An encoded alert frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertFrame {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl AlertFrame {
    /// Packed frame bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bits in the frame, padding included.
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Lowercase hex rendering used in control commands.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Build the `set_alert|<hex>|<message>\n` command for this frame.
    pub fn command(&self, message: &str) -> String {
        crate::control::set_alert_command(self, message)
    }
}

/// Encodes alerts of one category.
#[derive(Debug, Clone, Copy)]
pub struct AlertEncoder {
    category: u8,
    test: bool,
}

impl AlertEncoder {
    /// Create an encoder for a live alert of `category`.
    pub fn new(category: u8) -> Self {
        Self {
            category,
            test: false,
        }
    }

    /// Mark alerts as tests.
    pub fn test(mut self, test: bool) -> Self {
        self.test = test;
        self
    }

    /// Encode a frame for `locations`, all of which must be `format`.
    ///
    /// # Errors
    ///
    /// Returns [`LotError::InvalidAlertInput`] before emitting anything if the
    /// category exceeds 31, more than 31 locations are given, formats are
    /// mixed, or a code is wider than its format allows.
    pub fn encode(&self, format: GeoFormat, locations: &[GeoCode]) -> Result<AlertFrame> {
        encode(self.category, self.test, format, locations)
    }
}

/// Encode an alert frame.
///
/// See [`AlertEncoder::encode`].
pub fn encode(
    category: u8,
    test: bool,
    format: GeoFormat,
    locations: &[GeoCode],
) -> Result<AlertFrame> {
    if category > MAX_CATEGORY {
        return Err(LotError::InvalidAlertInput(format!(
            "category {} exceeds maximum {}",
            category, MAX_CATEGORY
        )));
    }
    if locations.len() > MAX_LOCATIONS {
        return Err(LotError::InvalidAlertInput(format!(
            "{} locations exceeds maximum {}",
            locations.len(),
            MAX_LOCATIONS
        )));
    }
    let codes = geo::sorted_values(format, locations)?;

    let mut bits = BitWriter::new();
    bits.write_bits(0, 8);
    bits.write_bits(0, 12); // CRC
    bits.write_bits(FIXED_MARKER, 8);
    bits.write_bits(category as u64, 5);
    bits.write_bits(if test { TEST_INDICATOR } else { 0 }, 5);
    bits.write_bits(RESERVED_PATTERN, 9);
    bits.write_bits(format.selector() as u64, 3);
    bits.write_bits(codes.len() as u64, 5);
    bits.write_bits(0, 1);

    if let Some(&first) = codes.first() {
        bits.write_bits(first as u64, format.full_width());
    }

    let compressed_max = (1u32 << format.compressed_width()) - 1;
    for pair in codes.windows(2) {
        let (prev, code) = (pair[0], pair[1]);
        let short = compress(code);

        if middle_digits(code) == middle_digits(prev) && short <= compressed_max {
            bits.write_bit(false);
            bits.write_bits(short as u64, format.compressed_width());
        } else {
            bits.write_bit(true);
            bits.write_bits(code as u64, format.full_width());
        }
    }

    bits.pad_until(16, 8);

    let bit_len = bits.bit_len();
    Ok(AlertFrame {
        bytes: bits.finish(),
        bit_len,
    })
}
