//! Geographic location codes and adjacency compression.

use std::fmt;

use crate::error::{LotError, Result};

/// Location code format. Selector values are fixed by the frame layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeoFormat {
    /// SAME-style area code.
    Same,
    /// FIPS county code.
    Fips,
    /// Postal code.
    Zip,
}

impl GeoFormat {
    /// 3-bit selector written into the frame.
    #[inline]
    pub fn selector(self) -> u8 {
        match self {
            GeoFormat::Same => 0,
            GeoFormat::Fips => 1,
            GeoFormat::Zip => 2,
        }
    }

    /// Width of an uncompressed code.
    #[inline]
    pub fn full_width(self) -> usize {
        match self {
            GeoFormat::Same => 20,
            GeoFormat::Fips | GeoFormat::Zip => 17,
        }
    }

    /// Width of a compressed code.
    #[inline]
    pub fn compressed_width(self) -> usize {
        match self {
            GeoFormat::Same => 14,
            GeoFormat::Fips | GeoFormat::Zip => 10,
        }
    }

    /// Largest code representable at full width.
    #[inline]
    pub fn max_value(self) -> u32 {
        (1u32 << self.full_width()) - 1
    }
}

impl fmt::Display for GeoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GeoFormat::Same => "same",
            GeoFormat::Fips => "fips",
            GeoFormat::Zip => "zip",
        };
        f.write_str(name)
    }
}

/// A location code tagged with its format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeoCode {
    Same(u32),
    Fips(u32),
    Zip(u32),
}

impl GeoCode {
    /// Build a code of the given format.
    pub fn new(format: GeoFormat, value: u32) -> Self {
        match format {
            GeoFormat::Same => GeoCode::Same(value),
            GeoFormat::Fips => GeoCode::Fips(value),
            GeoFormat::Zip => GeoCode::Zip(value),
        }
    }

    /// Format of this code.
    pub fn format(self) -> GeoFormat {
        match self {
            GeoCode::Same(_) => GeoFormat::Same,
            GeoCode::Fips(_) => GeoFormat::Fips,
            GeoCode::Zip(_) => GeoFormat::Zip,
        }
    }

    /// Numeric value of this code.
    pub fn value(self) -> u32 {
        match self {
            GeoCode::Same(v) | GeoCode::Fips(v) | GeoCode::Zip(v) => v,
        }
    }
}

/// The digit group shared by adjacent codes: `(x mod 100000) div 1000`.
#[inline]
pub fn middle_digits(code: u32) -> u32 {
    (code % 100_000) / 1000
}

/// Drop the middle digit group: `(x div 100000) * 1000 + (x mod 1000)`.
#[inline]
pub fn compress(code: u32) -> u32 {
    (code / 100_000) * 1000 + code % 1000
}

/// Check that every code has `format` and fits its full width, then sort.
pub(crate) fn sorted_values(format: GeoFormat, locations: &[GeoCode]) -> Result<Vec<u32>> {
    let mut values = Vec::with_capacity(locations.len());

    for location in locations {
        if location.format() != format {
            return Err(LotError::InvalidAlertInput(format!(
                "location {} is a {} code, expected {}",
                location.value(),
                location.format(),
                format
            )));
        }
        if location.value() > format.max_value() {
            return Err(LotError::InvalidAlertInput(format!(
                "{} code {} does not fit in {} bits",
                format,
                location.value(),
                format.full_width()
            )));
        }
        values.push(location.value());
    }

    values.sort_unstable();
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_groups() {
        assert_eq!(middle_digits(37183), 37);
        assert_eq!(middle_digits(37187), 37);
        assert_eq!(middle_digits(36061), 36);
        assert_eq!(middle_digits(537183), 37);

        assert_eq!(compress(37183), 183);
        assert_eq!(compress(537183), 5183);
    }

    #[test]
    fn test_widths() {
        assert_eq!(GeoFormat::Same.full_width(), 20);
        assert_eq!(GeoFormat::Same.compressed_width(), 14);
        assert_eq!(GeoFormat::Fips.full_width(), 17);
        assert_eq!(GeoFormat::Zip.compressed_width(), 10);
        assert_eq!(GeoFormat::Fips.max_value(), 131_071);
    }

    #[test]
    fn test_sorted_values_rejects_mixed() {
        let result = sorted_values(GeoFormat::Fips, &[GeoCode::Fips(1), GeoCode::Zip(2)]);
        assert!(matches!(result, Err(LotError::InvalidAlertInput(_))));
    }

    #[test]
    fn test_sorted_values_rejects_too_wide() {
        let result = sorted_values(GeoFormat::Zip, &[GeoCode::Zip(131_072)]);
        assert!(matches!(result, Err(LotError::InvalidAlertInput(_))));
    }

    #[test]
    fn test_sorted_values_sorts() {
        let values = sorted_values(
            GeoFormat::Same,
            &[GeoCode::Same(30059), GeoCode::Same(30047), GeoCode::Same(1001)],
        )
        .unwrap();
        assert_eq!(values, vec![1001, 30047, 30059]);
    }
}
