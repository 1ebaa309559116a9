//! MIME classification for LOT files.
//!
//! Content is sniffed by magic bytes first, then by filename extension.

use crate::error::{LotError, Result};

/// PNG signature.
const PNG_START: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
/// JPEG start-of-image marker.
const JPEG_START: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker.
const JPEG_END: [u8; 2] = [0xFF, 0xD9];

/// MIME hash constants carried in the first segment's metadata.
pub mod mime_hash {
    /// image/png
    pub const PNG: u32 = 0x4F32_8CA0;
    /// image/jpeg
    pub const JPEG: u32 = 0x1E65_3E9C;
    /// text/plain
    pub const TEXT: u32 = 0xBB49_2AAC;
}

/// Content types a LOT file may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeType {
    Png,
    Jpeg,
    Text,
}

impl MimeType {
    /// The 32-bit hash identifying this type on the wire.
    #[inline]
    pub fn hash(self) -> u32 {
        match self {
            MimeType::Png => mime_hash::PNG,
            MimeType::Jpeg => mime_hash::JPEG,
            MimeType::Text => mime_hash::TEXT,
        }
    }

    /// Classify a file by its content, falling back to its name.
    ///
    /// # Errors
    ///
    /// Returns [`LotError::UnsupportedFileType`] when neither the magic bytes
    /// nor the extension are recognized.
    ///
    /// # Example
    ///
    /// ```
    /// use lotwire::protocol::MimeType;
    ///
    /// let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00];
    /// assert_eq!(MimeType::classify(b"cover.txt", &png).unwrap(), MimeType::Png);
    /// assert_eq!(MimeType::classify(b"notes.txt", b"hello").unwrap(), MimeType::Text);
    /// assert!(MimeType::classify(b"data.bin", b"hello").is_err());
    /// ```
    pub fn classify(filename: &[u8], data: &[u8]) -> Result<Self> {
        if let Some(mime) = Self::sniff(data) {
            return Ok(mime);
        }

        Self::from_extension(filename).ok_or_else(|| {
            LotError::UnsupportedFileType(String::from_utf8_lossy(filename).into_owned())
        })
    }

    /// Detect a type from magic bytes alone.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(&PNG_START) {
            Some(MimeType::Png)
        } else if data.starts_with(&JPEG_START) && data.ends_with(&JPEG_END) {
            Some(MimeType::Jpeg)
        } else {
            None
        }
    }

    /// Detect a type from the filename extension (ASCII case-insensitive).
    pub fn from_extension(filename: &[u8]) -> Option<Self> {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(b".png") {
            Some(MimeType::Png)
        } else if lower.ends_with(b".jpg") || lower.ends_with(b".jpeg") {
            Some(MimeType::Jpeg)
        } else if lower.ends_with(b".txt") {
            Some(MimeType::Text)
        } else {
            None
        }
    }
}
