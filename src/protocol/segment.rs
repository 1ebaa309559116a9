//! LOT file segmentation.
//!
//! A file is split into payload chunks of at most 256 bytes. Each chunk is
//! framed with an 8-byte header; the first segment also carries metadata and
//! the raw filename:
//!
//! ```text
//! ┌────────────┬────────┬─────────┬───────────┐
//! │ Header len │ Repeat │ LOT ID  │ Sequence  │   all segments
//! │ uint8      │ uint8  │ u16 LE  │ u32 LE    │
//! ├────────────┼────────┼─────────┼───────────┤
//! │ Version    │ Expiry │ Size    │ MIME hash │   segment 0 only
//! │ u32 LE     │ u32 LE │ u32 LE  │ u32 LE    │
//! ├────────────┴────────┴─────────┴───────────┤
//! │ Filename bytes (no terminator)            │   segment 0 only
//! ├───────────────────────────────────────────┤
//! │ Payload (<= 256 bytes)                    │
//! └───────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use lotwire::protocol::{segment_file, FileSegment};
//!
//! let data = vec![b'a'; 600];
//! let segments = segment_file(b"notes.txt", &data, 7).unwrap();
//!
//! assert_eq!(segments.len(), 3);
//! assert_eq!(segments[0].header_length, 24 + 9);
//! assert!(segments[1].metadata.is_none());
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use super::mime::MimeType;
use crate::error::{LotError, Result};

/// Maximum payload bytes per segment.
pub const MAX_SEGMENT_PAYLOAD: usize = 256;

/// Header size of every segment.
pub const BASE_HEADER_SIZE: usize = 8;

/// Header size of the first segment, excluding the filename.
pub const FIRST_HEADER_SIZE: usize = 24;

/// Longest filename that still fits the 8-bit header length.
pub const MAX_FILENAME_LEN: usize = u8::MAX as usize - FIRST_HEADER_SIZE;

/// Metadata format version.
pub const METADATA_VERSION: u32 = 1;

/// How long a transmitted file stays valid.
const EXPIRY_DAYS: i64 = 365;

/// Metadata carried by segment 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Format version (always 1).
    pub version: u32,
    /// Packed expiry time, see [`pack_expiry`].
    pub expiry: u32,
    /// Total file size in bytes.
    pub size: u32,
    /// MIME hash of the file content.
    pub mime_hash: u32,
    /// Raw filename bytes.
    pub filename: Bytes,
}

/// One framed chunk of a LOT file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSegment {
    /// Header length in bytes (24 + filename for segment 0, else 8).
    pub header_length: u8,
    /// Repeat count (always 1).
    pub repeat: u8,
    /// LOT identifier.
    pub lot_id: u16,
    /// Segment index within the file, starting at 0.
    pub sequence: u32,
    /// Present on segment 0 only.
    pub metadata: Option<Metadata>,
    /// File content slice (zero-copy view of the source file).
    pub payload: Bytes,
}

impl FileSegment {
    /// Encoded size of this segment.
    pub fn size(&self) -> usize {
        self.header_length as usize + self.payload.len()
    }

    /// Serialize this segment (Little Endian).
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());

        buf.put_u8(self.header_length);
        buf.put_u8(self.repeat);
        buf.put_u16_le(self.lot_id);
        buf.put_u32_le(self.sequence);

        if let Some(meta) = &self.metadata {
            buf.put_u32_le(meta.version);
            buf.put_u32_le(meta.expiry);
            buf.put_u32_le(meta.size);
            buf.put_u32_le(meta.mime_hash);
            buf.put_slice(&meta.filename);
        }

        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse a segment produced by [`FileSegment::encode`].
    ///
    /// Segment 0 is recognized by its sequence number.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BASE_HEADER_SIZE {
            return Err(LotError::MalformedSegment(format!(
                "segment too short: need at least {} bytes, got {}",
                BASE_HEADER_SIZE,
                bytes.len()
            )));
        }

        let header_length = bytes[0];
        let repeat = bytes[1];
        let lot_id = u16::from_le_bytes([bytes[2], bytes[3]]);
        let sequence = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

        let header_end = header_length as usize;
        if bytes.len() < header_end || header_end < BASE_HEADER_SIZE {
            return Err(LotError::MalformedSegment(format!(
                "segment header length {} invalid for {} bytes",
                header_length,
                bytes.len()
            )));
        }

        let metadata = if sequence == 0 {
            if header_end < FIRST_HEADER_SIZE {
                return Err(LotError::MalformedSegment(format!(
                    "first segment header length {} below {}",
                    header_length, FIRST_HEADER_SIZE
                )));
            }
            let word = |at: usize| {
                u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
            };
            Some(Metadata {
                version: word(8),
                expiry: word(12),
                size: word(16),
                mime_hash: word(20),
                filename: Bytes::copy_from_slice(&bytes[FIRST_HEADER_SIZE..header_end]),
            })
        } else {
            None
        };

        Ok(Self {
            header_length,
            repeat,
            lot_id,
            sequence,
            metadata,
            payload: Bytes::copy_from_slice(&bytes[header_end..]),
        })
    }
}

/// Pack a timestamp as `(year<<20)|(month<<16)|(day<<11)|(hour<<6)|minute`.
pub fn pack_expiry(time: DateTime<Utc>) -> u32 {
    let year = time.year().max(0) as u32;
    (year << 20) | (time.month() << 16) | (time.day() << 11) | (time.hour() << 6) | time.minute()
}

/// Splits files into LOT segments.
///
/// Uses the wall clock for the expiry field unless built with a fixed time.
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    fixed_now: Option<DateTime<Utc>>,
}

impl Segmenter {
    /// Create a segmenter that reads the wall clock.
    pub fn new() -> Self {
        Self { fixed_now: None }
    }

    /// Create a segmenter that always uses `now` as the current time.
    pub fn with_fixed_time(now: DateTime<Utc>) -> Self {
        Self {
            fixed_now: Some(now),
        }
    }

    /// Segment `data` named `filename` under `lot_id`.
    ///
    /// An empty file still yields one segment carrying the metadata.
    ///
    /// # Errors
    ///
    /// - [`LotError::UnsupportedFileType`] if the file can't be classified
    /// - [`LotError::FilenameTooLong`] if the name exceeds [`MAX_FILENAME_LEN`]
    /// - [`LotError::FileTooLarge`] if the size doesn't fit in 32 bits
    pub fn segment(&self, filename: &[u8], data: &[u8], lot_id: u16) -> Result<Vec<FileSegment>> {
        if filename.len() > MAX_FILENAME_LEN {
            return Err(LotError::FilenameTooLong {
                len: filename.len(),
                max: MAX_FILENAME_LEN,
            });
        }

        let size = u32::try_from(data.len()).map_err(|_| LotError::FileTooLarge {
            size: data.len() as u64,
            max: u32::MAX as u64,
        })?;

        let mime = MimeType::classify(filename, data)?;
        let now = self.fixed_now.unwrap_or_else(Utc::now);

        let metadata = Metadata {
            version: METADATA_VERSION,
            expiry: pack_expiry(now + Duration::days(EXPIRY_DAYS)),
            size,
            mime_hash: mime.hash(),
            filename: Bytes::copy_from_slice(filename),
        };

        // One shared allocation; every payload is a slice of it.
        let content = Bytes::copy_from_slice(data);
        let count = data.len().div_ceil(MAX_SEGMENT_PAYLOAD).max(1);

        let mut segments = Vec::with_capacity(count);
        let mut metadata = Some(metadata);

        for index in 0..count {
            let start = index * MAX_SEGMENT_PAYLOAD;
            let end = (start + MAX_SEGMENT_PAYLOAD).min(content.len());

            let header_length = if index == 0 {
                (FIRST_HEADER_SIZE + filename.len()) as u8
            } else {
                BASE_HEADER_SIZE as u8
            };

            segments.push(FileSegment {
                header_length,
                repeat: 1,
                lot_id,
                sequence: index as u32,
                metadata: metadata.take(),
                payload: content.slice(start..end),
            });
        }

        Ok(segments)
    }
}

/// Segment a file using the wall clock.
pub fn segment_file(filename: &[u8], data: &[u8], lot_id: u16) -> Result<Vec<FileSegment>> {
    Segmenter::new().segment(filename, data, lot_id)
}

/// A fully segmented file, ready for cyclic transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotFile {
    /// LOT identifier.
    pub lot_id: u16,
    /// Filename as carried in the metadata.
    pub filename: String,
    /// Encoded segments ordered by sequence index.
    pub parts: Vec<Bytes>,
}

impl LotFile {
    /// Encode segments into a transmittable file.
    pub fn from_segments(filename: &[u8], lot_id: u16, segments: &[FileSegment]) -> Self {
        Self {
            lot_id,
            filename: String::from_utf8_lossy(filename).into_owned(),
            parts: segments.iter().map(FileSegment::encode).collect(),
        }
    }

    /// Segment and encode in one step.
    pub fn build(segmenter: &Segmenter, filename: &[u8], data: &[u8], lot_id: u16) -> Result<Self> {
        let segments = segmenter.segment(filename, data, lot_id)?;
        Ok(Self::from_segments(filename, lot_id, &segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mime::mime_hash;
    use chrono::TimeZone;

    fn fixed() -> Segmenter {
        Segmenter::with_fixed_time(Utc.with_ymd_and_hms(2024, 2, 28, 13, 45, 10).unwrap())
    }

    #[test]
    fn test_segment_count_and_sequence() {
        for size in [1usize, 255, 256, 257, 512, 1000] {
            let data = vec![0x41; size];
            let segments = fixed().segment(b"a.txt", &data, 3).unwrap();

            assert_eq!(segments.len(), size.div_ceil(256));
            for (i, seg) in segments.iter().enumerate() {
                assert_eq!(seg.sequence, i as u32);
                assert_eq!(seg.repeat, 1);
                assert_eq!(seg.lot_id, 3);
                assert!(seg.payload.len() <= MAX_SEGMENT_PAYLOAD);
            }
        }
    }

    #[test]
    fn test_empty_file_has_single_segment() {
        let segments = fixed().segment(b"empty.txt", b"", 1).unwrap();

        assert_eq!(segments.len(), 1);
        assert!(segments[0].payload.is_empty());
        let meta = segments[0].metadata.as_ref().unwrap();
        assert_eq!(meta.size, 0);
        assert_eq!(meta.mime_hash, mime_hash::TEXT);
    }

    #[test]
    fn test_metadata_only_on_first_segment() {
        let data = vec![0u8; 700];
        let segments = fixed().segment(b"cover.png", &data, 9).unwrap();

        assert_eq!(segments[0].header_length as usize, 24 + b"cover.png".len());
        assert!(segments[0].metadata.is_some());
        for seg in &segments[1..] {
            assert_eq!(seg.header_length, 8);
            assert!(seg.metadata.is_none());
        }
    }

    #[test]
    fn test_payloads_reassemble() {
        let data: Vec<u8> = (0..1500u32).map(|i| (i % 251) as u8).collect();
        let segments = fixed().segment(b"blob.txt", &data, 2).unwrap();

        let joined: Vec<u8> = segments.iter().flat_map(|s| s.payload.to_vec()).collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn test_first_segment_layout() {
        let segments = fixed().segment(b"a.txt", b"hello", 0x1234).unwrap();
        let bytes = segments[0].encode();

        assert_eq!(bytes[0], 24 + 5);
        assert_eq!(bytes[1], 1);
        assert_eq!(&bytes[2..4], &[0x34, 0x12]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &1u32.to_le_bytes());
        assert_eq!(&bytes[16..20], &5u32.to_le_bytes());
        assert_eq!(&bytes[20..24], &mime_hash::TEXT.to_le_bytes());
        assert_eq!(&bytes[24..29], b"a.txt");
        assert_eq!(&bytes[29..], b"hello");
    }

    #[test]
    fn test_expiry_is_one_year_ahead() {
        let segments = fixed().segment(b"a.txt", b"x", 0).unwrap();
        let expiry = segments[0].metadata.as_ref().unwrap().expiry;

        // 2024-02-28 13:45 + 365 days = 2025-02-27 13:45
        let expected = (2025 << 20) | (2 << 16) | (27 << 11) | (13 << 6) | 45;
        assert_eq!(expiry, expected);
    }

    #[test]
    fn test_unsupported_file_rejected_whole() {
        let result = fixed().segment(b"movie.mp4", &[0u8; 1024], 0);
        assert!(matches!(result, Err(LotError::UnsupportedFileType(_))));
    }

    #[test]
    fn test_filename_too_long() {
        let name = format!("{}.txt", "n".repeat(MAX_FILENAME_LEN));
        let result = fixed().segment(name.as_bytes(), b"x", 0);
        assert!(matches!(result, Err(LotError::FilenameTooLong { .. })));

        let name = format!("{}.txt", "n".repeat(MAX_FILENAME_LEN - 4));
        let segments = fixed().segment(name.as_bytes(), b"x", 0).unwrap();
        assert_eq!(segments[0].header_length, u8::MAX);
    }

    #[test]
    fn test_decode_matches_encode() {
        let data = vec![7u8; 300];
        let segments = fixed().segment(b"x.txt", &data, 5).unwrap();

        for seg in &segments {
            assert_eq!(&FileSegment::decode(&seg.encode()).unwrap(), seg);
        }
    }

    #[test]
    fn test_decode_too_short() {
        assert!(FileSegment::decode(&[8, 1, 0]).is_err());
    }

    #[test]
    fn test_lot_file_parts() {
        let file = LotFile::build(&fixed(), b"a.txt", &[1u8; 300], 4).unwrap();

        assert_eq!(file.lot_id, 4);
        assert_eq!(file.filename, "a.txt");
        assert_eq!(file.parts.len(), 2);
        assert_eq!(file.parts[1].len(), 8 + 44);
    }
}
