//! Protocol module - LOT segment framing, MIME classification and transport PDUs.
//!
//! This module implements the binary formats sent over the broadcast channel:
//! - File segmentation with the metadata-bearing first segment
//! - Magic-byte and extension sniffing for the MIME hash
//! - 5-byte transport header with a wrapping PDU counter

mod mime;
mod pdu;
mod segment;

pub use mime::{mime_hash, MimeType};
pub use pdu::{
    OutboundPdu, PduEncoder, PduHeader, DEFAULT_LOT_PORT, LOT_OPCODE, PDU_HEADER_SIZE,
};
pub use segment::{
    pack_expiry, segment_file, FileSegment, LotFile, Metadata, Segmenter, BASE_HEADER_SIZE,
    FIRST_HEADER_SIZE, MAX_FILENAME_LEN, MAX_SEGMENT_PAYLOAD, METADATA_VERSION,
};
