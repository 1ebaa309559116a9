//! # lotwire
//!
//! Broadcast data-service encoders for digital radio.
//!
//! Two protocols live in this crate:
//!
//! - **LOT transfer**: a file is cut into sequenced, metadata-tagged
//!   segments, each wrapped in a small transport PDU, and the whole set is
//!   retransmitted cyclically so a receiver tuning in mid-cycle still gets
//!   every part.
//! - **Alert frames**: an alert category and a sorted list of location codes
//!   packed into a dense, adjacency-compressed bitstream.
//!
//! ## Architecture
//!
//! ```text
//! TCP ingest ─► Session (framing + segmenter) ─► CyclicSender ─► Egress
//!                                                    ▲
//!                                          timer / ready notification
//! ```
//!
//! ## Example
//!
//! ```
//! use lotwire::protocol::{LotFile, PduEncoder, Segmenter};
//!
//! let file = LotFile::build(&Segmenter::new(), b"note.txt", b"hello", 1).unwrap();
//! let mut pdus = PduEncoder::new(0x1001);
//!
//! for part in &file.parts {
//!     let pdu = pdus.wrap(part.clone());
//!     assert_eq!(pdu.header[0], 0x21);
//! }
//! ```

pub mod alert;
pub mod config;
pub mod control;
pub mod egress;
pub mod error;
pub mod ingest;
pub mod protocol;
pub mod sender;
pub mod transport;

mod server;

pub use error::{LotError, Result};
pub use server::{Encoder, EncoderBuilder};
