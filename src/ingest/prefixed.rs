//! Length-prefixed `newfile` reassembler.
//!
//! Message-oriented ingest sends a file as one announcement followed by raw
//! content, possibly spread across many messages:
//!
//! ```text
//! newfile<headerLength><header><body>
//!
//! header = ...|<filename>|<lotId>|<size>   (last three fields are used)
//! body   = <size> raw bytes
//! ```
//!
//! Bytes beyond the announced size begin the next transfer.

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use super::command::{malformed, parse_field, Command};
use super::{CommandFraming, DEFAULT_MAX_FILE_SIZE};
use crate::error::Result;

/// Literal that opens every announcement.
pub const NEWFILE_PREFIX: &[u8] = b"newfile";

/// Largest accepted header length.
pub const MAX_HEADER_LENGTH: usize = 4096;

/// Digits needed to write [`MAX_HEADER_LENGTH`].
const MAX_LENGTH_DIGITS: usize = 4;

/// Transfer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferState {
    /// Looking for `newfile<digits>`.
    Idle,
    /// Collecting `expected_header_length` header bytes.
    AwaitingHeader,
    /// Collecting `expected_size` body bytes.
    ReceivingBody,
}

/// One in-flight transfer.
#[derive(Debug)]
struct PendingTransfer {
    state: TransferState,
    header: BytesMut,
    expected_header_length: usize,
    filename: String,
    lot_id: u16,
    expected_size: usize,
    /// Body exceeds the size limit and is dropped as it arrives.
    discard: bool,
    received: usize,
    body: BytesMut,
}

impl PendingTransfer {
    fn new() -> Self {
        Self {
            state: TransferState::Idle,
            header: BytesMut::new(),
            expected_header_length: 0,
            filename: String::new(),
            lot_id: 0,
            expected_size: 0,
            discard: false,
            received: 0,
            body: BytesMut::new(),
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Reassembles files from `newfile` announcements spread across messages.
pub struct PrefixedReassembler {
    input: BytesMut,
    pending: PendingTransfer,
    max_file_size: u64,
    malformed: u64,
}

impl PrefixedReassembler {
    /// Create a reassembler with the default 16 MiB payload limit.
    pub fn new() -> Self {
        Self::with_max_file_size(DEFAULT_MAX_FILE_SIZE)
    }

    /// Create a reassembler with a custom payload limit.
    pub fn with_max_file_size(max_file_size: u64) -> Self {
        Self {
            input: BytesMut::new(),
            pending: PendingTransfer::new(),
            max_file_size,
            malformed: 0,
        }
    }

    /// Whether a transfer is in progress.
    pub fn in_transfer(&self) -> bool {
        self.pending.state != TransferState::Idle
    }

    fn step(&mut self) -> Step {
        match self.pending.state {
            TransferState::Idle => self.read_prefix(),
            TransferState::AwaitingHeader => self.read_header(),
            TransferState::ReceivingBody => self.read_body(),
        }
    }

    fn read_prefix(&mut self) -> Step {
        if self.input.is_empty() {
            return Step::NeedMore;
        }

        let n = self.input.len().min(NEWFILE_PREFIX.len());
        if self.input[..n] != NEWFILE_PREFIX[..n] {
            self.resync();
            return Step::Continue;
        }
        if n < NEWFILE_PREFIX.len() {
            return Step::NeedMore;
        }

        let digits = &self.input[NEWFILE_PREFIX.len()..];
        let end = digits
            .iter()
            .take(MAX_LENGTH_DIGITS + 1)
            .position(|b| !b.is_ascii_digit());
        let Some(count) = end else {
            if digits.len() <= MAX_LENGTH_DIGITS {
                return Step::NeedMore;
            }
            self.resync();
            return Step::Continue;
        };
        let parsed = std::str::from_utf8(&digits[..count])
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|&len| len > 0 && len <= MAX_HEADER_LENGTH);

        let Some(header_length) = parsed else {
            self.resync();
            return Step::Continue;
        };

        self.input.advance(NEWFILE_PREFIX.len() + count);
        self.pending.expected_header_length = header_length;
        self.pending.state = TransferState::AwaitingHeader;
        Step::Continue
    }

    fn read_header(&mut self) -> Step {
        let needed = self.pending.expected_header_length - self.pending.header.len();
        let take = needed.min(self.input.len());
        self.pending.header.extend_from_slice(&self.input.split_to(take));
        if take < needed {
            return Step::NeedMore;
        }

        match parse_header(&self.pending.header) {
            Ok((filename, lot_id, size)) => {
                self.pending.discard = size > self.max_file_size;
                if self.pending.discard {
                    warn!(
                        "Skipping LOT file {}: {} ({} bytes exceeds limit {})",
                        lot_id, filename, size, self.max_file_size
                    );
                } else {
                    debug!("Receiving LOT file {}: {} ({} bytes)", lot_id, filename, size);
                }
                self.pending.filename = filename;
                self.pending.lot_id = lot_id;
                self.pending.expected_size = size as usize;
                self.pending.state = TransferState::ReceivingBody;
            }
            Err(e) => {
                self.malformed += 1;
                warn!("Dropping file announcement: {}", e);
                self.pending.reset();
            }
        }
        Step::Continue
    }

    fn read_body(&mut self) -> Step {
        let needed = self.pending.expected_size - self.pending.received;
        let take = needed.min(self.input.len());

        if self.pending.discard {
            self.input.advance(take);
        } else {
            self.pending.body.extend_from_slice(&self.input.split_to(take));
        }
        self.pending.received += take;
        if take < needed {
            return Step::NeedMore;
        }

        let pending = std::mem::replace(&mut self.pending, PendingTransfer::new());
        if pending.discard {
            return Step::Continue;
        }
        Step::Command(Command::StreamFile {
            lot_id: pending.lot_id,
            filename: pending.filename,
            data: pending.body.freeze(),
        })
    }

    /// Drop input up to the next possible announcement.
    fn resync(&mut self) {
        let skip = (1..self.input.len())
            .find(|&p| {
                let rest = &self.input[p..];
                let n = rest.len().min(NEWFILE_PREFIX.len());
                rest[..n] == NEWFILE_PREFIX[..n]
            })
            .unwrap_or(self.input.len());

        self.malformed += 1;
        warn!("Dropping {} bytes outside a file announcement", skip);
        self.input.advance(skip);
    }
}

enum Step {
    Command(Command),
    Continue,
    NeedMore,
}

impl CommandFraming for PrefixedReassembler {
    fn push(&mut self, data: &[u8]) -> Vec<Command> {
        self.input.extend_from_slice(data);

        let mut commands = Vec::new();
        loop {
            match self.step() {
                Step::Command(command) => commands.push(command),
                Step::Continue => {}
                Step::NeedMore => break,
            }
        }
        commands
    }

    fn malformed_count(&self) -> u64 {
        self.malformed
    }
}

impl Default for PrefixedReassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract `(filename, lot_id, size)` from the last three `|` fields.
fn parse_header(header: &[u8]) -> Result<(String, u16, u64)> {
    let text = std::str::from_utf8(header).map_err(|_| malformed(header))?;
    let fields: Vec<&str> = text.split('|').collect();
    if fields.len() < 3 {
        return Err(malformed(header));
    }

    let tail = &fields[fields.len() - 3..];
    let lot_id = parse_field(tail[1], header)?;
    let size = parse_field(tail[2], header)?;
    Ok((tail[0].to_string(), lot_id, size))
}
