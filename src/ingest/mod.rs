//! Ingest layer - turns a byte stream of commands into segmented files.
//!
//! Two framings are supported:
//!
//! - [`LineDemux`]: newline-terminated `streamfile|...` / `file|...`
//!   commands, each `streamfile` followed by its raw payload.
//! - [`PrefixedReassembler`]: `newfile<len><header>` announcements whose
//!   body may span many messages.
//!
//! Both implement [`CommandFraming`]; a [`Session`] drives one of them and
//! segments every command it yields.

mod command;
mod line;
mod prefixed;
mod session;

pub use command::Command;
pub use line::{LineDemux, MAX_LINE_LENGTH};
pub use prefixed::{PrefixedReassembler, MAX_HEADER_LENGTH, NEWFILE_PREFIX};
pub use session::{load_file, FileSource, LocalFiles, Session};

use serde::{Deserialize, Serialize};

/// Default limit on a single file payload (16 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Incremental command parser.
///
/// `push` accepts input split at arbitrary byte boundaries and returns every
/// command completed so far. Malformed input is dropped, not returned.
pub trait CommandFraming {
    /// Append `data` and extract all complete commands.
    fn push(&mut self, data: &[u8]) -> Vec<Command>;

    /// Number of malformed lines or announcements dropped so far.
    fn malformed_count(&self) -> u64;
}

/// Selects the ingest framing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Newline-terminated commands.
    #[default]
    Line,
    /// `newfile` announcements.
    LengthPrefixed,
}

impl Framing {
    /// Build a parser for this framing.
    pub fn build(self, max_file_size: u64) -> Box<dyn CommandFraming + Send> {
        match self {
            Framing::Line => Box::new(LineDemux::with_max_file_size(max_file_size)),
            Framing::LengthPrefixed => {
                Box::new(PrefixedReassembler::with_max_file_size(max_file_size))
            }
        }
    }
}
