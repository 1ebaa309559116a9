//! Newline-framed command demultiplexer.
//!
//! Uses `bytes::BytesMut` to accumulate partial reads and a small state
//! machine to separate command lines from raw file payloads:
//! - `Idle`: nothing buffered
//! - `AwaitingLine`: partial command line buffered, no newline yet
//! - `ReceivingBody`: `streamfile` header parsed, need N more payload bytes
//! - `Discarding`: payload over the size limit, dropping N more bytes
//! - `SkippingLine`: line over the length limit, dropping up to its newline
//!
//! # Example
//!
//! ```
//! use lotwire::ingest::{Command, CommandFraming, LineDemux};
//!
//! let mut demux = LineDemux::new();
//!
//! let mut commands = demux.push(b"streamfile|7|5|a.t");
//! commands.extend(demux.push(b"xt\nhello"));
//!
//! assert_eq!(commands.len(), 1);
//! assert!(matches!(&commands[0], Command::StreamFile { lot_id: 7, .. }));
//! ```

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use super::command::{parse_command_line, Command, CommandLine};
use super::{CommandFraming, DEFAULT_MAX_FILE_SIZE};

/// Longest accepted command line, excluding the newline.
pub const MAX_LINE_LENGTH: usize = 4096;

/// State machine for command parsing.
#[derive(Debug, Clone)]
enum State {
    /// Nothing buffered.
    Idle,
    /// Waiting for a newline; `scanned` bytes are known not to contain one.
    AwaitingLine { scanned: usize },
    /// Header parsed, waiting for `size` payload bytes.
    ReceivingBody {
        lot_id: u16,
        filename: String,
        size: usize,
    },
    /// Dropping an oversized payload.
    Discarding { remaining: u64 },
    /// Dropping the rest of an overlong line.
    SkippingLine,
}

/// Demultiplexes newline-terminated commands and their payloads.
///
/// Input may be split at any byte. A malformed line is dropped with a
/// warning and parsing resumes at the next line.
pub struct LineDemux {
    /// Accumulated bytes not yet consumed.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Largest accepted `streamfile` payload.
    max_file_size: u64,
    /// Lines dropped as malformed.
    malformed: u64,
}

impl LineDemux {
    /// Create a demultiplexer with the default 16 MiB payload limit.
    pub fn new() -> Self {
        Self::with_max_file_size(DEFAULT_MAX_FILE_SIZE)
    }

    /// Create a demultiplexer with a custom payload limit.
    pub fn with_max_file_size(max_file_size: u64) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::Idle,
            max_file_size,
            malformed: 0,
        }
    }

    /// Number of buffered bytes not yet consumed.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard buffered input and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::Idle;
    }

    /// Try to extract a single command from the buffer.
    fn try_extract_one(&mut self) -> Option<Command> {
        loop {
            match &mut self.state {
                State::Idle | State::AwaitingLine { .. } => {
                    let scanned = match self.state {
                        State::AwaitingLine { scanned } => scanned,
                        _ => 0,
                    };
                    if self.buffer.is_empty() {
                        self.state = State::Idle;
                        return None;
                    }

                    let Some(offset) = self.buffer[scanned..].iter().position(|&b| b == b'\n')
                    else {
                        if self.buffer.len() > MAX_LINE_LENGTH {
                            self.drop_long_line();
                            self.state = State::SkippingLine;
                            continue;
                        }
                        self.state = State::AwaitingLine {
                            scanned: self.buffer.len(),
                        };
                        return None;
                    };

                    let line = self.buffer.split_to(scanned + offset + 1);
                    self.state = State::Idle;
                    if line.len() - 1 > MAX_LINE_LENGTH {
                        self.drop_long_line();
                        continue;
                    }

                    match parse_command_line(&line[..line.len() - 1]) {
                        Ok(CommandLine::File { lot_id, path }) => {
                            return Some(Command::File { lot_id, path });
                        }
                        Ok(CommandLine::StreamFile {
                            lot_id,
                            size,
                            filename,
                        }) => {
                            if size > self.max_file_size {
                                warn!(
                                    "Skipping LOT file {}: {} ({} bytes exceeds limit {})",
                                    lot_id, filename, size, self.max_file_size
                                );
                                self.state = State::Discarding { remaining: size };
                            } else {
                                debug!("Receiving LOT file {}: {} ({} bytes)", lot_id, filename, size);
                                self.state = State::ReceivingBody {
                                    lot_id,
                                    filename,
                                    size: size as usize,
                                };
                            }
                        }
                        Err(e) => {
                            self.malformed += 1;
                            warn!("Dropping command line: {}", e);
                        }
                    }
                }

                State::ReceivingBody {
                    lot_id,
                    filename,
                    size,
                } => {
                    if self.buffer.len() < *size {
                        return None;
                    }

                    // Zero-copy freeze of the payload
                    let data = self.buffer.split_to(*size).freeze();
                    let command = Command::StreamFile {
                        lot_id: *lot_id,
                        filename: std::mem::take(filename),
                        data,
                    };
                    self.state = State::Idle;
                    return Some(command);
                }

                State::Discarding { remaining } => {
                    let n = (*remaining).min(self.buffer.len() as u64);
                    self.buffer.advance(n as usize);
                    *remaining -= n;
                    if *remaining > 0 {
                        return None;
                    }
                    self.state = State::Idle;
                }

                State::SkippingLine => {
                    let Some(offset) = self.buffer.iter().position(|&b| b == b'\n') else {
                        self.buffer.clear();
                        return None;
                    };
                    self.buffer.advance(offset + 1);
                    self.state = State::Idle;
                }
            }
        }
    }

    fn drop_long_line(&mut self) {
        self.malformed += 1;
        warn!("Dropping command line longer than {} bytes", MAX_LINE_LENGTH);
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::Idle => "Idle",
            State::AwaitingLine { .. } => "AwaitingLine",
            State::ReceivingBody { .. } => "ReceivingBody",
            State::Discarding { .. } => "Discarding",
            State::SkippingLine => "SkippingLine",
        }
    }
}

impl CommandFraming for LineDemux {
    fn push(&mut self, data: &[u8]) -> Vec<Command> {
        self.buffer.extend_from_slice(data);

        let mut commands = Vec::new();
        while let Some(command) = self.try_extract_one() {
            commands.push(command);
        }
        commands
    }

    fn malformed_count(&self) -> u64 {
        self.malformed
    }
}

impl Default for LineDemux {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn streamfile(lot_id: u16, filename: &str, data: &[u8]) -> Vec<u8> {
        let mut bytes = format!("streamfile|{}|{}|{}\n", lot_id, data.len(), filename).into_bytes();
        bytes.extend_from_slice(data);
        bytes
    }

    fn stream_command(lot_id: u16, filename: &str, data: &'static [u8]) -> Command {
        Command::StreamFile {
            lot_id,
            filename: filename.to_string(),
            data: Bytes::from_static(data),
        }
    }

    #[test]
    fn test_single_streamfile() {
        let mut demux = LineDemux::new();
        let commands = demux.push(&streamfile(1, "a.txt", b"hello"));

        assert_eq!(commands, vec![stream_command(1, "a.txt", b"hello")]);
        assert!(demux.is_empty());
        assert_eq!(demux.state_name(), "Idle");
    }

    #[test]
    fn test_file_command() {
        let mut demux = LineDemux::new();
        let commands = demux.push(b"file|3|/srv/logo.png\n");

        assert_eq!(
            commands,
            vec![Command::File {
                lot_id: 3,
                path: "/srv/logo.png".to_string(),
            }]
        );
    }

    #[test]
    fn test_multiple_commands_in_one_push() {
        let mut demux = LineDemux::new();
        let mut data = streamfile(1, "a.txt", b"one");
        data.extend_from_slice(b"file|2|b.png\n");
        data.extend_from_slice(&streamfile(3, "c.txt", b"three"));

        let commands = demux.push(&data);

        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].lot_id(), 1);
        assert_eq!(commands[1].lot_id(), 2);
        assert_eq!(commands[2], stream_command(3, "c.txt", b"three"));
    }

    #[test]
    fn test_fragmented_line() {
        let mut demux = LineDemux::new();
        let data = streamfile(1, "a.txt", b"hi");

        assert!(demux.push(&data[..8]).is_empty());
        assert_eq!(demux.state_name(), "AwaitingLine");

        let commands = demux.push(&data[8..]);
        assert_eq!(commands, vec![stream_command(1, "a.txt", b"hi")]);
    }

    #[test]
    fn test_fragmented_body() {
        let mut demux = LineDemux::new();
        let data = streamfile(1, "a.txt", b"a longer payload split in two");
        let header_len = data.iter().position(|&b| b == b'\n').unwrap() + 1;

        assert!(demux.push(&data[..header_len + 5]).is_empty());
        assert_eq!(demux.state_name(), "ReceivingBody");

        let commands = demux.push(&data[header_len + 5..]);
        assert_eq!(
            commands,
            vec![stream_command(1, "a.txt", b"a longer payload split in two")]
        );
    }

    #[test]
    fn test_body_containing_newlines() {
        let mut demux = LineDemux::new();
        let mut data = streamfile(1, "a.txt", b"x\ny\n");
        data.extend_from_slice(b"file|2|b.png\n");

        let commands = demux.push(&data);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0], stream_command(1, "a.txt", b"x\ny\n"));
    }

    #[test]
    fn test_empty_body() {
        let mut demux = LineDemux::new();
        let commands = demux.push(b"streamfile|9|empty.txt\n");
        assert!(commands.is_empty());
        assert_eq!(demux.malformed_count(), 1);

        let commands = demux.push(b"streamfile|9|0|empty.txt\n");
        assert_eq!(commands, vec![stream_command(9, "empty.txt", b"")]);
    }

    #[test]
    fn test_malformed_lines_dropped() {
        let mut demux = LineDemux::new();
        let mut data = b"garbage\nstreamfile|1|2\nfile|x|y\n".to_vec();
        data.extend_from_slice(&streamfile(4, "ok.txt", b"ok"));

        let commands = demux.push(&data);

        assert_eq!(commands, vec![stream_command(4, "ok.txt", b"ok")]);
        assert_eq!(demux.malformed_count(), 3);
    }

    #[test]
    fn test_oversized_payload_skipped() {
        let mut demux = LineDemux::with_max_file_size(4);
        let mut data = streamfile(1, "big.txt", b"too large");
        data.extend_from_slice(&streamfile(2, "ok.txt", b"fine"));

        let commands = demux.push(&data[..20]);
        assert!(commands.is_empty());

        let commands = demux.push(&data[20..]);
        assert_eq!(commands, vec![stream_command(2, "ok.txt", b"fine")]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut demux = LineDemux::new();
        let mut data = streamfile(5, "cover.txt", b"hi\n");
        data.extend_from_slice(b"file|6|x.png\n");

        let mut all = Vec::new();
        for byte in &data {
            all.extend(demux.push(&[*byte]));
        }

        assert_eq!(all.len(), 2);
        assert_eq!(all[0], stream_command(5, "cover.txt", b"hi\n"));
        assert_eq!(all[1].name(), "x.png");
        assert!(demux.is_empty());
    }

    #[test]
    fn test_clear_resets_state() {
        let mut demux = LineDemux::new();
        demux.push(b"streamfile|1|10|a.txt\nabc");
        assert_eq!(demux.state_name(), "ReceivingBody");

        demux.clear();

        assert_eq!(demux.state_name(), "Idle");
        assert!(demux.is_empty());
    }

    #[test]
    fn test_unterminated_line_capped() {
        let mut demux = LineDemux::new();

        assert!(demux.push(&[b'a'; MAX_LINE_LENGTH + 1]).is_empty());
        assert_eq!(demux.state_name(), "SkippingLine");
        assert!(demux.is_empty());
        assert_eq!(demux.malformed_count(), 1);

        let mut data = b"still the same line\n".to_vec();
        data.extend_from_slice(&streamfile(2, "ok.txt", b"ok"));
        let commands = demux.push(&data);

        assert_eq!(commands, vec![stream_command(2, "ok.txt", b"ok")]);
        assert_eq!(demux.malformed_count(), 1);
    }

    #[test]
    fn test_overlong_terminated_line_dropped() {
        let mut demux = LineDemux::new();
        let mut data = vec![b'x'; MAX_LINE_LENGTH + 1];
        data.push(b'\n');
        data.extend_from_slice(b"file|3|a.png\n");

        let commands = demux.push(&data);

        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].lot_id(), 3);
        assert_eq!(demux.malformed_count(), 1);
    }
}
