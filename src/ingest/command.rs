//! Ingress command parsing.
//!
//! Two newline-terminated commands are recognized:
//! ```text
//! streamfile|<lotId>|<size>|<filename>\n<size raw bytes>
//! file|<lotId>|<path>\n
//! ```

use std::fmt;

use bytes::Bytes;

use crate::error::{LotError, Result};

/// A complete ingress command, ready for segmentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// File content delivered in-stream.
    StreamFile {
        lot_id: u16,
        filename: String,
        data: Bytes,
    },
    /// File to be read from the encoder's local storage.
    File { lot_id: u16, path: String },
}

impl Command {
    /// LOT identifier the file is sent under.
    pub fn lot_id(&self) -> u16 {
        match self {
            Command::StreamFile { lot_id, .. } | Command::File { lot_id, .. } => *lot_id,
        }
    }

    /// Filename (or path) the command names.
    pub fn name(&self) -> &str {
        match self {
            Command::StreamFile { filename, .. } => filename,
            Command::File { path, .. } => path,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::StreamFile {
                lot_id,
                filename,
                data,
            } => write!(f, "streamfile|{}|{}|{}", lot_id, data.len(), filename),
            Command::File { lot_id, path } => write!(f, "file|{}|{}", lot_id, path),
        }
    }
}

/// A parsed command line, before any payload has arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CommandLine {
    StreamFile {
        lot_id: u16,
        size: u64,
        filename: String,
    },
    File {
        lot_id: u16,
        path: String,
    },
}

/// Parse one command line (without its trailing newline).
pub(crate) fn parse_command_line(line: &[u8]) -> Result<CommandLine> {
    let text = std::str::from_utf8(line).map_err(|_| malformed(line))?;
    let parts: Vec<&str> = text.split('|').collect();

    match parts.as_slice() {
        ["streamfile", lot_id, size, filename] => Ok(CommandLine::StreamFile {
            lot_id: parse_field(lot_id, line)?,
            size: parse_field(size, line)?,
            filename: filename.to_string(),
        }),
        ["file", lot_id, path] => Ok(CommandLine::File {
            lot_id: parse_field(lot_id, line)?,
            path: path.to_string(),
        }),
        _ => Err(malformed(line)),
    }
}

pub(crate) fn parse_field<T: std::str::FromStr>(field: &str, line: &[u8]) -> Result<T> {
    field.trim().parse().map_err(|_| malformed(line))
}

pub(crate) fn malformed(line: &[u8]) -> LotError {
    LotError::MalformedCommand(String::from_utf8_lossy(line).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_streamfile() {
        let line = parse_command_line(b"streamfile|1337|4096|cover.jpg").unwrap();
        assert_eq!(
            line,
            CommandLine::StreamFile {
                lot_id: 1337,
                size: 4096,
                filename: "cover.jpg".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_file() {
        let line = parse_command_line(b"file|2|/srv/art/logo.png").unwrap();
        assert_eq!(
            line,
            CommandLine::File {
                lot_id: 2,
                path: "/srv/art/logo.png".to_string(),
            }
        );
    }

    #[test]
    fn test_rejects_bad_numbers() {
        assert!(parse_command_line(b"streamfile|x|10|a.txt").is_err());
        assert!(parse_command_line(b"streamfile|1|-10|a.txt").is_err());
        assert!(parse_command_line(b"file|70000|a.txt").is_err());
    }

    #[test]
    fn test_rejects_wrong_field_count() {
        assert!(parse_command_line(b"streamfile|1|10").is_err());
        assert!(parse_command_line(b"file|1|a|b").is_err());
        assert!(parse_command_line(b"hello").is_err());
        assert!(parse_command_line(b"").is_err());
    }

    #[test]
    fn test_malformed_names_line() {
        let err = parse_command_line(b"bogus|1").unwrap_err();
        assert!(matches!(err, LotError::MalformedCommand(ref l) if l == "bogus|1"));
    }

    #[test]
    fn test_command_display() {
        let cmd = Command::StreamFile {
            lot_id: 1,
            filename: "a.txt".to_string(),
            data: Bytes::from_static(b"abc"),
        };
        assert_eq!(cmd.to_string(), "streamfile|1|3|a.txt");
        assert_eq!(cmd.name(), "a.txt");
        assert_eq!(cmd.lot_id(), 1);
    }
}
