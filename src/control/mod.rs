//! Control plane - text commands sent to downstream collaborators.
//!
//! - `set_alert|<hex>|<message>\n` delivers an alert frame
//! - `lot<id>\n` tells the PSD stage which LOT file carries the current image
//!
//! # Example
//!
//! ```
//! use lotwire::control::lot_command;
//!
//! assert_eq!(lot_command(1337), "lot1337\n");
//! ```

use crate::alert::AlertFrame;

/// Build the `set_alert` command carrying `frame`.
pub fn set_alert_command(frame: &AlertFrame, message: &str) -> String {
    format!("set_alert|{}|{}\n", frame.to_hex(), message)
}

/// Build the `lot<id>` command announcing a LOT file to the PSD stage.
pub fn lot_command(lot_id: u16) -> String {
    format!("lot{}\n", lot_id)
}

/// Build the `streamfile` header that precedes a file's raw bytes.
pub fn streamfile_command(lot_id: u16, size: usize, filename: &str) -> String {
    format!("streamfile|{}|{}|{}\n", lot_id, size, filename)
}

/// Build the `file` command naming a file on the encoder's local storage.
pub fn file_command(lot_id: u16, path: &str) -> String {
    format!("file|{}|{}\n", lot_id, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streamfile_command() {
        assert_eq!(
            streamfile_command(7, 1024, "cover.jpg"),
            "streamfile|7|1024|cover.jpg\n"
        );
    }

    #[test]
    fn test_file_command() {
        assert_eq!(file_command(2, "/srv/art/a.png"), "file|2|/srv/art/a.png\n");
    }
}
