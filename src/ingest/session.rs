//! Ingest session: framing, file resolution and segmentation.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::command::Command;
use super::CommandFraming;
use crate::error::{LotError, Result};
use crate::protocol::{LotFile, Segmenter};

/// Reads file content named by `file|` commands.
pub trait FileSource: Send {
    /// Read the whole file at `path`.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Reads from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFiles;

impl FileSource for LocalFiles {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// Read and segment the file at `path`, named by its basename.
pub fn load_file<S: FileSource>(
    source: &S,
    segmenter: &Segmenter,
    path: &Path,
    lot_id: u16,
) -> Result<LotFile> {
    let data = source.read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    LotFile::build(segmenter, name.as_bytes(), &data, lot_id)
}

/// One ingest connection.
///
/// Bytes pushed into the session come out as segmented files. Commands that
/// fail to resolve are logged and dropped; the session keeps going.
pub struct Session<S: FileSource = LocalFiles> {
    framing: Box<dyn CommandFraming + Send>,
    source: S,
    segmenter: Segmenter,
    rejected: u64,
}

impl Session<LocalFiles> {
    /// Session reading `file|` commands from the local filesystem.
    pub fn new(framing: Box<dyn CommandFraming + Send>) -> Self {
        Self::with_source(framing, LocalFiles)
    }
}

impl<S: FileSource> Session<S> {
    /// Session with a custom file source.
    pub fn with_source(framing: Box<dyn CommandFraming + Send>, source: S) -> Self {
        Self {
            framing,
            source,
            segmenter: Segmenter::new(),
            rejected: 0,
        }
    }

    /// Replace the segmenter (e.g. to pin the expiry clock).
    pub fn with_segmenter(mut self, segmenter: Segmenter) -> Self {
        self.segmenter = segmenter;
        self
    }

    /// Feed a chunk and return every file it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<LotFile> {
        let mut files = Vec::new();

        for command in self.framing.push(chunk) {
            let result = self.resolve(&command);
            self.accept(&command, result, &mut files);
        }

        files
    }

    fn accept(&mut self, command: &Command, result: Result<LotFile>, files: &mut Vec<LotFile>) {
        match result {
            Ok(file) => {
                info!(
                    "Accepted LOT file {}: {} ({} segments)",
                    file.lot_id,
                    file.filename,
                    file.parts.len()
                );
                files.push(file);
            }
            Err(e) => {
                self.rejected += 1;
                warn!("Rejected LOT file {}: {}: {}", command.lot_id(), command.name(), e);
            }
        }
    }

    /// Turn a command into a segmented file.
    ///
    /// `file|` commands are read from the file source and carry only the
    /// basename of their path.
    ///
    /// # Errors
    ///
    /// I/O errors from the file source and any segmentation error.
    pub fn resolve(&self, command: &Command) -> Result<LotFile> {
        match command {
            Command::StreamFile {
                lot_id,
                filename,
                data,
            } => LotFile::build(&self.segmenter, filename.as_bytes(), data, *lot_id),
            Command::File { lot_id, path } => {
                load_file(&self.source, &self.segmenter, Path::new(path), *lot_id)
            }
        }
    }

    /// Commands that resolved to an error.
    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }

    /// Lines or announcements the framing dropped.
    pub fn malformed_count(&self) -> u64 {
        self.framing.malformed_count()
    }
}

impl<S: FileSource + Clone + 'static> Session<S> {
    /// Feed a chunk from async code.
    ///
    /// Framing and segmentation run inline; only `file|` reads go to the
    /// blocking pool, one read at a time.
    pub async fn push_async(&mut self, chunk: &[u8]) -> Vec<LotFile> {
        let mut files = Vec::new();

        for command in self.framing.push(chunk) {
            let result = match &command {
                Command::File { lot_id, path } => {
                    read_blocking(self.source.clone(), self.segmenter.clone(), path, *lot_id).await
                }
                Command::StreamFile { .. } => self.resolve(&command),
            };
            self.accept(&command, result, &mut files);
        }

        files
    }
}

async fn read_blocking<S: FileSource + 'static>(
    source: S,
    segmenter: Segmenter,
    path: &str,
    lot_id: u16,
) -> Result<LotFile> {
    let path = PathBuf::from(path);
    tokio::task::spawn_blocking(move || load_file(&source, &segmenter, &path, lot_id))
        .await
        .map_err(|e| LotError::Io(io::Error::other(format!("file read failed: {e}"))))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{LineDemux, PrefixedReassembler};
    use crate::protocol::FileSegment;
    use std::collections::HashMap;

    #[derive(Default, Clone)]
    struct MemoryFiles(HashMap<PathBuf, Vec<u8>>);

    impl FileSource for MemoryFiles {
        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
        }
    }

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];

    #[test]
    fn test_streamfile_segmented() {
        let mut session = Session::new(Box::new(LineDemux::new()));
        let mut data = b"streamfile|12|600|notes.txt\n".to_vec();
        data.extend_from_slice(&[b'a'; 600]);

        let files = session.push(&data);

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].lot_id, 12);
        assert_eq!(files[0].filename, "notes.txt");
        assert_eq!(files[0].parts.len(), 3);
    }

    #[test]
    fn test_file_command_uses_basename() {
        let mut files = MemoryFiles::default();
        files.0.insert(PathBuf::from("/art/cover.png"), PNG.to_vec());
        let mut session = Session::with_source(Box::new(LineDemux::new()), files);

        let out = session.push(b"file|4|/art/cover.png\n");

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].filename, "cover.png");
        let first = FileSegment::decode(&out[0].parts[0]).unwrap();
        assert_eq!(&first.metadata.unwrap().filename[..], b"cover.png");
    }

    #[test]
    fn test_missing_file_rejected() {
        let mut session = Session::with_source(Box::new(LineDemux::new()), MemoryFiles::default());

        assert!(session.push(b"file|4|/nope.png\n").is_empty());
        assert_eq!(session.rejected_count(), 1);
    }

    #[test]
    fn test_unsupported_type_rejected_session_continues() {
        let mut session = Session::new(Box::new(LineDemux::new()));
        let mut data = b"streamfile|1|3|data.bin\nabc".to_vec();
        data.extend_from_slice(b"streamfile|2|2|ok.txt\nok");

        let files = session.push(&data);

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].lot_id, 2);
        assert_eq!(session.rejected_count(), 1);
    }

    #[test]
    fn test_prefixed_framing() {
        let mut session = Session::new(Box::new(PrefixedReassembler::new()));

        let files = session.push(b"newfile10|a.txt|7|2hi");

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].lot_id, 7);
        assert_eq!(session.malformed_count(), 0);
    }

    #[tokio::test]
    async fn test_push_async_resolves_both_commands() {
        let mut files = MemoryFiles::default();
        files.0.insert(PathBuf::from("/art/cover.png"), PNG.to_vec());
        let mut session = Session::with_source(Box::new(LineDemux::new()), files);

        let mut data = b"file|4|/art/cover.png\nfile|5|/art/missing.png\n".to_vec();
        data.extend_from_slice(b"streamfile|6|2|ok.txt\nok");
        let out = session.push_async(&data).await;

        let ids: Vec<u16> = out.iter().map(|f| f.lot_id).collect();
        assert_eq!(ids, vec![4, 6]);
        assert_eq!(out[0].filename, "cover.png");
        assert_eq!(session.rejected_count(), 1);
    }
}
