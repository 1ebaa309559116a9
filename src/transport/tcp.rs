//! TCP helpers for the encoder's command and alert ports.
//!
//! # Example
//!
//! ```no_run
//! use lotwire::transport::CommandConnection;
//!
//! # async fn run() -> lotwire::Result<()> {
//! let mut conn = CommandConnection::connect("127.0.0.1:52004").await?;
//! conn.send_stream_file(1, "cover.png", &std::fs::read("cover.png")?).await?;
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

use std::net::Shutdown;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::control::{file_command, streamfile_command};
use crate::error::Result;

/// Connect, write `data`, then shut the socket down in both directions.
pub async fn send_once<A: ToSocketAddrs>(addr: A, data: &[u8]) -> Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(data).await?;
    stream.flush().await?;
    close_both(stream)
}

fn close_both(stream: TcpStream) -> Result<()> {
    let stream = stream.into_std()?;
    match stream.shutdown(Shutdown::Both) {
        // Peer already gone.
        Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
        other => Ok(other?),
    }
}

/// An outbound connection to the encoder's ingest port.
#[derive(Debug)]
pub struct CommandConnection {
    stream: TcpStream,
}

impl CommandConnection {
    /// Connect to the ingest port.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Stream a file in-band: `streamfile|<lotId>|<size>|<filename>\n` + data.
    pub async fn send_stream_file(&mut self, lot_id: u16, filename: &str, data: &[u8]) -> Result<()> {
        let header = streamfile_command(lot_id, data.len(), filename);
        debug!("Streaming {} bytes as LOT file {}", data.len(), lot_id);
        self.stream.write_all(header.as_bytes()).await?;
        self.stream.write_all(data).await?;
        Ok(())
    }

    /// Ask the encoder to read a file from its own storage.
    pub async fn send_file(&mut self, lot_id: u16, path: &str) -> Result<()> {
        self.send_raw(file_command(lot_id, path).as_bytes()).await
    }

    /// Write raw bytes.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        Ok(())
    }

    /// Flush and shut the connection down in both directions.
    pub async fn close(mut self) -> Result<()> {
        self.stream.flush().await?;
        close_both(self.stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_once_delivers_and_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            socket.read_to_end(&mut buf).await.unwrap();
            buf
        });

        send_once(addr, b"set_alert|00|hi\n").await.unwrap();

        assert_eq!(server.await.unwrap(), b"set_alert|00|hi\n");
    }

    #[tokio::test]
    async fn test_command_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            socket.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let mut conn = CommandConnection::connect(addr).await.unwrap();
        conn.send_stream_file(4, "a.txt", b"abc").await.unwrap();
        conn.send_file(5, "/srv/b.png").await.unwrap();
        conn.close().await.unwrap();

        assert_eq!(
            server.await.unwrap(),
            b"streamfile|4|3|a.txt\nabcfile|5|/srv/b.png\n"
        );
    }
}
