//! Egress for transport PDUs.
//!
//! Senders hand PDUs to an [`EgressHandle`]. Behind the handle is either a
//! plain channel, for hosts that carry frames onward themselves, or a
//! dedicated writer task that batches PDUs into vectored writes:
//!
//! ```text
//! Sender 1 ─┐
//! Sender 2 ─┼─► mpsc::Sender<OutboundPdu> ─► Writer Task ─► AsyncWrite
//! Sender N ─┘
//! ```

use std::io::IoSlice;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{LotError, Result};
use crate::protocol::{OutboundPdu, PDU_HEADER_SIZE};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum PDUs to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Handle for sending PDUs to egress.
///
/// Cheaply cloneable; every sender task holds one.
#[derive(Debug, Clone)]
pub struct EgressHandle {
    tx: mpsc::Sender<OutboundPdu>,
}

impl EgressHandle {
    /// Send a PDU, waiting while the channel is full.
    ///
    /// # Errors
    ///
    /// Returns [`LotError::ConnectionClosed`] once the receiving side is gone.
    pub async fn send(&self, pdu: OutboundPdu) -> Result<()> {
        self.tx
            .send(pdu)
            .await
            .map_err(|_| LotError::ConnectionClosed)
    }

    /// Whether the receiving side has shut down.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a channel-backed egress.
///
/// The host drains the receiver and carries PDUs onward.
pub fn egress_channel(capacity: usize) -> (EgressHandle, mpsc::Receiver<OutboundPdu>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EgressHandle { tx }, rx)
}

/// Spawn a writer task streaming PDUs to `writer`.
///
/// Returns the handle and the task's `JoinHandle`. The task ends cleanly
/// once every handle is dropped, or with an error if a write fails.
pub fn spawn_egress_task<W>(
    writer: W,
    channel_capacity: usize,
) -> (EgressHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (handle, rx) = egress_channel(channel_capacity);
    let task = tokio::spawn(async move {
        let result = writer_loop(rx, writer).await;
        if let Err(e) = &result {
            error!("Egress writer stopped: {}", e);
        }
        result
    });
    (handle, task)
}

/// Receive PDUs and write them out in batches.
async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundPdu>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(pdu) => batch.push(pdu),
                Err(_) => break,
            }
        }

        write_batch(&mut writer, &batch).await?;
        batch.clear();
    }

    debug!("Egress channel closed");
    writer.shutdown().await?;
    Ok(())
}

/// Write a batch of PDUs with scatter/gather I/O, resuming after partial writes.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundPdu]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundPdu::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(LotError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlices for the data remaining after `skip_bytes` were written.
fn build_remaining_slices(batch: &[OutboundPdu], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for pdu in batch {
        let header_end = offset + PDU_HEADER_SIZE;
        if skip_bytes < header_end {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&pdu.header[start..]));
        }
        offset = header_end;

        let segment_end = offset + pdu.segment.len();
        if skip_bytes < segment_end {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&pdu.segment[start..]));
        }
        offset = segment_end;
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PduEncoder;
    use bytes::Bytes;
    use std::io::Cursor;
    use tokio::io::{duplex, AsyncReadExt};

    fn pdus(count: usize) -> Vec<OutboundPdu> {
        let mut encoder = PduEncoder::new(0x1001);
        (0..count)
            .map(|_| encoder.wrap(Bytes::from_static(b"segment")))
            .collect()
    }

    #[test]
    fn test_build_remaining_slices_no_skip() {
        let batch = pdus(1);
        let slices = build_remaining_slices(&batch, 0);

        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), PDU_HEADER_SIZE);
    }

    #[test]
    fn test_build_remaining_slices_partial_header() {
        let batch = pdus(1);
        let slices = build_remaining_slices(&batch, 3);

        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), PDU_HEADER_SIZE - 3);
        assert_eq!(slices[1].len(), 7);
    }

    #[test]
    fn test_build_remaining_slices_second_pdu() {
        let batch = pdus(2);
        let slices = build_remaining_slices(&batch, PDU_HEADER_SIZE + 7 + 1);

        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), PDU_HEADER_SIZE - 1);
    }

    #[tokio::test]
    async fn test_write_batch_concatenates() {
        let mut buf = Cursor::new(Vec::new());
        let batch = pdus(3);

        write_batch(&mut buf, &batch).await.unwrap();

        let expected: Vec<u8> = batch.iter().flat_map(|p| p.to_bytes().to_vec()).collect();
        assert_eq!(buf.into_inner(), expected);
    }

    #[tokio::test]
    async fn test_channel_egress() {
        let (handle, mut rx) = egress_channel(4);
        let pdu = pdus(1).remove(0);

        handle.send(pdu.clone()).await.unwrap();

        assert_eq!(rx.recv().await, Some(pdu));
    }

    #[tokio::test]
    async fn test_send_after_close() {
        let (handle, rx) = egress_channel(4);
        drop(rx);

        assert!(handle.is_closed());
        let result = handle.send(pdus(1).remove(0)).await;
        assert!(matches!(result, Err(LotError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_writer_task_streams_pdus() {
        let (client, mut server) = duplex(4096);
        let (handle, task) = spawn_egress_task(client, 16);

        let batch = pdus(10);
        for pdu in batch.clone() {
            handle.send(pdu).await.unwrap();
        }
        drop(handle);
        task.await.unwrap().unwrap();

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();

        let expected: Vec<u8> = batch.iter().flat_map(|p| p.to_bytes().to_vec()).collect();
        assert_eq!(received, expected);
    }
}
