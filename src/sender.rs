//! Cyclic sender: retransmits the active LOT file forever.
//!
//! Each cycle wraps every segment of the current file in a transport PDU and
//! hands it to egress, in sequence order. Cycles are triggered by a timer,
//! by a "channel ready" notification for the sender's port, or both.
//!
//! ```text
//! SenderHandle ── Replace / Ready ──► Sender Task ──► EgressHandle
//!                                        ▲
//!                                 interval timer
//! ```
//!
//! Replacing the file swaps an `Arc` snapshot: a cycle in progress finishes
//! against the part list it started with.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::egress::EgressHandle;
use crate::error::{LotError, Result};
use crate::protocol::{LotFile, PduEncoder, DEFAULT_LOT_PORT};

/// Default retransmission interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Default control channel capacity.
pub const DEFAULT_SENDER_CAPACITY: usize = 16;

/// Configuration for a sender task.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Destination port carried in every PDU header.
    pub port: u16,
    /// Timer period; `None` means cycles run only on ready notifications.
    pub interval: Option<Duration>,
    /// Capacity of the control channel.
    pub channel_capacity: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_LOT_PORT,
            interval: Some(DEFAULT_INTERVAL),
            channel_capacity: DEFAULT_SENDER_CAPACITY,
        }
    }
}

/// Control messages for the sender task.
#[derive(Debug)]
enum SenderMessage {
    Replace(LotFile),
    Ready(u16),
}

/// Owns the active part list and the PDU counter for one port.
///
/// Usable directly by hosts that drive cycles themselves; the sender task
/// wraps one of these.
#[derive(Debug)]
pub struct CyclicSender {
    encoder: PduEncoder,
    current: Option<Arc<LotFile>>,
    egress: EgressHandle,
    cycles: u64,
}

impl CyclicSender {
    /// Create a sender with no active file.
    pub fn new(port: u16, egress: EgressHandle) -> Self {
        Self {
            encoder: PduEncoder::new(port),
            current: None,
            egress,
            cycles: 0,
        }
    }

    /// Destination port.
    #[inline]
    pub fn port(&self) -> u16 {
        self.encoder.port()
    }

    /// The file the next cycle will send.
    pub fn current(&self) -> Option<&LotFile> {
        self.current.as_deref()
    }

    /// Number of completed cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Replace the active file.
    pub fn replace(&mut self, file: LotFile) {
        info!(
            "Replacing active LOT file with {}: {} ({} segments)",
            file.lot_id,
            file.filename,
            file.parts.len()
        );
        self.current = Some(Arc::new(file));
    }

    /// Handle a ready notification: run one cycle if `port` matches.
    ///
    /// Returns the number of PDUs sent.
    pub async fn on_ready(&mut self, port: u16) -> Result<usize> {
        if port != self.port() {
            debug!("Ignoring ready notification for port {:#06x}", port);
            return Ok(0);
        }
        self.run_cycle().await
    }

    /// Send every segment of the active file once.
    ///
    /// Returns the number of PDUs sent; zero when no file is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`LotError::ConnectionClosed`] if egress has shut down.
    pub async fn run_cycle(&mut self) -> Result<usize> {
        let Some(file) = self.current.clone() else {
            return Ok(0);
        };

        info!("Sending LOT file {}: {}", file.lot_id, file.filename);
        for part in &file.parts {
            let pdu = self.encoder.wrap(part.clone());
            self.egress.send(pdu).await?;
        }

        self.cycles += 1;
        Ok(file.parts.len())
    }
}

/// Handle for controlling a running sender task.
#[derive(Debug, Clone)]
pub struct SenderHandle {
    tx: mpsc::Sender<SenderMessage>,
    cancel: CancellationToken,
}

impl SenderHandle {
    /// Replace the active file.
    pub async fn replace(&self, file: LotFile) -> Result<()> {
        self.tx
            .send(SenderMessage::Replace(file))
            .await
            .map_err(|_| LotError::ConnectionClosed)
    }

    /// Signal that the channel for `port` can take another cycle.
    pub async fn notify_ready(&self, port: u16) -> Result<()> {
        self.tx
            .send(SenderMessage::Ready(port))
            .await
            .map_err(|_| LotError::ConnectionClosed)
    }

    /// Stop the task. No cycle starts after this; one in flight completes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token observed by the task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Spawn a sender task.
///
/// If `initial` is given, one cycle runs immediately. The task ends cleanly
/// when cancelled or when every handle is dropped, and with
/// [`LotError::ConnectionClosed`] if egress goes away.
pub fn spawn_sender_task(
    config: SenderConfig,
    initial: Option<LotFile>,
    egress: EgressHandle,
) -> (SenderHandle, JoinHandle<Result<()>>) {
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let cancel = CancellationToken::new();

    let mut sender = CyclicSender::new(config.port, egress);
    if let Some(file) = initial {
        sender.replace(file);
    }

    let handle = SenderHandle {
        tx,
        cancel: cancel.clone(),
    };
    let task = tokio::spawn(sender_loop(sender, rx, config.interval, cancel));

    (handle, task)
}

async fn sender_loop(
    mut sender: CyclicSender,
    mut rx: mpsc::Receiver<SenderMessage>,
    interval: Option<Duration>,
    cancel: CancellationToken,
) -> Result<()> {
    if sender.current().is_some() {
        sender.run_cycle().await?;
    }

    let period = interval.unwrap_or(DEFAULT_INTERVAL);
    let timer = sleep(period);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            // A due timer wins over queued control messages
            _ = &mut timer, if interval.is_some() => {
                sender.run_cycle().await?;
                timer.as_mut().reset(Instant::now() + period);
            }

            message = rx.recv() => match message {
                Some(SenderMessage::Replace(file)) => sender.replace(file),
                Some(SenderMessage::Ready(port)) => {
                    sender.on_ready(port).await?;
                }
                None => break,
            },
        }
    }

    debug!(
        "Sender for port {:#06x} stopped after {} cycles",
        sender.port(),
        sender.cycles()
    );
    Ok(())
}
