//! Encoder builder and runtime loop.
//!
//! The [`EncoderBuilder`] configures ingest and the cyclic sender. The
//! running [`Encoder`] manages the lifecycle:
//! 1. Spawn the sender task (one cycle at once if a file is loaded)
//! 2. Bind the ingest listener
//! 3. Accept connections; each gets its own [`Session`] on its own task
//! 4. Every segmented file replaces the sender's part list
//!
//! # Example
//!
//! ```no_run
//! use lotwire::egress::spawn_egress_task;
//! use lotwire::Encoder;
//!
//! #[tokio::main]
//! async fn main() -> lotwire::Result<()> {
//!     let (egress, _writer) = spawn_egress_task(tokio::io::stdout(), 1024);
//!
//!     let encoder = Encoder::builder()
//!         .listen("127.0.0.1:52004".parse().unwrap())
//!         .port(0x1001)
//!         .start(egress)
//!         .await?;
//!
//!     encoder.wait_for_shutdown().await
//! }
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::egress::EgressHandle;
use crate::error::{LotError, Result};
use crate::ingest::{load_file, Framing, LocalFiles, Session, DEFAULT_MAX_FILE_SIZE};
use crate::protocol::{LotFile, Segmenter};
use crate::sender::{spawn_sender_task, SenderConfig, SenderHandle};

/// Read buffer size per connection.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Builder for an [`Encoder`].
#[derive(Debug, Clone)]
pub struct EncoderBuilder {
    listen: SocketAddr,
    framing: Framing,
    max_file_size: u64,
    sender: SenderConfig,
    initial_file: Option<LotFile>,
    segmenter: Segmenter,
}

impl EncoderBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 52004)),
            framing: Framing::default(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            sender: SenderConfig::default(),
            initial_file: None,
            segmenter: Segmenter::new(),
        }
    }

    /// Build from configuration, loading `initial_file` if set.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the initial file can't be
    /// read or segmented.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let mut builder = Self::new()
            .listen(config.ingest.listen)
            .framing(config.ingest.framing)
            .max_file_size(config.ingest.max_file_size)
            .sender_config(config.sender.sender_config());

        if let Some(initial) = &config.initial_file {
            let file = load_file(&LocalFiles, &builder.segmenter, &initial.path, initial.lot_id)?;
            builder = builder.initial_file(file);
        }
        Ok(builder)
    }

    /// Set the ingest listen address (port 0 picks a free port).
    pub fn listen(mut self, addr: SocketAddr) -> Self {
        self.listen = addr;
        self
    }

    /// Set the ingest framing.
    pub fn framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Set the largest accepted file payload.
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Set the destination port carried in PDU headers.
    pub fn port(mut self, port: u16) -> Self {
        self.sender.port = port;
        self
    }

    /// Set the retransmission interval; `None` disables the timer.
    pub fn interval(mut self, interval: Option<Duration>) -> Self {
        self.sender.interval = interval;
        self
    }

    /// Replace the whole sender configuration.
    pub fn sender_config(mut self, config: SenderConfig) -> Self {
        self.sender = config;
        self
    }

    /// Start with `file` already active.
    pub fn initial_file(mut self, file: LotFile) -> Self {
        self.initial_file = Some(file);
        self
    }

    /// Use a specific segmenter (e.g. a fixed expiry clock).
    pub fn segmenter(mut self, segmenter: Segmenter) -> Self {
        self.segmenter = segmenter;
        self
    }

    /// Start the encoder, sending PDUs to `egress`.
    pub async fn start(self, egress: EgressHandle) -> Result<Encoder> {
        Encoder::start(self, egress).await
    }
}

impl Default for EncoderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running encoder.
pub struct Encoder {
    local_addr: SocketAddr,
    sender: SenderHandle,
    sender_task: JoinHandle<Result<()>>,
    accept_task: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl Encoder {
    /// Create a new encoder builder.
    pub fn builder() -> EncoderBuilder {
        EncoderBuilder::new()
    }

    async fn start(builder: EncoderBuilder, egress: EgressHandle) -> Result<Self> {
        let listener = TcpListener::bind(builder.listen).await?;
        let local_addr = listener.local_addr()?;
        info!("Listening for LOT commands on {}", local_addr);

        let (sender, sender_task) =
            spawn_sender_task(builder.sender.clone(), builder.initial_file.clone(), egress);

        let shutdown = sender.cancellation_token();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            builder,
            sender.clone(),
            shutdown.clone(),
        ));

        Ok(Encoder {
            local_addr,
            sender,
            sender_task,
            accept_task,
            shutdown,
        })
    }

    /// Address the ingest listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle to the cyclic sender (e.g. for ready notifications).
    pub fn sender(&self) -> &SenderHandle {
        &self.sender
    }

    /// Stop accepting, stop the sender and wait for it to finish.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.cancel();
        self.accept_task.abort();
        join_sender(self.sender_task).await
    }

    /// Wait until the sender stops (egress closed or cancelled).
    pub async fn wait_for_shutdown(self) -> Result<()> {
        let result = join_sender(self.sender_task).await;
        self.shutdown.cancel();
        self.accept_task.abort();
        result
    }
}

async fn join_sender(task: JoinHandle<Result<()>>) -> Result<()> {
    task.await
        .map_err(|e| LotError::Io(std::io::Error::other(format!("sender task failed: {e}"))))?
}

/// Accept ingest connections until shutdown.
async fn accept_loop(
    listener: TcpListener,
    builder: EncoderBuilder,
    sender: SenderHandle,
    shutdown: CancellationToken,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            },
        };

        debug!("Ingest connection from {}", peer);
        let session = Session::new(builder.framing.build(builder.max_file_size))
            .with_segmenter(builder.segmenter.clone());
        let sender = sender.clone();

        tokio::spawn(async move {
            match serve_connection(stream, session, sender).await {
                Ok(malformed) if malformed > 0 => {
                    warn!("Connection {} closed, {} malformed commands dropped", peer, malformed)
                }
                Ok(_) => debug!("Connection {} closed", peer),
                Err(e) => error!("Connection {} failed: {}", peer, e),
            }
        });
    }
}

/// Read one connection to EOF, replacing the active file as files complete.
///
/// A stalled connection only parks its own task. Returns the number of
/// malformed commands the session dropped.
async fn serve_connection<R>(
    mut reader: R,
    mut session: Session<LocalFiles>,
    sender: SenderHandle,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        for file in session.push_async(&buf[..n]).await {
            if sender.replace(file).await.is_err() {
                warn!("Sender stopped, discarding ingest");
                return Ok(session.malformed_count());
            }
        }
    }
    Ok(session.malformed_count())
}
