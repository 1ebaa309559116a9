//! LOT encoder service.
//!
//! Accepts `streamfile`/`file` commands on the ingest port, segments every
//! file it receives and cyclically streams transport PDUs to egress (a TCP
//! address, or stdout when none is configured).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::TcpStream;
use tracing::{error, info};

use lotwire::config::{init_logging, Config, InitialFile};
use lotwire::egress::spawn_egress_task;
use lotwire::{EncoderBuilder, Result};

/// LOT file encoder: segments files and retransmits them cyclically.
#[derive(Parser, Debug)]
#[command(name = "lot-encoder", version, about)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ingest listen address
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Stream PDUs to this TCP address instead of stdout
    #[arg(long)]
    egress: Option<SocketAddr>,

    /// Destination port in PDU headers (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_port)]
    port: Option<u16>,

    /// Retransmission interval in milliseconds
    #[arg(long, conflicts_with = "no_timer")]
    interval_ms: Option<u64>,

    /// Only send cycles on ready notifications
    #[arg(long)]
    no_timer: bool,

    /// File to load at start-up
    #[arg(long, requires = "lot_id")]
    file: Option<PathBuf>,

    /// LOT identifier for --file
    #[arg(long, requires = "file")]
    lot_id: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

fn parse_port(s: &str) -> std::result::Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid port {s:?}: {e}"))
}

impl Cli {
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(listen) = self.listen {
            config.ingest.listen = listen;
        }
        if let Some(addr) = self.egress {
            config.egress.addr = Some(addr);
        }
        if let Some(port) = self.port {
            config.sender.port = port;
        }
        if self.no_timer {
            config.sender.interval_ms = None;
        } else if let Some(ms) = self.interval_ms {
            config.sender.interval_ms = Some(ms);
        }
        if let (Some(path), Some(lot_id)) = (self.file, self.lot_id) {
            config.initial_file = Some(InitialFile { path, lot_id });
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }
}

async fn run(config: Config) -> Result<()> {
    let builder = EncoderBuilder::from_config(&config)?;

    let (egress, writer) = match config.egress.addr {
        Some(addr) => {
            let stream = TcpStream::connect(addr).await?;
            info!("Streaming PDUs to {}", addr);
            spawn_egress_task(stream, config.egress.channel_capacity)
        }
        None => spawn_egress_task(tokio::io::stdout(), config.egress.channel_capacity),
    };

    let encoder = builder.start(egress).await?;
    let token = encoder.sender().cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            token.cancel();
        }
    });

    encoder.wait_for_shutdown().await?;
    if let Ok(result) = writer.await {
        result?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("lot-encoder: {e}");
            return ExitCode::from(2);
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("lot-encoder: {e}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
