//! Stream a local file to the LOT encoder and announce it to the PSD stage.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use lotwire::config::{init_logging, LoggingConfig};
use lotwire::control::lot_command;
use lotwire::transport::{send_once, CommandConnection};
use lotwire::Result;

/// Send a file to the LOT encoder.
#[derive(Parser, Debug)]
#[command(name = "lot-send-file", version, about)]
struct Cli {
    /// LOT identifier
    lot_id: u16,

    /// File to send
    filename: PathBuf,

    /// Encoder host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Encoder ingest port
    #[arg(long, default_value_t = 52004)]
    file_port: u16,

    /// PSD control port
    #[arg(long, default_value_t = 52002)]
    psd_port: u16,
}

async fn run(cli: Cli) -> Result<()> {
    let data = std::fs::read(&cli.filename)?;
    let basename = cli
        .filename
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut conn = CommandConnection::connect((cli.host.as_str(), cli.file_port)).await?;
    conn.send_stream_file(cli.lot_id, &basename, &data).await?;
    conn.close().await?;
    info!("Sent {} ({} bytes) as LOT file {}", basename, data.len(), cli.lot_id);

    send_once((cli.host.as_str(), cli.psd_port), lot_command(cli.lot_id).as_bytes()).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&LoggingConfig::default()) {
        eprintln!("lot-send-file: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("lot-send-file: {e}");
            ExitCode::FAILURE
        }
    }
}
