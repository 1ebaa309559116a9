//! Encode an alert frame and send it as a `set_alert` command.

use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use lotwire::alert::{AlertEncoder, GeoCode, GeoFormat, MAX_LOCATIONS};
use lotwire::config::{init_logging, LoggingConfig};
use lotwire::transport::send_once;
use lotwire::Result;

/// Send an emergency alert.
#[derive(Parser, Debug)]
#[command(name = "lot-send-alert", version, about)]
struct Cli {
    /// Alert category (0-31)
    category: u8,

    /// Message text
    message: String,

    /// SAME area code (repeatable)
    #[arg(long)]
    same: Vec<u32>,

    /// FIPS county code (repeatable)
    #[arg(long)]
    fips: Vec<u32>,

    /// Postal code (repeatable)
    #[arg(long)]
    zip: Vec<u32>,

    /// Mark the alert as a test
    #[arg(long)]
    test: bool,

    /// Alert receiver host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Alert receiver port
    #[arg(long, default_value_t = 52000)]
    port: u16,
}

impl Cli {
    /// The single location format in use.
    fn locations(&self) -> std::result::Result<(GeoFormat, Vec<GeoCode>), String> {
        let given: Vec<(GeoFormat, &Vec<u32>)> = [
            (GeoFormat::Same, &self.same),
            (GeoFormat::Fips, &self.fips),
            (GeoFormat::Zip, &self.zip),
        ]
        .into_iter()
        .filter(|(_, codes)| !codes.is_empty())
        .collect();

        let (format, codes) = match given.as_slice() {
            [] => return Ok((GeoFormat::Same, Vec::new())),
            [single] => *single,
            _ => return Err("--same, --fips and --zip can't be combined".into()),
        };
        if codes.len() > MAX_LOCATIONS {
            return Err(format!(
                "{} locations given, at most {} allowed",
                codes.len(),
                MAX_LOCATIONS
            ));
        }

        Ok((format, codes.iter().map(|&c| GeoCode::new(format, c)).collect()))
    }
}

async fn send(cli: &Cli, command: &str) -> Result<()> {
    send_once((cli.host.as_str(), cli.port), command.as_bytes()).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&LoggingConfig::default()) {
        eprintln!("lot-send-alert: {e}");
        return ExitCode::FAILURE;
    }

    let (format, locations) = match cli.locations() {
        Ok(parsed) => parsed,
        Err(msg) => {
            eprintln!("lot-send-alert: {msg}");
            return ExitCode::from(2);
        }
    };

    let frame = match AlertEncoder::new(cli.category)
        .test(cli.test)
        .encode(format, &locations)
    {
        Ok(frame) => frame,
        Err(e) => {
            eprintln!("lot-send-alert: {e}");
            return ExitCode::from(2);
        }
    };

    let command = frame.command(&cli.message);
    print!("{command}");

    match send(&cli, &command).await {
        Ok(()) => {
            info!(
                "Sent alert category {} with {} locations to {}:{}",
                cli.category,
                locations.len(),
                cli.host,
                cli.port
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("lot-send-alert: {e}");
            ExitCode::FAILURE
        }
    }
}
