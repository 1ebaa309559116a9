//! Encoder configuration.
//!
//! Loaded from a JSON file; every section and field has a default, so an
//! empty object `{}` is a valid configuration.
//!
//! ```json
//! {
//!   "ingest": { "listen": "127.0.0.1:52004", "framing": "line" },
//!   "sender": { "port": 4097, "interval_ms": 10000 },
//!   "egress": { "addr": "127.0.0.1:52010" },
//!   "initial_file": { "path": "/srv/art/station.png", "lot_id": 1 },
//!   "logging": { "level": "info", "format": "text" }
//! }
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::egress::DEFAULT_CHANNEL_CAPACITY;
use crate::error::{LotError, Result};
use crate::ingest::{Framing, DEFAULT_MAX_FILE_SIZE};
use crate::protocol::DEFAULT_LOT_PORT;
use crate::sender::{SenderConfig, DEFAULT_SENDER_CAPACITY};

/// Default ingest listen address.
pub const DEFAULT_INGEST_ADDR: &str = "127.0.0.1:52004";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Command/data ingest.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Cyclic sender.
    #[serde(default)]
    pub sender: SenderSettings,

    /// Where transport PDUs go.
    #[serde(default)]
    pub egress: EgressConfig,

    /// File loaded and segmented at start-up.
    #[serde(default)]
    pub initial_file: Option<InitialFile>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| LotError::Config(format!("Failed to read config: {e}")))?;

        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.ingest.max_file_size == 0 {
            return Err(LotError::Config("ingest.max_file_size must be non-zero".into()));
        }
        if self.sender.interval_ms == Some(0) {
            return Err(LotError::Config(
                "sender.interval_ms must be non-zero (use null to disable the timer)".into(),
            ));
        }
        if self.sender.channel_capacity == 0 || self.egress.channel_capacity == 0 {
            return Err(LotError::Config("channel_capacity must be non-zero".into()));
        }
        Ok(())
    }
}

/// Ingest configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// TCP address the encoder accepts command connections on.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Command framing.
    #[serde(default)]
    pub framing: Framing,

    /// Largest accepted file payload in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 52004))
}
fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            framing: Framing::default(),
            max_file_size: default_max_file_size(),
        }
    }
}

/// Cyclic sender configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderSettings {
    /// Destination port carried in PDU headers.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Timer period in milliseconds; `null` disables timer-driven cycles.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: Option<u64>,

    /// Control channel capacity.
    #[serde(default = "default_sender_capacity")]
    pub channel_capacity: usize,
}

fn default_port() -> u16 {
    DEFAULT_LOT_PORT
}
fn default_interval_ms() -> Option<u64> {
    Some(10_000)
}
fn default_sender_capacity() -> usize {
    DEFAULT_SENDER_CAPACITY
}

impl Default for SenderSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            interval_ms: default_interval_ms(),
            channel_capacity: default_sender_capacity(),
        }
    }
}

impl SenderSettings {
    /// Runtime sender configuration.
    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            port: self.port,
            interval: self.interval_ms.map(Duration::from_millis),
            channel_capacity: self.channel_capacity,
        }
    }
}

/// Egress configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EgressConfig {
    /// TCP address PDUs are streamed to; stdout when unset.
    #[serde(default)]
    pub addr: Option<SocketAddr>,

    /// Queue capacity in front of the writer.
    #[serde(default = "default_egress_capacity")]
    pub channel_capacity: usize,
}

fn default_egress_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            addr: None,
            channel_capacity: default_egress_capacity(),
        }
    }
}

/// A local file to load at start-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialFile {
    /// Path on the local filesystem.
    pub path: PathBuf,
    /// LOT identifier to send it under.
    pub lot_id: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text or json).
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Enable colored output.
    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_color(),
        }
    }
}

/// Initialize logging. `RUST_LOG` overrides the configured level.
///
/// Logs go to stderr so stdout stays free for PDU egress.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| LotError::Config(format!("Failed to init logging: {e}")))?;
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_ansi(config.color)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|e| LotError::Config(format!("Failed to init logging: {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();

        assert_eq!(config.ingest.listen.to_string(), DEFAULT_INGEST_ADDR);
        assert_eq!(config.ingest.framing, Framing::Line);
        assert_eq!(config.ingest.max_file_size, 16 * 1024 * 1024);
        assert_eq!(config.sender.port, 0x1001);
        assert_eq!(config.sender.interval_ms, Some(10_000));
        assert!(config.egress.addr.is_none());
        assert!(config.initial_file.is_none());
        assert_eq!(config.logging.level, "info");
        config.validate().unwrap();
    }

    #[test]
    fn test_null_interval_disables_timer() {
        let config: Config = serde_json::from_str(r#"{"sender": {"interval_ms": null}}"#).unwrap();
        assert_eq!(config.sender.sender_config().interval, None);
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            "ingest": { "listen": "0.0.0.0:6000", "framing": "length_prefixed", "max_file_size": 1024 },
            "sender": { "port": 8193, "interval_ms": 250, "channel_capacity": 2 },
            "egress": { "addr": "10.0.0.2:7000", "channel_capacity": 8 },
            "initial_file": { "path": "/srv/logo.png", "lot_id": 3 },
            "logging": { "level": "debug", "format": "json", "color": false }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.ingest.framing, Framing::LengthPrefixed);
        let sender = config.sender.sender_config();
        assert_eq!(sender.port, 8193);
        assert_eq!(sender.interval, Some(Duration::from_millis(250)));
        assert_eq!(config.egress.addr.unwrap().port(), 7000);
        assert_eq!(
            config.initial_file,
            Some(InitialFile {
                path: PathBuf::from("/srv/logo.png"),
                lot_id: 3,
            })
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.sender.interval_ms = Some(0);
        assert!(matches!(config.validate(), Err(LotError::Config(_))));

        let mut config = Config::default();
        config.egress.channel_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ingest.max_file_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lotwire.json");
        std::fs::write(&path, r#"{"sender": {"port": 4098}}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.sender.port, 4098);
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(Config::load(&path), Err(LotError::Json(_))));
    }

    #[test]
    fn test_repeated_init_logging_reports_error() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);

        assert!(matches!(init_logging(&config), Err(LotError::Config(_))));
    }
}
