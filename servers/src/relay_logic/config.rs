use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Topics subscribed on every new upstream connection. Compressed topics
/// carry the `.z` marker; the decoder strips it before merging.
pub const DEFAULT_TOPICS: &[&str] = &[
    "Heartbeat",
    "CarData.z",
    "Position.z",
    "ExtrapolatedClock",
    "TopThree",
    "RcmSeries",
    "TimingStats",
    "TimingAppData",
    "WeatherData",
    "TrackStatus",
    "DriverList",
    "RaceControlMessages",
    "SessionInfo",
    "SessionData",
    "LapCount",
    "TimingData",
];

const DEFAULT_UPSTREAM_URL: &str = "https://livetiming.formula1.com/signalr";
const DEFAULT_HUB: &str = "Streaming";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_RETRY_DELAY_MS: u64 = 10_000;
const DEFAULT_BROADCAST_INTERVAL_MS: u64 = 250;

/// Raw, partially-filled settings as they arrive from one source (CLI,
/// environment or config file). Sources are merged field-by-field before
/// [`Config`] is built.
#[derive(Parser, Deserialize, Debug, Clone, Default)]
#[clap(about = "Live timing relay server", version)]
#[serde(rename_all = "camelCase", default)]
struct ConfigArgs {
    #[clap(long, env = "RELAY_PORT", help = "Port to listen on for subscriber connections.")]
    port: Option<u16>,

    #[clap(long, env = "RELAY_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    config_path: Option<PathBuf>,

    #[clap(long, env = "RELAY_LOG_DIR", help = "Directory for log files.")]
    log_dir: Option<PathBuf>,

    #[clap(long, env = "RELAY_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error, off).")]
    log_level: Option<String>,

    #[clap(long, env = "RELAY_UPSTREAM_URL", help = "Base URL of the upstream live timing endpoint.")]
    upstream_url: Option<String>,

    #[clap(long, env = "RELAY_HUB", help = "Hub descriptor named during negotiation and subscription.")]
    hub: Option<String>,

    #[clap(long, env = "RELAY_TOPICS", value_delimiter = ',', help = "Comma-separated topic subscription list.")]
    topics: Option<Vec<String>>,

    #[clap(long, env = "RELAY_RETRY_DELAY_MS", help = "Fixed delay in milliseconds between upstream reconnect attempts.")]
    retry_delay_ms: Option<u64>,

    #[clap(long, env = "RELAY_BROADCAST_INTERVAL_MS", help = "Broadcast tick period in milliseconds.")]
    broadcast_interval_ms: Option<u64>,

    #[clap(long, env = "RELAY_DEBUG_MODE", help = "Disable the liveness reset and force the broadcast gate open.")]
    debug_mode: Option<bool>,

    #[clap(long, env = "TLS_CERT_PATH", help = "Path to the TLS certificate file.")]
    tls_cert_path: Option<PathBuf>,

    #[clap(long, env = "TLS_KEY_PATH", help = "Path to the TLS private key file.")]
    tls_key_path: Option<PathBuf>,
}

impl ConfigArgs {
    // Merge two ConfigArgs, where 'other' overrides 'self' for Some values
    fn merge(self, other: ConfigArgs) -> ConfigArgs {
        ConfigArgs {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            upstream_url: other.upstream_url.or(self.upstream_url),
            hub: other.hub.or(self.hub),
            topics: other.topics.or(self.topics),
            retry_delay_ms: other.retry_delay_ms.or(self.retry_delay_ms),
            broadcast_interval_ms: other.broadcast_interval_ms.or(self.broadcast_interval_ms),
            debug_mode: other.debug_mode.or(self.debug_mode),
            tls_cert_path: other.tls_cert_path.or(self.tls_cert_path),
            tls_key_path: other.tls_key_path.or(self.tls_key_path),
        }
    }
}

/// Fully-resolved settings handed to the components at construction.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub upstream_url: String,
    pub hub: String,
    pub topics: Vec<String>,
    pub retry_delay_ms: u64,
    pub broadcast_interval_ms: u64,
    pub debug_mode: bool,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
}

pub fn load_config() -> Config {
    // 1. CLI arguments and environment variables (clap handles both).
    //    Parsed first so --config-path can point at the file to layer under.
    let cli_args = ConfigArgs::parse();

    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("server_relay.conf"));

    // 2. Optional JSON config file.
    let mut merged = ConfigArgs::default();
    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match serde_json::from_str::<ConfigArgs>(&config_str) {
                Ok(file_config) => merged = merged.merge(file_config),
                Err(e) => eprintln!(
                    "Failed to parse config file {}: {}. Falling back to other sources.",
                    config_file_path.display(),
                    e
                ),
            },
            Err(e) => eprintln!(
                "Failed to read config file {}: {}. Falling back to other sources.",
                config_file_path.display(),
                e
            ),
        }
    }

    // 3. Environment/CLI values override the file.
    let merged = merged.merge(cli_args);

    // 4. TLS is only enabled when a usable certificate pair is present,
    //    either configured explicitly or found in the conventional
    //    letsencrypt location under the home directory.
    let (tls_cert_path, tls_key_path) = match (merged.tls_cert_path, merged.tls_key_path) {
        (Some(cert), Some(key)) => (Some(cert), Some(key)),
        _ => match dirs::home_dir().map(|home| home.join(".letsencrypt")) {
            Some(dir) if dir.join("fullchain.pem").exists() && dir.join("privkey.pem").exists() => {
                (Some(dir.join("fullchain.pem")), Some(dir.join("privkey.pem")))
            }
            _ => (None, None),
        },
    };

    Config {
        port: merged.port.unwrap_or(DEFAULT_PORT),
        log_dir: merged.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
        log_level: merged.log_level.unwrap_or_else(|| "info".to_string()),
        upstream_url: merged
            .upstream_url
            .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string()),
        hub: merged.hub.unwrap_or_else(|| DEFAULT_HUB.to_string()),
        topics: merged
            .topics
            .unwrap_or_else(|| DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect()),
        retry_delay_ms: merged.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
        broadcast_interval_ms: merged
            .broadcast_interval_ms
            .unwrap_or(DEFAULT_BROADCAST_INTERVAL_MS),
        debug_mode: merged.debug_mode.unwrap_or(false),
        tls_cert_path,
        tls_key_path,
    }
}
