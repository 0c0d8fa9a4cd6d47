use clap::Parser;
use figment::{
    providers::{Data, Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::state::SessionSettings;

const DEFAULT_CONFIG_PATH: &str = "./relay.toml";

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub json_logs: bool,
    pub generate_config: bool,
    /// Data directory for the SQLite database and generated signing key
    pub data_dir: String,
    /// Shared HS256 secret used by the account service to sign access tokens.
    /// When unset, a random key is generated in the data directory.
    pub jwt_secret: Option<String>,
    pub persist_timeout_ms: u64,
    pub ping_interval_secs: u64,
    pub pong_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            jwt_secret: None,
            persist_timeout_ms: 5000,
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
        }
    }
}

/// Real-time chat and notification relay
///
/// Flags carry no defaults: only values actually given on the command line
/// are serialized, so unset flags never mask the TOML file or environment.
#[derive(Parser, Serialize, Clone, Debug)]
#[command(name = "relay-server", version, about = "Real-time chat and notification relay")]
pub struct CliArgs {
    /// Port to listen on [default: 8000]
    #[arg(long, env = "RELAY_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long, env = "RELAY_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file [default: ./relay.toml]
    #[arg(long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "is_false")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "is_false")]
    pub generate_config: bool,

    /// Data directory for the SQLite database and generated signing key [default: ./data]
    #[arg(long, env = "RELAY_DATA_DIR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Shared HS256 secret used to verify access tokens
    #[arg(long, env = "RELAY_JWT_SECRET")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    /// Milliseconds before a message write counts as failed [default: 5000]
    #[arg(long, env = "RELAY_PERSIST_TIMEOUT_MS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_timeout_ms: Option<u64>,

    /// Seconds between server pings [default: 30]
    #[arg(long, env = "RELAY_PING_INTERVAL_SECS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_interval_secs: Option<u64>,

    /// Seconds to wait for a pong before closing [default: 10]
    #[arg(long, env = "RELAY_PONG_TIMEOUT_SECS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pong_timeout_secs: Option<u64>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (RELAY_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = CliArgs::parse();
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        Self::layered(Toml::file(config_path), cli).extract()
    }

    fn layered(file: Data<Toml>, cli: CliArgs) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(file)
            .merge(Env::prefixed("RELAY_"))
            .merge(Serialized::defaults(cli))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            persist_timeout: Duration::from_millis(self.persist_timeout_ms),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            pong_timeout: Duration::from_secs(self.pong_timeout_secs),
        }
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Relay Server Configuration
# Place this file at ./relay.toml or specify with --config <path>
# All settings can be overridden via environment variables (RELAY_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8000)
# port = 8000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database and generated JWT key
# data_dir = "./data"

# Shared HS256 secret; must match the service that issues access tokens.
# Leave unset to generate one in data_dir.
# jwt_secret = ""

# Message write timeout in milliseconds
# persist_timeout_ms = 5000

# Keepalive
# ping_interval_secs = 30
# pong_timeout_secs = 10
"#
    .to_string()
}
