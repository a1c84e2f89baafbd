//! Server configuration module
//!
//! Handles loading and parsing of server configuration from files and environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Server name shown in logs
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Address the WebSocket listener binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// WebSocket port for game clients
    #[serde(default = "default_websocket_port")]
    pub websocket_port: u16,

    /// Largest inbound frame that will be decoded
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Frames buffered per connection before senders wait
    #[serde(default = "default_outbound_queue_size")]
    pub outbound_queue_size: usize,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,

    /// Seasonal event configuration
    #[serde(default)]
    pub event: EventConfig,
}

/// Seasonal event configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventConfig {
    /// Player names allowed to modify the event state
    #[serde(default)]
    pub admin_players: Vec<String>,

    /// Phases the event starts with
    #[serde(default)]
    pub phases: Vec<PhaseConfig>,
}

/// Initial settings of one event phase
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseConfig {
    /// Gifts needed to complete the phase
    pub gifts_goal: u32,

    /// Activate this phase when the previous one completes
    #[serde(default)]
    pub activate_automatically: bool,
}

// Default value functions
fn default_server_name() -> String {
    "Stagerelay".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_websocket_port() -> u16 {
    42069
}

fn default_max_message_size() -> usize {
    65536
}

fn default_outbound_queue_size() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/server.toml"),
            server_name: default_server_name(),
            bind_address: default_bind_address(),
            websocket_port: default_websocket_port(),
            max_message_size: default_max_message_size(),
            outbound_queue_size: default_outbound_queue_size(),
            debug: false,
            event: EventConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        // Determine config path from environment or use default
        let config_path = env::var("STAGERELAY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/server.toml"));

        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            Self::from_toml(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path;

        // Override with environment variables
        config.apply_env_overrides();

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("STAGERELAY_SERVER_NAME") {
            self.server_name = val;
        }
        if let Ok(val) = env::var("STAGERELAY_BIND_ADDRESS") {
            self.bind_address = val;
        }
        if let Ok(val) = env::var("STAGERELAY_WEBSOCKET_PORT") {
            if let Ok(port) = val.parse() {
                self.websocket_port = port;
            }
        }
        if let Ok(val) = env::var("STAGERELAY_MAX_MESSAGE_SIZE") {
            if let Ok(size) = val.parse() {
                self.max_message_size = size;
            }
        }
        if let Ok(val) = env::var("STAGERELAY_OUTBOUND_QUEUE_SIZE") {
            if let Ok(size) = val.parse() {
                self.outbound_queue_size = size;
            }
        }
        if let Ok(val) = env::var("STAGERELAY_DEBUG") {
            self.debug = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = env::var("STAGERELAY_EVENT_ADMINS") {
            self.event.admin_players = parse_name_list(&val);
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.websocket_port == 0 {
            anyhow::bail!("WebSocket port must be non-zero");
        }

        if self.max_message_size < 64 {
            anyhow::bail!("Max message size must be at least 64 bytes");
        }

        if self.outbound_queue_size == 0 {
            anyhow::bail!("Outbound queue size must be at least 1");
        }

        Ok(())
    }

    /// Address string for the WebSocket listener
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.websocket_port)
    }
}

fn parse_name_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
