//! Stagerelay Server Library
//!
//! This library provides the core functionality for the Stagerelay server,
//! a real-time relay that fans game-state updates out to the players sharing
//! a stage.
//!
//! ## Modules
//!
//! - `config` - Server configuration management
//! - `error` - Error types and result definitions
//! - `game` - Packet handling and seasonal event state
//! - `metrics` - Connection count reporting
//! - `net` - Connection registry, broadcast and WebSocket transport
//! - `protocol` - Versioned binary packet protocol

pub mod config;
pub mod error;
pub mod game;
pub mod metrics;
pub mod net;
pub mod protocol;
pub mod state;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{RelayError, Result};
pub use state::AppState;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
