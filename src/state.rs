//! Application state module
//!
//! Contains the shared state used across all server connections.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::config::ServerConfig;
use crate::game::StageRelayLogic;
use crate::metrics::ConnectionGauge;
use crate::net::registry::ConnectionRegistry;
use crate::net::transport::WebSocketTransport;

/// Application state shared across all connections
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Live connections and fan-out
    pub registry: Arc<ConnectionRegistry>,
    /// WebSocket write side
    pub transport: Arc<WebSocketTransport>,
    /// Stage relay and event logic
    pub logic: Arc<StageRelayLogic>,
    /// Connection count gauge
    pub metrics: Arc<ConnectionGauge>,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Wire the registry to its collaborators
    pub fn new(config: ServerConfig, shutdown_tx: broadcast::Sender<()>) -> Self {
        let transport = Arc::new(WebSocketTransport::new(config.outbound_queue_size));
        let logic = Arc::new(StageRelayLogic::new(&config.event));
        let metrics = Arc::new(ConnectionGauge::new());

        let registry = Arc::new(
            ConnectionRegistry::new(transport.clone(), metrics.clone(), logic.clone())
                .with_max_message_size(config.max_message_size),
        );

        info!(
            phases = config.event.phases.len(),
            admins = config.event.admin_players.len(),
            "Event configured"
        );

        Self {
            config,
            registry,
            transport,
            logic,
            metrics,
            shutdown_tx,
        }
    }
}
