//! Connection handler module
//!
//! Handles the lifecycle of one client socket:
//! - WebSocket upgrade
//! - Registration with the transport and the connection registry
//! - Feeding every binary frame to the registry
//! - Cleanup on close, error, a stalled outbound queue or server shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Notify};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, trace};

use crate::error::{NetworkError, RelayError, Result};
use crate::net::connection::ConnectionId;
use crate::AppState;

/// Connection handler for processing client connections
pub struct ConnectionHandler {
    /// Shared application state
    state: Arc<AppState>,
}

impl ConnectionHandler {
    /// Create a new connection handler
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Handle a WebSocket connection until it closes
    pub async fn handle_websocket(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(address = %addr, "Handling WebSocket connection");

        stream.set_nodelay(true)?;

        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| RelayError::Network(NetworkError::WebSocket(e.to_string())))?;

        let (sink, mut source) = ws_stream.split();
        let id = self.state.transport.register(sink);
        let Some(stalled) = self.state.transport.stall_signal(id) else {
            return Err(RelayError::Network(NetworkError::ConnectionClosed));
        };
        let mut shutdown_rx = self.state.shutdown_tx.subscribe();

        if let Err(e) = self.state.registry.on_connect(id) {
            self.state.transport.unregister(id);
            return Err(e);
        }
        info!(connection_id = %id, address = %addr, "WebSocket connection established");

        let result = self
            .read_frames(id, &mut source, &stalled, &mut shutdown_rx)
            .await;

        self.state.registry.on_disconnect(id);
        self.state.transport.unregister(id);
        debug!(connection_id = %id, "Connection handler ending");

        result
    }

    /// Feed frames to the registry, one at a time, until the socket closes,
    /// the transport drops it for not reading, or the server shuts down
    async fn read_frames<S>(
        &self,
        id: ConnectionId,
        source: &mut S,
        stalled: &Notify,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<()>
    where
        S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
    {
        loop {
            let message = tokio::select! {
                message = source.next() => message,
                _ = stalled.notified() => {
                    debug!(connection_id = %id, "Closing connection that stopped reading");
                    return Ok(());
                }
                _ = shutdown_rx.recv() => {
                    debug!(connection_id = %id, "Closing connection for shutdown");
                    return Ok(());
                }
            };

            match message {
                None => break,
                Some(Ok(Message::Binary(data))) => {
                    if self.state.config.debug {
                        debug!(connection_id = %id, len = data.len(), "Binary frame received");
                    }
                    self.state.registry.on_message(id, &data).await;
                }
                Some(Ok(Message::Close(_))) => {
                    debug!(connection_id = %id, "WebSocket close message received");
                    break;
                }
                Some(Ok(Message::Text(_))) => {
                    trace!(connection_id = %id, "Ignoring text WebSocket message");
                }
                // Pings are answered by tungstenite on the next write
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => break,
                Some(Err(e)) => {
                    return Err(RelayError::Network(NetworkError::WebSocket(e.to_string())));
                }
            }
        }
        Ok(())
    }
}
