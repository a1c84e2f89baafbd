//! Connection registry and broadcast engine
//!
//! Owns the set of live connections and drives their lifecycle:
//! - connect: register a fresh `ConnectionState`, report the new count
//! - message: decode the frame and hand it to the game logic
//! - disconnect: drop the state, tell the game logic, report the new count
//!
//! Locking is two-tier. One mutex guards membership of the map and is only
//! held to insert, remove or snapshot entries, never across a network write.
//! Every connection has its own send guard, so a slow socket only delays
//! writes to itself. Fan-out encodes a packet once and writes the shared
//! frame to every target concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::error::{NetworkError, RelayError, Result};
use crate::game::{Dispatch, GameLogic};
use crate::metrics::ConnectionMetrics;
use crate::net::buffer::MAX_PACKET_SIZE;
use crate::net::connection::{ConnectionId, ConnectionState};
use crate::net::transport::Transport;
use crate::protocol::Packet;

/// Registry of live connections
pub struct ConnectionRegistry {
    /// Connection identity -> session state
    connections: Mutex<HashMap<ConnectionId, Arc<ConnectionState>>>,
    /// Outbound write primitive
    transport: Arc<dyn Transport>,
    /// Connection count sink
    metrics: Arc<dyn ConnectionMetrics>,
    /// Packet interpretation and cross-connection state
    logic: Arc<dyn GameLogic>,
    /// Largest inbound frame accepted for decoding
    max_message_size: usize,
}

impl ConnectionRegistry {
    /// Create an empty registry wired to its collaborators
    pub fn new(
        transport: Arc<dyn Transport>,
        metrics: Arc<dyn ConnectionMetrics>,
        logic: Arc<dyn GameLogic>,
    ) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            transport,
            metrics,
            logic,
            max_message_size: MAX_PACKET_SIZE,
        }
    }

    /// Set the largest inbound frame accepted for decoding
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    // ============ Lifecycle ============

    /// Register a newly connected socket
    pub fn on_connect(&self, id: ConnectionId) -> Result<Arc<ConnectionState>> {
        let state = Arc::new(ConnectionState::new(id));

        let mut connections = self.connections.lock();
        if connections.contains_key(&id) {
            return Err(RelayError::Network(NetworkError::DuplicateConnection(id)));
        }
        connections.insert(id, state.clone());
        self.metrics.update_connections(connections.len());
        drop(connections);

        info!(connection_id = %id, "Connection registered");
        Ok(state)
    }

    /// Forget a socket that went away. Unknown ids are ignored.
    pub fn on_disconnect(&self, id: ConnectionId) {
        let removed = {
            let mut connections = self.connections.lock();
            let removed = connections.remove(&id);
            if removed.is_some() {
                self.metrics.update_connections(connections.len());
            }
            removed
        };

        let Some(state) = removed else {
            warn!(connection_id = %id, "Disconnect for unregistered connection");
            return;
        };

        state.mark_closed();
        self.logic.untrack_connection(&state);

        info!(
            connection_id = %id,
            player = ?state.player_name(),
            uptime = ?state.uptime(),
            "Connection removed"
        );
    }

    /// Handle one inbound frame.
    ///
    /// Frames for unknown connections are dropped. Decode and handler errors
    /// are logged and discarded; they never close the connection.
    pub async fn on_message(&self, id: ConnectionId, frame: &[u8]) {
        let Some(state) = self.get(id) else {
            trace!(connection_id = %id, "Dropping message for unregistered connection");
            return;
        };

        if let Err(e) = self.handle_message(&state, frame).await {
            warn!(
                connection_id = %id,
                len = frame.len(),
                error = %e,
                "Error while handling message"
            );
        }
    }

    async fn handle_message(&self, state: &Arc<ConnectionState>, frame: &[u8]) -> Result<()> {
        let packet = Packet::decode_limited(frame, self.max_message_size)?;
        trace!(connection_id = %state.id, packet = packet.id(), "Received packet");

        let dispatches = self.logic.handle_packet(state, packet)?;
        for dispatch in dispatches {
            self.dispatch(state, dispatch).await;
        }
        Ok(())
    }

    async fn dispatch(&self, origin: &ConnectionState, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Reply(packet) => {
                self.send_to(origin.id, &packet).await;
            }
            Dispatch::BroadcastToPeers(packet) => {
                self.broadcast_to_peers(origin.id, &packet).await;
            }
            Dispatch::BroadcastAll(packet) => {
                self.broadcast_all(&packet).await;
            }
        }
    }

    // ============ Lookup ============

    /// Get the state registered for a connection
    pub fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionState>> {
        self.connections.lock().get(&id).cloned()
    }

    /// Number of registered connections
    pub fn count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Ids of all registered connections
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.lock().keys().copied().collect()
    }

    // ============ Sending ============

    /// Encode and send a packet to one connection
    pub async fn send_to(&self, id: ConnectionId, packet: &Packet) -> bool {
        self.send_bytes_to(id, packet.encode()).await
    }

    /// Send an already encoded frame to one connection.
    ///
    /// Registered connections are written under their send guard. A frame for
    /// an unregistered id is still handed to the transport, best effort.
    pub async fn send_bytes_to(&self, id: ConnectionId, frame: Bytes) -> bool {
        match self.get(id) {
            Some(state) => self.write_serialized(&state, frame).await,
            None => match self.transport.send(id, frame).await {
                Ok(()) => true,
                Err(e) => {
                    debug!(connection_id = %id, error = %e, "Unguarded send failed");
                    false
                }
            },
        }
    }

    /// Send a packet to every other connection on the origin's stage.
    ///
    /// Nothing is sent if the origin is unknown or has no stage.
    /// Returns the number of connections the frame was written to.
    pub async fn broadcast_to_peers(&self, origin: ConnectionId, packet: &Packet) -> usize {
        let Some(origin_state) = self.get(origin) else {
            debug!(connection_id = %origin, "Broadcast from unregistered connection");
            return 0;
        };
        if origin_state.stage().is_none() {
            debug!(connection_id = %origin, "Broadcast from connection without a stage");
            return 0;
        }

        self.broadcast_where(Some(origin), packet, |target| {
            target.shares_stage_with(&origin_state)
        })
        .await
    }

    /// Send a packet to every registered connection
    pub async fn broadcast_all(&self, packet: &Packet) -> usize {
        self.broadcast_where(None, packet, |_| true).await
    }

    /// Send a packet to every connection except `origin` that passes `filter`.
    ///
    /// Targets are snapshotted under the registry lock; the frame is encoded
    /// once and each target is written under its own send guard. Targets that
    /// disconnect mid-broadcast are skipped.
    pub async fn broadcast_where<F>(
        &self,
        origin: Option<ConnectionId>,
        packet: &Packet,
        filter: F,
    ) -> usize
    where
        F: Fn(&ConnectionState) -> bool,
    {
        let targets: Vec<Arc<ConnectionState>> = {
            let connections = self.connections.lock();
            connections
                .values()
                .filter(|state| Some(state.id) != origin && filter(state))
                .cloned()
                .collect()
        };

        if targets.is_empty() {
            return 0;
        }

        let frame = packet.encode();
        let sends = targets
            .iter()
            .map(|target| self.write_serialized(target, frame.clone()));
        let delivered = join_all(sends).await.into_iter().filter(|ok| *ok).count();

        trace!(
            packet = packet.id(),
            targets = targets.len(),
            delivered = delivered,
            "Broadcast complete"
        );
        delivered
    }

    async fn write_serialized(&self, target: &ConnectionState, frame: Bytes) -> bool {
        if target.is_closed() {
            debug!(connection_id = %target.id, "Skipping send to closed connection");
            return false;
        }

        let _guard = target.lock_send().await;
        if target.is_closed() {
            return false;
        }
        match self.transport.send(target.id, frame).await {
            Ok(()) => true,
            Err(e) => {
                debug!(connection_id = %target.id, error = %e, "Send failed, skipping target");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ConnectionGauge;
    use crate::net::connection::{Player, Stage};
    use crate::protocol::stage::ClientLeaveStagePacket;
    use futures_util::future::BoxFuture;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(ConnectionId, Bytes)>>,
    }

    impl Transport for RecordingTransport {
        fn send(&self, id: ConnectionId, frame: Bytes) -> BoxFuture<'_, Result<()>> {
            self.sent.lock().push((id, frame));
            Box::pin(async { Ok(()) })
        }
    }

    #[derive(Default)]
    struct EchoLogic {
        untracked: Mutex<Vec<ConnectionId>>,
    }

    impl GameLogic for EchoLogic {
        fn handle_packet(
            &self,
            _connection: &ConnectionState,
            packet: Packet,
        ) -> Result<Vec<Dispatch>> {
            Ok(vec![Dispatch::Reply(packet)])
        }

        fn untrack_connection(&self, connection: &ConnectionState) {
            self.untracked.lock().push(connection.id);
        }
    }

    fn registry() -> (
        ConnectionRegistry,
        Arc<RecordingTransport>,
        Arc<ConnectionGauge>,
        Arc<EchoLogic>,
    ) {
        let transport = Arc::new(RecordingTransport::default());
        let gauge = Arc::new(ConnectionGauge::new());
        let logic = Arc::new(EchoLogic::default());
        let registry = ConnectionRegistry::new(transport.clone(), gauge.clone(), logic.clone());
        (registry, transport, gauge, logic)
    }

    #[test]
    fn test_connect_and_disconnect_update_count() {
        let (registry, _, gauge, logic) = registry();

        registry.on_connect(ConnectionId(1)).unwrap();
        registry.on_connect(ConnectionId(2)).unwrap();
        assert_eq!(registry.count(), 2);
        assert_eq!(gauge.current(), 2);

        registry.on_disconnect(ConnectionId(1));
        assert_eq!(registry.count(), 1);
        assert_eq!(gauge.current(), 1);
        assert_eq!(*logic.untracked.lock(), vec![ConnectionId(1)]);
        assert!(registry.get(ConnectionId(1)).is_none());
    }

    #[test]
    fn test_duplicate_connect_rejected() {
        let (registry, _, gauge, _) = registry();
        registry.on_connect(ConnectionId(1)).unwrap();

        let err = registry.on_connect(ConnectionId(1)).unwrap_err();
        assert!(matches!(
            err,
            RelayError::Network(NetworkError::DuplicateConnection(ConnectionId(1)))
        ));
        assert_eq!(gauge.current(), 1);
    }

    #[test]
    fn test_disconnect_marks_state_closed() {
        let (registry, _, _, logic) = registry();
        let state = registry.on_connect(ConnectionId(5)).unwrap();

        registry.on_disconnect(ConnectionId(5));
        assert!(state.is_closed());

        // Second disconnect is a no-op
        registry.on_disconnect(ConnectionId(5));
        assert_eq!(logic.untracked.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_message_reply() {
        let (registry, transport, _, _) = registry();
        registry.on_connect(ConnectionId(1)).unwrap();

        let frame = Packet::ClientLeaveStage(ClientLeaveStagePacket).encode();
        registry.on_message(ConnectionId(1), &frame).await;

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ConnectionId(1));
        assert_eq!(sent[0].1, frame);
    }

    #[tokio::test]
    async fn test_message_for_unknown_connection_dropped() {
        let (registry, transport, _, _) = registry();
        let frame = Packet::ClientLeaveStage(ClientLeaveStagePacket).encode();
        registry.on_message(ConnectionId(77), &frame).await;
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_message_is_contained() {
        let (registry, transport, _, _) = registry();
        let state = registry.on_connect(ConnectionId(1)).unwrap();

        registry.on_message(ConnectionId(1), &[0x05, b'J', b'u', b'n']).await;
        registry.on_message(ConnectionId(1), &[]).await;

        assert!(transport.sent.lock().is_empty());
        assert!(!state.is_closed());
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let (registry, transport, _, _) = registry();
        let registry = registry.with_max_message_size(8);
        registry.on_connect(ConnectionId(1)).unwrap();

        let frame = Packet::ClientLeaveStage(ClientLeaveStagePacket).encode();
        assert!(frame.len() > 8);
        registry.on_message(ConnectionId(1), &frame).await;
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_send_to_unregistered_is_best_effort() {
        let (registry, transport, _, _) = registry();
        let frame = Bytes::from_static(b"raw");
        assert!(registry.send_bytes_to(ConnectionId(3), frame.clone()).await);
        assert_eq!(*transport.sent.lock(), vec![(ConnectionId(3), frame)]);
    }

    #[tokio::test]
    async fn test_broadcast_to_peers_same_stage_only() {
        let (registry, transport, _, _) = registry();
        let a = registry.on_connect(ConnectionId(1)).unwrap();
        let b = registry.on_connect(ConnectionId(2)).unwrap();
        let c = registry.on_connect(ConnectionId(3)).unwrap();
        registry.on_connect(ConnectionId(4)).unwrap(); // no player

        a.set_player(Player::new("a", Stage(1)));
        b.set_player(Player::new("b", Stage(1)));
        c.set_player(Player::new("c", Stage(2)));

        let packet = Packet::ClientLeaveStage(ClientLeaveStagePacket);
        let delivered = registry.broadcast_to_peers(ConnectionId(1), &packet).await;

        assert_eq!(delivered, 1);
        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ConnectionId(2));
    }

    #[tokio::test]
    async fn test_broadcast_from_stageless_origin_reaches_nobody() {
        let (registry, transport, _, _) = registry();
        registry.on_connect(ConnectionId(1)).unwrap();
        let b = registry.on_connect(ConnectionId(2)).unwrap();
        b.set_player(Player::new("b", Stage(1)));

        let packet = Packet::ClientLeaveStage(ClientLeaveStagePacket);
        assert_eq!(registry.broadcast_to_peers(ConnectionId(1), &packet).await, 0);
        assert_eq!(registry.broadcast_to_peers(ConnectionId(99), &packet).await, 0);
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_all_includes_everyone() {
        let (registry, transport, _, _) = registry();
        for i in 1..=3 {
            registry.on_connect(ConnectionId(i)).unwrap();
        }

        let packet = Packet::ClientLeaveStage(ClientLeaveStagePacket);
        assert_eq!(registry.broadcast_all(&packet).await, 3);

        let sent = transport.sent.lock();
        assert!(sent.iter().all(|(_, frame)| *frame == sent[0].1));
    }

    #[tokio::test]
    async fn test_broadcast_skips_closed_targets() {
        let (registry, transport, _, _) = registry();
        let a = registry.on_connect(ConnectionId(1)).unwrap();
        let b = registry.on_connect(ConnectionId(2)).unwrap();
        a.set_player(Player::new("a", Stage(1)));
        b.set_player(Player::new("b", Stage(1)));

        // Simulates a disconnect landing between snapshot and write
        b.mark_closed();

        let packet = Packet::ClientLeaveStage(ClientLeaveStagePacket);
        assert_eq!(registry.broadcast_to_peers(ConnectionId(1), &packet).await, 0);
        assert!(transport.sent.lock().is_empty());
    }
}
