//! Transport abstraction module
//!
//! The registry only needs one thing from the socket layer: an asynchronous
//! `send(identity, frame)`. `WebSocketTransport` provides it for browser-style
//! WebSocket clients by giving every socket a bounded outbound queue drained
//! by its own writer task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::future::{self, BoxFuture};
use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace, warn};

use crate::error::{NetworkError, RelayError, Result};
use crate::net::connection::ConnectionId;

/// Outbound half of the transport collaborator
pub trait Transport: Send + Sync {
    /// Write one frame to the connection.
    ///
    /// The registry awaits this while holding the target's send guard, so an
    /// implementation must not wait on the remote end draining its socket.
    fn send(&self, id: ConnectionId, frame: Bytes) -> BoxFuture<'_, Result<()>>;
}

/// Write side of one registered socket
struct Peer {
    /// Outbound queue drained by the writer task
    tx: mpsc::Sender<Message>,
    /// Writer task owning the socket's sink
    writer: JoinHandle<()>,
    /// Fired when the peer is dropped for not draining its queue
    stalled: Arc<Notify>,
}

/// WebSocket transport for browser and game clients
pub struct WebSocketTransport {
    /// Write side of every open socket
    peers: DashMap<ConnectionId, Peer>,
    /// Next connection id to assign
    next_id: AtomicU64,
    /// Capacity of each outbound queue
    queue_size: usize,
}

impl WebSocketTransport {
    /// Create a transport whose per-socket queues hold `queue_size` frames
    pub fn new(queue_size: usize) -> Self {
        Self {
            peers: DashMap::new(),
            next_id: AtomicU64::new(1),
            queue_size: queue_size.max(1),
        }
    }

    /// Take ownership of a socket's write half and assign it an identity.
    ///
    /// A writer task drains the socket's queue until it is unregistered or
    /// the socket errors.
    pub fn register<S>(&self, sink: S) -> ConnectionId
    where
        S: Sink<Message, Error = WsError> + Unpin + Send + 'static,
    {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, mut rx) = mpsc::channel::<Message>(self.queue_size);

        let writer = tokio::spawn(async move {
            let mut sink = sink;
            while let Some(message) = rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    debug!(connection_id = %id, error = %e, "WebSocket write failed");
                    break;
                }
            }
            if let Err(e) = sink.close().await {
                trace!(connection_id = %id, error = %e, "Error closing WebSocket sink");
            }
        });

        self.peers.insert(
            id,
            Peer {
                tx,
                writer,
                stalled: Arc::new(Notify::new()),
            },
        );
        id
    }

    /// Drop a socket's queue; its writer task flushes what is left and
    /// closes the sink
    pub fn unregister(&self, id: ConnectionId) {
        self.peers.remove(&id);
    }

    /// Signal fired if `id` is dropped for letting its queue fill up.
    ///
    /// The connection handler waits on it to end the read loop.
    pub fn stall_signal(&self, id: ConnectionId) -> Option<Arc<Notify>> {
        self.peers.get(&id).map(|peer| peer.stalled.clone())
    }

    /// Number of sockets with an open queue
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn try_enqueue(&self, id: ConnectionId, frame: Bytes) -> Result<()> {
        // tungstenite 0.21 messages own their payload, so every target gets
        // its own copy of the shared frame here
        let outcome = match self.peers.get(&id) {
            Some(peer) => peer.tx.try_send(Message::Binary(frame.to_vec())),
            None => return Err(NetworkError::UnknownConnection(id).into()),
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.drop_stalled(id);
                Err(RelayError::Network(NetworkError::WriteBufferFull))
            }
            Err(TrySendError::Closed(_)) => {
                Err(RelayError::Network(NetworkError::ConnectionClosed))
            }
        }
    }

    /// Forget a peer that stopped draining its queue. The writer task is
    /// aborted since it is parked on a socket that will not accept more.
    fn drop_stalled(&self, id: ConnectionId) {
        if let Some((_, peer)) = self.peers.remove(&id) {
            warn!(
                connection_id = %id,
                queue_size = self.queue_size,
                "Outbound queue full, dropping connection"
            );
            peer.writer.abort();
            peer.stalled.notify_one();
        }
    }
}

impl Transport for WebSocketTransport {
    fn send(&self, id: ConnectionId, frame: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(future::ready(self.try_enqueue(id, frame)))
    }
}
