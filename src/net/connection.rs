//! Per-connection session state
//!
//! A `ConnectionState` lives exactly as long as its registry entry:
//! - Identity of the transport connection it belongs to (never the socket itself)
//! - The player announced on this connection, including their current stage
//! - A private send guard so writes to one socket never interleave
//! - A closed flag so in-flight fan-out can skip connections that went away

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Opaque identity of a transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A game stage (level/room). Broadcast scope is partitioned by stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Stage(pub i32);

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {}", self.0)
    }
}

/// Player announced on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    pub character: i32,
    /// `None` while the player is between stages
    pub stage: Option<Stage>,
}

impl Player {
    pub fn new(name: impl Into<String>, stage: Stage) -> Self {
        Self {
            name: name.into(),
            character: 0,
            stage: Some(stage),
        }
    }
}

/// Session record for one live connection
pub struct ConnectionState {
    /// Identity of the owning transport connection
    pub id: ConnectionId,
    /// Player on this connection (set by the game logic)
    player: RwLock<Option<Player>>,
    /// Serializes writes to this connection's socket
    send_lock: Mutex<()>,
    /// Set once the connection has left the registry
    closed: AtomicBool,
    /// Time the connection was registered
    pub connected_at: Instant,
}

impl ConnectionState {
    /// Create the state for a freshly connected socket
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            player: RwLock::new(None),
            send_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            connected_at: Instant::now(),
        }
    }

    /// Get a copy of the player, if one has been announced
    pub fn player(&self) -> Option<Player> {
        self.player.read().clone()
    }

    /// Check whether a player has been announced
    pub fn has_player(&self) -> bool {
        self.player.read().is_some()
    }

    /// Name of the player, if any
    pub fn player_name(&self) -> Option<String> {
        self.player.read().as_ref().map(|p| p.name.clone())
    }

    /// Set (or replace) the player on this connection
    pub fn set_player(&self, player: Player) {
        let old_stage = {
            let mut slot = self.player.write();
            let old = slot.as_ref().and_then(|p| p.stage);
            *slot = Some(player);
            old
        };
        debug!(
            connection_id = %self.id,
            old_stage = ?old_stage,
            new_stage = ?self.stage(),
            "Player set"
        );
    }

    /// Move the player to another stage (or off any stage).
    /// Returns false if no player has been announced.
    pub fn set_stage(&self, stage: Option<Stage>) -> bool {
        match self.player.write().as_mut() {
            Some(player) => {
                player.stage = stage;
                true
            }
            None => false,
        }
    }

    /// Current stage; `None` without a player or between stages
    pub fn stage(&self) -> Option<Stage> {
        self.player.read().as_ref().and_then(|p| p.stage)
    }

    /// True only if both connections have a player on the same stage
    pub fn shares_stage_with(&self, other: &ConnectionState) -> bool {
        match (self.stage(), other.stage()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Acquire this connection's send guard.
    /// Waiters are served in FIFO order.
    pub async fn lock_send(&self) -> MutexGuard<'_, ()> {
        self.send_lock.lock().await
    }

    /// Check whether the connection has left the registry
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the connection as gone
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Time since the connection was registered
    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionState")
            .field("id", &self.id)
            .field("player", &self.player())
            .field("closed", &self.is_closed())
            .field("uptime", &self.uptime())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_creation() {
        let state = ConnectionState::new(ConnectionId(1));
        assert_eq!(state.id, ConnectionId(1));
        assert!(!state.has_player());
        assert_eq!(state.stage(), None);
        assert!(!state.is_closed());
    }

    #[test]
    fn test_set_player_and_stage() {
        let state = ConnectionState::new(ConnectionId(1));
        assert!(!state.set_stage(Some(Stage(4))));

        state.set_player(Player::new("Vinyl", Stage(2)));
        assert_eq!(state.stage(), Some(Stage(2)));
        assert_eq!(state.player_name().as_deref(), Some("Vinyl"));

        assert!(state.set_stage(Some(Stage(4))));
        assert_eq!(state.stage(), Some(Stage(4)));

        assert!(state.set_stage(None));
        assert_eq!(state.stage(), None);
        assert!(state.has_player());
    }

    #[test]
    fn test_shares_stage_with() {
        let a = ConnectionState::new(ConnectionId(1));
        let b = ConnectionState::new(ConnectionId(2));

        // Neither side has a player
        assert!(!a.shares_stage_with(&b));

        a.set_player(Player::new("a", Stage(1)));
        assert!(!a.shares_stage_with(&b));
        assert!(!b.shares_stage_with(&a));

        b.set_player(Player::new("b", Stage(1)));
        assert!(a.shares_stage_with(&b));

        b.set_stage(Some(Stage(2)));
        assert!(!a.shares_stage_with(&b));

        // Both between stages does not count as the same stage
        a.set_stage(None);
        b.set_stage(None);
        assert!(!a.shares_stage_with(&b));
    }

    #[test]
    fn test_mark_closed() {
        let state = ConnectionState::new(ConnectionId(9));
        state.mark_closed();
        assert!(state.is_closed());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionId(7).to_string(), "#7");
        assert_eq!(Stage(3).to_string(), "stage 3");
    }

    #[test]
    fn test_send_lock_waiters_are_fifo() {
        use tokio_test::{assert_pending, assert_ready, task};

        let state = ConnectionState::new(ConnectionId(1));
        let guard = tokio_test::block_on(state.lock_send());

        let mut first = task::spawn(state.lock_send());
        let mut second = task::spawn(state.lock_send());
        assert_pending!(first.poll());
        assert_pending!(second.poll());

        drop(guard);
        assert!(first.is_woken());
        let first_guard = assert_ready!(first.poll());
        assert_pending!(second.poll());

        drop(first_guard);
        assert_ready!(second.poll());
    }

    #[tokio::test]
    async fn test_send_lock_is_exclusive() {
        let state = ConnectionState::new(ConnectionId(1));
        let guard = state.lock_send().await;
        assert!(state.send_lock.try_lock().is_err());
        drop(guard);
        assert!(state.send_lock.try_lock().is_ok());
    }
}
