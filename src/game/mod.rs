//! Game logic module
//!
//! The registry hands every decoded packet to a `GameLogic`, which updates
//! game state and answers with a list of `Dispatch` instructions that the
//! registry carries out. The default implementation is `StageRelayLogic`.

pub mod event;
pub mod relay;

use crate::error::Result;
use crate::net::connection::ConnectionState;
use crate::protocol::Packet;

pub use event::XmasEventState;
pub use relay::StageRelayLogic;

/// Outbound action requested by the game logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Send to the connection the packet came from
    Reply(Packet),
    /// Send to every other connection on the sender's stage
    BroadcastToPeers(Packet),
    /// Send to every connection
    BroadcastAll(Packet),
}

/// Packet interpretation and state shared across connections
pub trait GameLogic: Send + Sync {
    /// Handle one packet received on `connection`.
    ///
    /// Called by the task reading that connection, one packet at a time.
    fn handle_packet(&self, connection: &ConnectionState, packet: Packet) -> Result<Vec<Dispatch>>;

    /// Release anything tied to a connection that has disconnected
    fn untrack_connection(&self, connection: &ConnectionState);
}
