//! Default game logic: stage membership, stage relay and the seasonal event
//!
//! - `Client-JoinStage` announces the player; they get the event status back
//! - `Client-LeaveStage` takes the player off their stage
//! - `Client-StageMessage` is relayed to peers on the same stage
//! - `Xmas-Client-CollectGift` advances the event and updates everyone
//! - `Xmas-Client-ModifyEventState` rewrites phases (admins only)

use std::collections::HashSet;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::EventConfig;
use crate::error::{GameError, Result};
use crate::game::event::XmasEventState;
use crate::game::{Dispatch, GameLogic};
use crate::net::connection::{ConnectionId, ConnectionState, Player, Stage};
use crate::protocol::stage::{ClientJoinStagePacket, ServerStageMessagePacket};
use crate::protocol::xmas::XmasClientModifyEventStatePacket;
use crate::protocol::Packet;

/// Stage relay plus seasonal event handling
pub struct StageRelayLogic {
    /// Players currently online, by connection
    roster: DashMap<ConnectionId, Player>,
    /// Seasonal event state shared by all connections
    event: Mutex<XmasEventState>,
    /// Lowercased names allowed to modify the event
    admins: HashSet<String>,
}

impl StageRelayLogic {
    pub fn new(config: &EventConfig) -> Self {
        Self {
            roster: DashMap::new(),
            event: Mutex::new(XmasEventState::from_config(&config.phases)),
            admins: config
                .admin_players
                .iter()
                .map(|name| name.to_lowercase())
                .collect(),
        }
    }

    /// Number of connections that announced a player
    pub fn player_count(&self) -> usize {
        self.roster.len()
    }

    /// Number of players currently on `stage`
    pub fn players_on_stage(&self, stage: Stage) -> usize {
        self.roster
            .iter()
            .filter(|entry| entry.stage == Some(stage))
            .count()
    }

    /// Copy of the current event state
    pub fn event_state(&self) -> XmasEventState {
        self.event.lock().clone()
    }

    fn is_admin(&self, name: &str) -> bool {
        self.admins.contains(&name.to_lowercase())
    }

    fn event_status(&self) -> Packet {
        self.event.lock().status_packet().into()
    }

    fn join_stage(
        &self,
        connection: &ConnectionState,
        packet: ClientJoinStagePacket,
    ) -> Vec<Dispatch> {
        let player = Player {
            name: packet.player_name,
            character: packet.character,
            stage: Some(Stage(packet.stage)),
        };
        info!(
            connection_id = %connection.id,
            player = %player.name,
            stage = packet.stage,
            "Player joined stage"
        );

        connection.set_player(player.clone());
        self.roster.insert(connection.id, player);

        vec![Dispatch::Reply(self.event_status())]
    }

    fn leave_stage(&self, connection: &ConnectionState) -> Result<Vec<Dispatch>> {
        if !connection.set_stage(None) {
            return Err(GameError::NotInStage.into());
        }
        if let Some(mut player) = self.roster.get_mut(&connection.id) {
            player.stage = None;
        }
        debug!(connection_id = %connection.id, "Player left stage");
        Ok(Vec::new())
    }

    fn modify_event(
        &self,
        connection: &ConnectionState,
        packet: XmasClientModifyEventStatePacket,
    ) -> Result<Vec<Dispatch>> {
        let name = connection.player_name().ok_or(GameError::NotInStage)?;
        if !self.is_admin(&name) {
            warn!(
                connection_id = %connection.id,
                player = %name,
                "Rejected event modification from non-admin"
            );
            return Err(GameError::NotPermitted(format!("{} is not an event admin", name)).into());
        }

        let status = {
            let mut event = self.event.lock();
            event.apply(&packet.phase_modifications);
            event.status_packet()
        };
        info!(
            player = %name,
            modifications = packet.phase_modifications.len(),
            "Event state modified"
        );
        Ok(vec![Dispatch::BroadcastAll(status.into())])
    }

    fn collect_gift(&self, connection: &ConnectionState) -> Result<Vec<Dispatch>> {
        if !connection.has_player() {
            return Err(GameError::NotInStage.into());
        }

        let status = {
            let mut event = self.event.lock();
            if !event.collect_gift() {
                return Ok(Vec::new());
            }
            event.status_packet()
        };
        Ok(vec![Dispatch::BroadcastAll(status.into())])
    }
}

impl GameLogic for StageRelayLogic {
    fn handle_packet(&self, connection: &ConnectionState, packet: Packet) -> Result<Vec<Dispatch>> {
        match packet {
            Packet::ClientJoinStage(p) => Ok(self.join_stage(connection, p)),
            Packet::ClientLeaveStage(_) => self.leave_stage(connection),
            Packet::ClientStageMessage(p) => {
                if connection.stage().is_none() {
                    return Err(GameError::NotInStage.into());
                }
                let relayed = ServerStageMessagePacket {
                    sender: connection.id.0,
                    payload: p.payload,
                };
                Ok(vec![Dispatch::BroadcastToPeers(relayed.into())])
            }
            Packet::XmasClientModifyEventState(p) => self.modify_event(connection, p),
            Packet::XmasClientCollectGift(_) => self.collect_gift(connection),
            other @ (Packet::ServerStageMessage(_) | Packet::XmasServerEventStatus(_)) => Err(
                GameError::NotPermitted(format!("{} is server-to-client only", other.id())).into(),
            ),
        }
    }

    fn untrack_connection(&self, connection: &ConnectionState) {
        if let Some((_, player)) = self.roster.remove(&connection.id) {
            debug!(
                connection_id = %connection.id,
                player = %player.name,
                "Player untracked"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhaseConfig;
    use crate::error::RelayError;
    use crate::protocol::stage::{ClientLeaveStagePacket, ClientStageMessagePacket};
    use crate::protocol::xmas::{
        XmasClientCollectGiftPacket, XmasPhase, XmasPhaseModifications,
        XmasServerEventStatusPacket,
    };
    use pretty_assertions::assert_eq;

    fn logic() -> StageRelayLogic {
        StageRelayLogic::new(&EventConfig {
            admin_players: vec!["Tryce".to_string()],
            phases: vec![PhaseConfig {
                gifts_goal: 3,
                activate_automatically: false,
            }],
        })
    }

    fn join(logic: &StageRelayLogic, connection: &ConnectionState, name: &str, stage: i32) {
        logic
            .handle_packet(
                connection,
                ClientJoinStagePacket {
                    player_name: name.to_string(),
                    stage,
                    character: 1,
                }
                .into(),
            )
            .unwrap();
    }

    #[test]
    fn test_join_sets_player_and_replies_with_status() {
        let logic = logic();
        let connection = ConnectionState::new(ConnectionId(1));

        let dispatches = logic
            .handle_packet(
                &connection,
                ClientJoinStagePacket {
                    player_name: "Red".to_string(),
                    stage: 4,
                    character: 2,
                }
                .into(),
            )
            .unwrap();

        assert_eq!(connection.stage(), Some(Stage(4)));
        assert_eq!(connection.player().unwrap().character, 2);
        assert_eq!(logic.player_count(), 1);
        assert_eq!(logic.players_on_stage(Stage(4)), 1);
        assert_eq!(
            dispatches,
            vec![Dispatch::Reply(logic.event_state().status_packet().into())]
        );
    }

    #[test]
    fn test_stage_message_relayed_to_peers() {
        let logic = logic();
        let connection = ConnectionState::new(ConnectionId(8));
        join(&logic, &connection, "Red", 1);

        let dispatches = logic
            .handle_packet(
                &connection,
                ClientStageMessagePacket {
                    payload: vec![1, 2],
                }
                .into(),
            )
            .unwrap();

        assert_eq!(
            dispatches,
            vec![Dispatch::BroadcastToPeers(
                ServerStageMessagePacket {
                    sender: 8,
                    payload: vec![1, 2]
                }
                .into()
            )]
        );
    }

    #[test]
    fn test_stage_message_without_stage_rejected() {
        let logic = logic();
        let connection = ConnectionState::new(ConnectionId(1));

        let err = logic
            .handle_packet(&connection, ClientStageMessagePacket::default().into())
            .unwrap_err();
        assert!(matches!(err, RelayError::Game(GameError::NotInStage)));
    }

    #[test]
    fn test_leave_stage() {
        let logic = logic();
        let connection = ConnectionState::new(ConnectionId(1));
        assert!(logic
            .handle_packet(&connection, ClientLeaveStagePacket.into())
            .is_err());

        join(&logic, &connection, "Red", 1);
        logic
            .handle_packet(&connection, ClientLeaveStagePacket.into())
            .unwrap();
        assert_eq!(connection.stage(), None);
        assert_eq!(logic.players_on_stage(Stage(1)), 0);
        assert_eq!(logic.player_count(), 1);
    }

    #[test]
    fn test_modify_event_requires_admin() {
        let logic = logic();
        let connection = ConnectionState::new(ConnectionId(1));
        join(&logic, &connection, "Red", 1);

        let packet = XmasClientModifyEventStatePacket {
            phase_modifications: vec![XmasPhaseModifications {
                modify_gifts_goal: true,
                phase: XmasPhase {
                    gifts_goal: 99,
                    ..Default::default()
                },
                ..Default::default()
            }],
        };

        let err = logic
            .handle_packet(&connection, packet.clone().into())
            .unwrap_err();
        assert!(matches!(err, RelayError::Game(GameError::NotPermitted(_))));
        assert_eq!(logic.event_state().phases()[0].gifts_goal, 3);

        let admin = ConnectionState::new(ConnectionId(2));
        join(&logic, &admin, "tryce", 1);
        let dispatches = logic.handle_packet(&admin, packet.into()).unwrap();

        let phases = logic.event_state().phases().to_vec();
        assert_eq!(phases[0].gifts_goal, 99);
        assert!(phases[0].active);
        assert_eq!(
            dispatches,
            vec![Dispatch::BroadcastAll(
                XmasServerEventStatusPacket { phases }.into()
            )]
        );
    }

    #[test]
    fn test_collect_gift_broadcasts_status() {
        let logic = logic();
        let connection = ConnectionState::new(ConnectionId(1));

        assert!(logic
            .handle_packet(&connection, XmasClientCollectGiftPacket.into())
            .is_err());

        join(&logic, &connection, "Red", 1);
        let dispatches = logic
            .handle_packet(&connection, XmasClientCollectGiftPacket.into())
            .unwrap();
        assert_eq!(dispatches.len(), 1);
        assert_eq!(logic.event_state().phases()[0].gifts_collected, 1);
    }

    #[test]
    fn test_server_packets_rejected() {
        let logic = logic();
        let connection = ConnectionState::new(ConnectionId(1));
        let err = logic
            .handle_packet(
                &connection,
                XmasServerEventStatusPacket::default().into(),
            )
            .unwrap_err();
        assert!(matches!(err, RelayError::Game(GameError::NotPermitted(_))));
    }

    #[test]
    fn test_untrack_connection() {
        let logic = logic();
        let connection = ConnectionState::new(ConnectionId(1));
        join(&logic, &connection, "Red", 1);

        logic.untrack_connection(&connection);
        assert_eq!(logic.player_count(), 0);

        // Untracking twice is harmless
        logic.untrack_connection(&connection);
    }
}
