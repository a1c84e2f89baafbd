//! Stage membership and relay packets

use crate::error::ProtocolError;
use crate::net::buffer::PacketBuffer;
use crate::protocol::packets::{Packet, VersionedPacket};

/// Client -> server: announce the player and the stage they are on
///
/// Version 1 carried only the name and stage; version 2 added the character.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientJoinStagePacket {
    pub player_name: String,
    pub stage: i32,
    pub character: i32,
}

impl VersionedPacket for ClientJoinStagePacket {
    const ID: &'static str = "Client-JoinStage";
    const LATEST_VERSION: u32 = 2;

    fn write(&self, buffer: &mut PacketBuffer) {
        buffer.write_string(&self.player_name);
        buffer.write_i32(self.stage);
        buffer.write_i32(self.character);
    }

    fn read(version: u32, buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        match version {
            1 => Ok(Self {
                player_name: buffer.read_string()?,
                stage: buffer.read_i32()?,
                character: 0,
            }),
            2 => Ok(Self {
                player_name: buffer.read_string()?,
                stage: buffer.read_i32()?,
                character: buffer.read_i32()?,
            }),
            _ => Err(Self::unexpected_version(version)),
        }
    }
}

impl From<ClientJoinStagePacket> for Packet {
    fn from(packet: ClientJoinStagePacket) -> Self {
        Packet::ClientJoinStage(packet)
    }
}

/// Client -> server: the player left their stage (menu, loading screen)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientLeaveStagePacket;

impl VersionedPacket for ClientLeaveStagePacket {
    const ID: &'static str = "Client-LeaveStage";
    const LATEST_VERSION: u32 = 1;

    fn write(&self, _buffer: &mut PacketBuffer) {}

    fn read(version: u32, _buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        match version {
            1 => Ok(Self),
            _ => Err(Self::unexpected_version(version)),
        }
    }
}

impl From<ClientLeaveStagePacket> for Packet {
    fn from(packet: ClientLeaveStagePacket) -> Self {
        Packet::ClientLeaveStage(packet)
    }
}

/// Client -> server: opaque game-state update for everyone on the stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStageMessagePacket {
    pub payload: Vec<u8>,
}

impl VersionedPacket for ClientStageMessagePacket {
    const ID: &'static str = "Client-StageMessage";
    const LATEST_VERSION: u32 = 1;

    fn write(&self, buffer: &mut PacketBuffer) {
        buffer.write_blob(&self.payload);
    }

    fn read(version: u32, buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        match version {
            1 => Ok(Self {
                payload: buffer.read_blob()?,
            }),
            _ => Err(Self::unexpected_version(version)),
        }
    }
}

impl From<ClientStageMessagePacket> for Packet {
    fn from(packet: ClientStageMessagePacket) -> Self {
        Packet::ClientStageMessage(packet)
    }
}

/// Server -> client: a peer's stage update, tagged with the sender's connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStageMessagePacket {
    pub sender: u64,
    pub payload: Vec<u8>,
}

impl VersionedPacket for ServerStageMessagePacket {
    const ID: &'static str = "Server-StageMessage";
    const LATEST_VERSION: u32 = 1;

    fn write(&self, buffer: &mut PacketBuffer) {
        buffer.write_u64(self.sender);
        buffer.write_blob(&self.payload);
    }

    fn read(version: u32, buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        match version {
            1 => Ok(Self {
                sender: buffer.read_u64()?,
                payload: buffer.read_blob()?,
            }),
            _ => Err(Self::unexpected_version(version)),
        }
    }
}

impl From<ServerStageMessagePacket> for Packet {
    fn from(packet: ServerStageMessagePacket) -> Self {
        Packet::ServerStageMessage(packet)
    }
}
