//! Packet envelope and registry
//!
//! Every frame on the wire is `[packet id][version][payload]`:
//! - packet id: length-prefixed UTF-8 string
//! - version: little-endian `u32`
//! - payload: type-specific, laid out according to the version
//!
//! Encoding always writes the packet type's latest version. Decoding looks the
//! id up in a closed registry and hands the version to that type's reader,
//! which keeps one read routine per historical version and rejects the rest.

use std::collections::HashMap;
use std::sync::OnceLock;

use bytes::Bytes;
use tracing::trace;

use crate::error::ProtocolError;
use crate::net::buffer::PacketBuffer;
use crate::protocol::stage::{
    ClientJoinStagePacket, ClientLeaveStagePacket, ClientStageMessagePacket,
    ServerStageMessagePacket,
};
use crate::protocol::xmas::{
    XmasClientCollectGiftPacket, XmasClientModifyEventStatePacket, XmasServerEventStatusPacket,
};

/// A packet type with a stable id and versioned payload layout
pub trait VersionedPacket: Sized + Into<Packet> {
    /// Packet id written into the envelope
    const ID: &'static str;

    /// Version written by `write`
    const LATEST_VERSION: u32;

    /// Write the payload in the latest layout
    fn write(&self, buffer: &mut PacketBuffer);

    /// Read a payload written with `version`
    fn read(version: u32, buffer: &mut PacketBuffer) -> Result<Self, ProtocolError>;

    /// Error for a version this type has no read routine for
    fn unexpected_version(version: u32) -> ProtocolError {
        ProtocolError::UnexpectedVersion {
            packet: Self::ID,
            version,
        }
    }

    /// Encode into a complete frame
    fn to_frame(&self) -> Bytes {
        let mut buffer = PacketBuffer::with_capacity(64);
        buffer.write_string(Self::ID);
        buffer.write_u32(Self::LATEST_VERSION);
        self.write(&mut buffer);
        buffer.freeze()
    }
}

/// Every packet the relay understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    ClientJoinStage(ClientJoinStagePacket),
    ClientLeaveStage(ClientLeaveStagePacket),
    ClientStageMessage(ClientStageMessagePacket),
    ServerStageMessage(ServerStageMessagePacket),
    XmasClientModifyEventState(XmasClientModifyEventStatePacket),
    XmasClientCollectGift(XmasClientCollectGiftPacket),
    XmasServerEventStatus(XmasServerEventStatusPacket),
}

impl Packet {
    /// Packet id of this variant
    pub fn id(&self) -> &'static str {
        match self {
            Packet::ClientJoinStage(_) => ClientJoinStagePacket::ID,
            Packet::ClientLeaveStage(_) => ClientLeaveStagePacket::ID,
            Packet::ClientStageMessage(_) => ClientStageMessagePacket::ID,
            Packet::ServerStageMessage(_) => ServerStageMessagePacket::ID,
            Packet::XmasClientModifyEventState(_) => XmasClientModifyEventStatePacket::ID,
            Packet::XmasClientCollectGift(_) => XmasClientCollectGiftPacket::ID,
            Packet::XmasServerEventStatus(_) => XmasServerEventStatusPacket::ID,
        }
    }

    /// Encode the packet into a frame using its latest version
    pub fn encode(&self) -> Bytes {
        match self {
            Packet::ClientJoinStage(p) => p.to_frame(),
            Packet::ClientLeaveStage(p) => p.to_frame(),
            Packet::ClientStageMessage(p) => p.to_frame(),
            Packet::ServerStageMessage(p) => p.to_frame(),
            Packet::XmasClientModifyEventState(p) => p.to_frame(),
            Packet::XmasClientCollectGift(p) => p.to_frame(),
            Packet::XmasServerEventStatus(p) => p.to_frame(),
        }
    }

    /// Decode a frame
    pub fn decode(frame: &[u8]) -> Result<Packet, ProtocolError> {
        let mut buffer = PacketBuffer::from_bytes(frame);
        let id = buffer.read_string()?;
        let version = buffer.read_u32()?;

        let decode = packet_registry()
            .get(id.as_str())
            .ok_or_else(|| ProtocolError::UnknownPacket(id.clone()))?;
        let packet = decode(version, &mut buffer)?;

        if buffer.has_remaining() {
            trace!(
                packet = %id,
                version = version,
                trailing = buffer.remaining(),
                "Ignoring trailing bytes after packet payload"
            );
        }

        Ok(packet)
    }

    /// Decode a frame, rejecting it up front if it exceeds `max_size`
    pub fn decode_limited(frame: &[u8], max_size: usize) -> Result<Packet, ProtocolError> {
        if frame.len() > max_size {
            return Err(ProtocolError::PacketTooLarge {
                size: frame.len(),
                max: max_size,
            });
        }
        Self::decode(frame)
    }
}

/// Decoder entry for one packet id
pub type DecodeFn = fn(u32, &mut PacketBuffer) -> Result<Packet, ProtocolError>;

fn decode_as<P: VersionedPacket>(
    version: u32,
    buffer: &mut PacketBuffer,
) -> Result<Packet, ProtocolError> {
    P::read(version, buffer).map(Into::into)
}

static PACKET_REGISTRY: OnceLock<HashMap<&'static str, DecodeFn>> = OnceLock::new();

fn register<P: VersionedPacket>(map: &mut HashMap<&'static str, DecodeFn>) {
    map.insert(P::ID, decode_as::<P> as DecodeFn);
}

/// Get the packet id -> decoder registry
pub fn packet_registry() -> &'static HashMap<&'static str, DecodeFn> {
    PACKET_REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();

        register::<ClientJoinStagePacket>(&mut map);
        register::<ClientLeaveStagePacket>(&mut map);
        register::<ClientStageMessagePacket>(&mut map);
        register::<ServerStageMessagePacket>(&mut map);
        register::<XmasClientModifyEventStatePacket>(&mut map);
        register::<XmasClientCollectGiftPacket>(&mut map);
        register::<XmasServerEventStatusPacket>(&mut map);

        map
    })
}

/// Check whether a packet id has a registered decoder
pub fn is_known_packet(id: &str) -> bool {
    packet_registry().contains_key(id)
}
