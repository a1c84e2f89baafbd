//! Seasonal event packets
//!
//! The event is a list of phases. Clients collect gifts toward the goal of the
//! active phase; admins can rewrite individual phase fields with a
//! modification packet whose flags say which fields to overwrite.

use crate::error::ProtocolError;
use crate::net::buffer::PacketBuffer;
use crate::protocol::packets::{Packet, VersionedPacket};

/// One phase of the event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XmasPhase {
    pub active: bool,
    pub gifts_collected: u32,
    pub gifts_goal: u32,
    pub activate_phase_automatically: bool,
}

impl XmasPhase {
    /// Name used in version errors
    pub const ID: &'static str = "Xmas-Phase";
    pub const LATEST_VERSION: u32 = 1;

    /// Write the phase, prefixed by its own version
    pub fn write(&self, buffer: &mut PacketBuffer) {
        buffer.write_u32(Self::LATEST_VERSION);
        buffer.write_bool(self.active);
        buffer.write_u32(self.gifts_collected);
        buffer.write_u32(self.gifts_goal);
        buffer.write_bool(self.activate_phase_automatically);
    }

    /// Read a phase written by any supported version
    pub fn read(buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        let version = buffer.read_u32()?;
        match version {
            1 => Ok(Self {
                active: buffer.read_bool()?,
                gifts_collected: buffer.read_u32()?,
                gifts_goal: buffer.read_u32()?,
                activate_phase_automatically: buffer.read_bool()?,
            }),
            _ => Err(ProtocolError::UnexpectedVersion {
                packet: Self::ID,
                version,
            }),
        }
    }

    /// Whether enough gifts have been collected to finish the phase
    pub fn is_complete(&self) -> bool {
        self.gifts_goal > 0 && self.gifts_collected >= self.gifts_goal
    }
}

/// Field-by-field overwrite request for one phase
///
/// Each flag independently decides whether the matching field of `phase`
/// replaces the server's value; unflagged fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XmasPhaseModifications {
    pub modify_active: bool,
    pub modify_gifts_collected: bool,
    pub modify_gifts_goal: bool,
    pub modify_activate_phase_automatically: bool,
    pub phase: XmasPhase,
}

impl XmasPhaseModifications {
    pub fn write(&self, buffer: &mut PacketBuffer) {
        buffer.write_bool(self.modify_active);
        buffer.write_bool(self.modify_gifts_collected);
        buffer.write_bool(self.modify_gifts_goal);
        buffer.write_bool(self.modify_activate_phase_automatically);
        self.phase.write(buffer);
    }

    pub fn read(buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            modify_active: buffer.read_bool()?,
            modify_gifts_collected: buffer.read_bool()?,
            modify_gifts_goal: buffer.read_bool()?,
            modify_activate_phase_automatically: buffer.read_bool()?,
            phase: XmasPhase::read(buffer)?,
        })
    }

    /// Overwrite the flagged fields of `target`
    pub fn apply_to(&self, target: &mut XmasPhase) {
        if self.modify_active {
            target.active = self.phase.active;
        }
        if self.modify_gifts_collected {
            target.gifts_collected = self.phase.gifts_collected;
        }
        if self.modify_gifts_goal {
            target.gifts_goal = self.phase.gifts_goal;
        }
        if self.modify_activate_phase_automatically {
            target.activate_phase_automatically = self.phase.activate_phase_automatically;
        }
    }
}

/// Write a `u16`-counted list. Lists longer than `u16::MAX` are cut at the
/// limit so the count always matches the elements written.
fn write_counted<T>(buffer: &mut PacketBuffer, items: &[T], write: impl Fn(&T, &mut PacketBuffer)) {
    let count = items.len().min(u16::MAX as usize);
    buffer.write_u16(count as u16);
    for item in &items[..count] {
        write(item, buffer);
    }
}

/// Read exactly as many elements as the `u16` count declares
fn read_counted<T>(
    buffer: &mut PacketBuffer,
    read: impl Fn(&mut PacketBuffer) -> Result<T, ProtocolError>,
) -> Result<Vec<T>, ProtocolError> {
    let count = buffer.read_u16()? as usize;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(read(buffer)?);
    }
    Ok(items)
}

/// Client -> server: overwrite event phases (admin only)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmasClientModifyEventStatePacket {
    pub phase_modifications: Vec<XmasPhaseModifications>,
}

impl VersionedPacket for XmasClientModifyEventStatePacket {
    const ID: &'static str = "Xmas-Client-ModifyEventState";
    const LATEST_VERSION: u32 = 1;

    fn write(&self, buffer: &mut PacketBuffer) {
        write_counted(buffer, &self.phase_modifications, |m, b| m.write(b));
    }

    fn read(version: u32, buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        match version {
            1 => Ok(Self {
                phase_modifications: read_counted(buffer, XmasPhaseModifications::read)?,
            }),
            _ => Err(Self::unexpected_version(version)),
        }
    }
}

impl From<XmasClientModifyEventStatePacket> for Packet {
    fn from(packet: XmasClientModifyEventStatePacket) -> Self {
        Packet::XmasClientModifyEventState(packet)
    }
}

/// Client -> server: the player picked up a gift
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XmasClientCollectGiftPacket;

impl VersionedPacket for XmasClientCollectGiftPacket {
    const ID: &'static str = "Xmas-Client-CollectGift";
    const LATEST_VERSION: u32 = 1;

    fn write(&self, _buffer: &mut PacketBuffer) {}

    fn read(version: u32, _buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        match version {
            1 => Ok(Self),
            _ => Err(Self::unexpected_version(version)),
        }
    }
}

impl From<XmasClientCollectGiftPacket> for Packet {
    fn from(packet: XmasClientCollectGiftPacket) -> Self {
        Packet::XmasClientCollectGift(packet)
    }
}

/// Server -> client: full event state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmasServerEventStatusPacket {
    pub phases: Vec<XmasPhase>,
}

impl VersionedPacket for XmasServerEventStatusPacket {
    const ID: &'static str = "Xmas-Server-EventStatus";
    const LATEST_VERSION: u32 = 1;

    fn write(&self, buffer: &mut PacketBuffer) {
        write_counted(buffer, &self.phases, |p, b| p.write(b));
    }

    fn read(version: u32, buffer: &mut PacketBuffer) -> Result<Self, ProtocolError> {
        match version {
            1 => Ok(Self {
                phases: read_counted(buffer, XmasPhase::read)?,
            }),
            _ => Err(Self::unexpected_version(version)),
        }
    }
}

impl From<XmasServerEventStatusPacket> for Packet {
    fn from(packet: XmasServerEventStatusPacket) -> Self {
        Packet::XmasServerEventStatus(packet)
    }
}
