//! Protocol module
//!
//! This module contains the relay's binary packet protocol:
//! - Packet envelope, version dispatch and the packet registry
//! - Stage membership and relay packets
//! - Seasonal event packets

pub mod packets;
pub mod stage;
pub mod xmas;

pub use packets::{Packet, VersionedPacket};
