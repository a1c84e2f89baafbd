//! Networking module
//!
//! This module handles all network-related functionality for the Stagerelay server:
//! - Wire buffer primitives
//! - Per-connection session state
//! - Connection registry and stage-scoped broadcast
//! - WebSocket transport and connection lifecycle

pub mod buffer;
pub mod connection;
pub mod handler;
pub mod registry;
pub mod transport;
