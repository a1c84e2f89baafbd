//! Error handling module
//!
//! Defines custom error types for the Stagerelay server.

use std::io;

use thiserror::Error;

use crate::net::connection::ConnectionId;

/// Main error type for the Stagerelay server
#[derive(Error, Debug)]
pub enum RelayError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Protocol-related errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Game logic errors
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    #[error("Connection already registered: {0}")]
    DuplicateConnection(ConnectionId),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Write buffer full")]
    WriteBufferFull,
}

/// Protocol-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The packet id was recognised but no read routine exists for this version
    #[error("Unexpected version {version} for {packet}")]
    UnexpectedVersion { packet: &'static str, version: u32 },

    #[error("Unknown packet id: {0}")]
    UnknownPacket(String),

    #[error("Malformed packet: {0}")]
    Malformed(String),

    #[error("Insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Invalid string encoding")]
    InvalidStringEncoding,

    #[error("Packet too large: {size} bytes (max: {max})")]
    PacketTooLarge { size: usize, max: usize },
}

impl ProtocolError {
    /// Whether this error came from a read running past the end of the frame
    /// or from an otherwise unreadable payload
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            ProtocolError::Malformed(_)
                | ProtocolError::InsufficientData { .. }
                | ProtocolError::InvalidStringEncoding
        )
    }
}

/// Game logic errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Connection has not joined a stage")]
    NotInStage,

    #[error("Not permitted: {0}")]
    NotPermitted(String),
}

/// Result type alias for Stagerelay operations
pub type Result<T> = std::result::Result<T, RelayError>;
