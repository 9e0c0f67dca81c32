//! Channel Error Types

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Wire codec errors
#[derive(Error, Debug)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,

    #[error("unknown packet type '{0}'")]
    UnknownType(char),

    #[error("unsupported packet: {0}")]
    Unsupported(String),

    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("invalid JSON in packet: {0}")]
    Json(#[from] serde_json::Error),
}

/// Connection-level errors
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Invalid orchestrator URL: {0}")]
    InvalidUrl(String),

    #[error("Transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Protocol error: {0}")]
    Packet(#[from] PacketError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid payload for {event}: {reason}")]
    InvalidPayload { event: String, reason: String },

    #[error("Connection closed by orchestrator")]
    Closed,

    #[error("No traffic from orchestrator for {0}ms")]
    HeartbeatTimeout(u64),

    #[error("Gave up reconnecting after {0} attempts")]
    ReconnectExhausted(u32),

    #[error("Task supervisor is no longer running")]
    SupervisorGone,
}
