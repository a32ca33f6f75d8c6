use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failures surfaced by [`crate::session::Session`].
///
/// Everything before the namespace is connected maps to `InvalidEndpoint`,
/// `Connect`, `Handshake`, `Rejected` or `Timeout`; everything after maps to
/// `Closed`, `Encode` or `Transport`.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failed to connect to {url}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("server rejected the connection: {0}")]
    Rejected(Value),

    #[error("no connect acknowledgement within {0:?}")]
    Timeout(Duration),

    #[error("session is closed")]
    Closed,

    #[error("failed to encode payload")]
    Encode(#[from] serde_json::Error),

    #[error("transport error")]
    Transport(#[source] tungstenite::Error),
}

/// Codec failures for Engine.IO and Socket.IO text packets.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,

    #[error("unknown {layer} packet type '{kind}'")]
    UnknownType { layer: &'static str, kind: char },

    #[error("malformed packet: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for PacketError {
    fn from(err: serde_json::Error) -> Self {
        PacketError::Malformed(err.to_string())
    }
}
