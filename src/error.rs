//! Error types for playback commands, the audio node and the voice gateway.
//!
//! [`PlaybackError`] is what every command returns. Its `Display` output is
//! the message shown to the user, so variants are worded for Discord and not
//! for logs.

use std::time::Duration;

use thiserror::Error;

/// Failures surfaced to the user invoking a playback command.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Join a voice channel first.")]
    NoVoiceChannel,

    #[error("I'm not connected to a voice channel.")]
    NotConnected,

    #[error("You need to be in my voice channel.")]
    WrongChannel,

    #[error("I need the `CONNECT` and `SPEAK` permissions.")]
    MissingPermission,

    #[error("You can't disconnect me when you're not listening.")]
    PermissionDenied,

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Nothing found!")]
    NoMatches,

    #[error("The track could not be loaded: {0}")]
    LoadFailed(String),

    #[error("The queue is full (max {limit} tracks).")]
    QueueFull { limit: usize },

    #[error("The audio node is unavailable ({0}).")]
    NodeUnavailable(#[from] NodeError),

    #[error("The voice gateway rejected the request ({0}).")]
    GatewayUnavailable(String),
}

impl PlaybackError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Transport-level failures talking to the audio node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("node session not established")]
    NoSession,

    #[error("node answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed node payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid node address: {0}")]
    Address(#[from] url::ParseError),

    #[error("invalid node credentials: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
}

/// Failures reported by the voice gateway when asked to join or leave.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("voice join failed: {0}")]
    Join(#[from] songbird::error::JoinError),

    #[error("{0}")]
    Rejected(String),
}

impl From<GatewayError> for PlaybackError {
    fn from(e: GatewayError) -> Self {
        Self::GatewayUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_errors_surface_as_node_unavailable() {
        let err: PlaybackError = NodeError::Timeout(Duration::from_secs(8)).into();
        assert!(matches!(err, PlaybackError::NodeUnavailable(NodeError::Timeout(_))));
        assert!(err.to_string().contains("unavailable"));
    }

    #[test]
    fn invalid_argument_displays_its_message() {
        let err = PlaybackError::invalid("Volume must be between 0 and 1000.");
        assert_eq!(err.to_string(), "Volume must be between 0 and 1000.");
    }
}
