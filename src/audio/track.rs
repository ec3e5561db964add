use serenity::model::id::UserId;
use std::time::Duration;

use crate::node::NodeTrack;

/// A resolved, playable track together with who asked for it.
///
/// Descriptors are never mutated after the resolver builds them; queues own
/// them by value so guilds never share track state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub title: String,
    pub author: String,
    pub uri: Option<String>,
    /// Provider-side id, e.g. the YouTube video id.
    pub identifier: String,
    /// Opaque blob the node needs to play the track.
    pub encoded: String,
    /// `None` for live streams.
    pub duration: Option<Duration>,
    pub requested_by: UserId,
}

impl TrackDescriptor {
    pub fn from_node(track: NodeTrack, requested_by: UserId) -> Self {
        Self {
            duration: if track.is_stream { None } else { Some(track.length) },
            title: track.title,
            author: track.author,
            uri: track.uri,
            identifier: track.identifier,
            encoded: track.encoded,
            requested_by,
        }
    }

    /// Link used when rendering the track, falling back to the YouTube watch
    /// page built from the identifier.
    pub fn link(&self) -> String {
        self.uri
            .clone()
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", self.identifier))
    }
}
