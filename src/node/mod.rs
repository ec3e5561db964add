//! # Node Module
//!
//! Control channel to the external audio node. The node resolves queries
//! into tracks, decodes and streams audio to Discord, and reports playback
//! lifecycle events back asynchronously.
//!
//! [`AudioNode`] is the seam the rest of the bot talks to; [`lavalink`]
//! implements it against a Lavalink v4 server.

use async_trait::async_trait;
use serenity::model::id::GuildId;
use std::time::Duration;

use crate::{audio::track::TrackDescriptor, error::NodeError};

pub mod lavalink;
pub mod model;

/// A track as the node describes it, before anyone requested it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTrack {
    pub encoded: String,
    pub identifier: String,
    pub title: String,
    pub author: String,
    pub uri: Option<String>,
    pub length: Duration,
    pub is_stream: bool,
}

/// Outcome of a load query, one variant per node load type.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadResult {
    Track(NodeTrack),
    Playlist { name: String, tracks: Vec<NodeTrack> },
    Search(Vec<NodeTrack>),
    NoMatches,
    LoadFailed(String),
}

/// Player control calls understood by the node, all scoped to one guild.
#[async_trait]
pub trait AudioNode: Send + Sync + 'static {
    /// Resolves an identifier (URL or `provider:query`) into tracks.
    async fn load_tracks(&self, identifier: &str) -> Result<LoadResult, NodeError>;

    /// Starts `track` at `volume`, replacing whatever is loaded and
    /// unpausing. The volume is sent every time since a fresh player starts
    /// at the node's default.
    async fn play(
        &self,
        guild_id: GuildId,
        track: &TrackDescriptor,
        volume: u16,
    ) -> Result<(), NodeError>;

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> Result<(), NodeError>;

    /// Unloads the current track.
    async fn stop(&self, guild_id: GuildId) -> Result<(), NodeError>;

    /// Ends the current track early. The node reports the end through a
    /// track-end event like any other.
    async fn skip(&self, guild_id: GuildId) -> Result<(), NodeError>;

    async fn seek(&self, guild_id: GuildId, position: Duration) -> Result<(), NodeError>;

    /// `volume` is already range-checked to 0..=1000.
    async fn set_volume(&self, guild_id: GuildId, volume: u16) -> Result<(), NodeError>;
}
