use regex::Regex;
use serde::Deserialize;
use serenity::model::id::UserId;
use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};
use tracing::{debug, info, warn};

use super::track::TrackDescriptor;
use crate::{
    error::{NodeError, PlaybackError},
    node::{AudioNode, LoadResult},
};

static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.)?.+").expect("valid url regex")
});

/// Search prefixes the node understands.
const SEARCH_PREFIXES: [&str; 3] = ["ytsearch:", "ytmsearch:", "scsearch:"];

/// Where free-text queries are searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchProvider {
    #[default]
    YouTube,
    YouTubeMusic,
    SoundCloud,
}

impl SearchProvider {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::YouTube => "ytsearch:",
            Self::YouTubeMusic => "ytmsearch:",
            Self::SoundCloud => "scsearch:",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedKind {
    Track,
    Playlist { name: String },
    Search,
}

/// Tracks ready to enqueue, in order.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub kind: ResolvedKind,
    pub tracks: Vec<TrackDescriptor>,
}

/// Turns user queries into tracks through the node.
pub struct TrackResolver {
    node: Arc<dyn AudioNode>,
    provider: SearchProvider,
    timeout: Duration,
}

impl TrackResolver {
    pub fn new(node: Arc<dyn AudioNode>, provider: SearchProvider, timeout: Duration) -> Self {
        Self {
            node,
            provider,
            timeout,
        }
    }

    /// Strips Discord's `<url>` embed suppression. URLs and explicit search
    /// prefixes pass through; anything else becomes a provider search.
    pub fn normalize(&self, query: &str) -> Result<String, PlaybackError> {
        let query = query.trim().trim_matches(|c: char| c == '<' || c == '>').trim();

        if query.is_empty() {
            return Err(PlaybackError::invalid("Tell me what to play."));
        }

        if URL_REGEX.is_match(query) || SEARCH_PREFIXES.iter().any(|p| query.starts_with(p)) {
            Ok(query.to_string())
        } else {
            Ok(format!("{}{}", self.provider.prefix(), query))
        }
    }

    pub async fn resolve(&self, query: &str, requester: UserId) -> Result<Resolved, PlaybackError> {
        let identifier = self.normalize(query)?;
        debug!("🔍 Resolving {}", identifier);

        let result = tokio::time::timeout(self.timeout, self.node.load_tracks(&identifier))
            .await
            .map_err(|_| NodeError::Timeout(self.timeout))??;

        let resolved = match result {
            LoadResult::Track(track) => Resolved {
                kind: ResolvedKind::Track,
                tracks: vec![TrackDescriptor::from_node(track, requester)],
            },
            LoadResult::Playlist { name, tracks } => {
                if tracks.is_empty() {
                    return Err(PlaybackError::NoMatches);
                }
                Resolved {
                    kind: ResolvedKind::Playlist { name },
                    tracks: tracks
                        .into_iter()
                        .map(|t| TrackDescriptor::from_node(t, requester))
                        .collect(),
                }
            }
            // Only the top hit of a search is queued.
            LoadResult::Search(tracks) => {
                let first = tracks.into_iter().next().ok_or(PlaybackError::NoMatches)?;
                Resolved {
                    kind: ResolvedKind::Search,
                    tracks: vec![TrackDescriptor::from_node(first, requester)],
                }
            }
            LoadResult::NoMatches => return Err(PlaybackError::NoMatches),
            LoadResult::LoadFailed(message) => {
                warn!("Node failed to load {}: {}", identifier, message);
                return Err(PlaybackError::LoadFailed(message));
            }
        };

        info!("🎶 Resolved {} into {} track(s)", identifier, resolved.tracks.len());
        Ok(resolved)
    }
}
