//! Lavalink v4 wire types.

use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::time::Duration;

use super::{LoadResult, NodeTrack};

// REST: /v4/loadtracks

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "loadType", content = "data", rename_all = "camelCase")]
pub enum LoadTracksResponse {
    Track(Track),
    Playlist(Playlist),
    Search(Vec<Track>),
    Empty(serde_json::Value),
    Error(Exception),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub encoded: String,
    pub info: TrackInfo,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub identifier: String,
    pub is_seekable: bool,
    pub author: String,
    pub length: u64,
    pub is_stream: bool,
    pub position: u64,
    pub title: String,
    pub uri: Option<String>,
    pub source_name: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Playlist {
    pub info: PlaylistInfo,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    pub name: String,
    pub selected_track: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct Exception {
    pub message: Option<String>,
    pub severity: String,
    pub cause: Option<String>,
}

impl Exception {
    pub fn describe(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.cause.clone())
            .unwrap_or_else(|| format!("{} failure", self.severity.to_lowercase()))
    }
}

impl From<Track> for NodeTrack {
    fn from(track: Track) -> Self {
        Self {
            encoded: track.encoded,
            identifier: track.info.identifier,
            title: track.info.title,
            author: track.info.author,
            uri: track.info.uri,
            length: Duration::from_millis(track.info.length),
            is_stream: track.info.is_stream,
        }
    }
}

impl From<LoadTracksResponse> for LoadResult {
    fn from(response: LoadTracksResponse) -> Self {
        match response {
            LoadTracksResponse::Track(track) => LoadResult::Track(track.into()),
            LoadTracksResponse::Playlist(playlist) => LoadResult::Playlist {
                name: playlist.info.name,
                tracks: playlist.tracks.into_iter().map(Into::into).collect(),
            },
            LoadTracksResponse::Search(tracks) => {
                LoadResult::Search(tracks.into_iter().map(Into::into).collect())
            }
            LoadTracksResponse::Empty(_) => LoadResult::NoMatches,
            LoadTracksResponse::Error(exception) => LoadResult::LoadFailed(exception.describe()),
        }
    }
}

// REST: PATCH /v4/sessions/{session}/players/{guild}

#[derive(Debug, Serialize, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<UpdatePlayerTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceState>,
}

/// `encoded: null` unloads the current track.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct UpdatePlayerTrack {
    pub encoded: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoiceState {
    pub token: String,
    pub endpoint: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct ErrorResponse {
    pub status: u16,
    pub error: String,
    pub message: Option<String>,
}

// WebSocket: /v4/websocket

/// Envelope read first to decide how to parse the rest of a message.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GatewayEvent {
    pub op: String,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ready {
    pub resumed: bool,
    pub session_id: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    pub guild_id: GuildId,
    pub state: PlayerState,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PlayerState {
    pub time: u64,
    pub position: u64,
    pub connected: bool,
    pub ping: i64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackStart {
    pub guild_id: GuildId,
    pub track: Track,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackEnd {
    pub guild_id: GuildId,
    pub track: Track,
    pub reason: TrackEndReason,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackException {
    pub guild_id: GuildId,
    pub track: Track,
    pub exception: Exception,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackStuck {
    pub guild_id: GuildId,
    pub threshold_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketClosed {
    pub guild_id: GuildId,
    pub code: u16,
    pub reason: String,
    pub by_remote: bool,
}

/// Why the node stopped playing a track.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    #[serde(alias = "FINISHED")]
    Finished,
    #[serde(alias = "LOAD_FAILED")]
    LoadFailed,
    #[serde(alias = "STOPPED")]
    Stopped,
    #[serde(alias = "REPLACED")]
    Replaced,
    #[serde(alias = "CLEANUP")]
    Cleanup,
}

impl TrackEndReason {
    /// Whether the next queued track should start on its own.
    pub fn may_start_next(self) -> bool {
        matches!(self, Self::Finished | Self::LoadFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK: &str = r#"{
        "encoded": "QAAAjQIAJVJpY2sgQXN0bGV5",
        "info": {
            "identifier": "dQw4w9WgXcQ",
            "isSeekable": true,
            "author": "RickAstleyVEVO",
            "length": 212000,
            "isStream": false,
            "position": 0,
            "title": "Rick Astley - Never Gonna Give You Up",
            "uri": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "artworkUrl": null,
            "isrc": null,
            "sourceName": "youtube"
        },
        "pluginInfo": {},
        "userData": {}
    }"#;

    #[test]
    fn parses_every_load_type() {
        let single = format!(r#"{{"loadType":"track","data":{}}}"#, TRACK);
        let response: LoadTracksResponse = serde_json::from_str(&single).unwrap();
        match LoadResult::from(response) {
            LoadResult::Track(track) => {
                assert_eq!(track.identifier, "dQw4w9WgXcQ");
                assert_eq!(track.length, Duration::from_secs(212));
            }
            other => panic!("unexpected {:?}", other),
        }

        let playlist = format!(
            r#"{{"loadType":"playlist","data":{{"info":{{"name":"Mix","selectedTrack":-1}},"pluginInfo":{{}},"tracks":[{t},{t}]}}}}"#,
            t = TRACK
        );
        let response: LoadTracksResponse = serde_json::from_str(&playlist).unwrap();
        match LoadResult::from(response) {
            LoadResult::Playlist { name, tracks } => {
                assert_eq!(name, "Mix");
                assert_eq!(tracks.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }

        let search = format!(r#"{{"loadType":"search","data":[{}]}}"#, TRACK);
        let response: LoadTracksResponse = serde_json::from_str(&search).unwrap();
        assert!(matches!(LoadResult::from(response), LoadResult::Search(t) if t.len() == 1));

        let empty = r#"{"loadType":"empty","data":{}}"#;
        let response: LoadTracksResponse = serde_json::from_str(empty).unwrap();
        assert_eq!(LoadResult::from(response), LoadResult::NoMatches);

        let error = r#"{"loadType":"error","data":{"message":"Video unavailable","severity":"common","cause":"boom"}}"#;
        let response: LoadTracksResponse = serde_json::from_str(error).unwrap();
        assert_eq!(
            LoadResult::from(response),
            LoadResult::LoadFailed("Video unavailable".to_string())
        );
    }

    #[test]
    fn stop_serializes_a_null_track() {
        let body = UpdatePlayer {
            track: Some(UpdatePlayerTrack { encoded: None }),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "track": { "encoded": null } })
        );

        let body = UpdatePlayer {
            paused: Some(true),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&body).unwrap(), serde_json::json!({ "paused": true }));
    }

    #[test]
    fn parses_track_end_events() {
        let raw = format!(
            r#"{{"op":"event","type":"TrackEndEvent","guildId":"817327181659111454","track":{},"reason":"finished"}}"#,
            TRACK
        );
        let envelope: GatewayEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(envelope.op, "event");
        assert_eq!(envelope.event_type.as_deref(), Some("TrackEndEvent"));

        let event: TrackEnd = serde_json::from_str(&raw).unwrap();
        assert_eq!(event.guild_id, GuildId::new(817327181659111454));
        assert_eq!(event.reason, TrackEndReason::Finished);
        assert!(event.reason.may_start_next());
    }

    #[test]
    fn accepts_legacy_uppercase_end_reasons() {
        let reason: TrackEndReason = serde_json::from_str(r#""LOAD_FAILED""#).unwrap();
        assert_eq!(reason, TrackEndReason::LoadFailed);
        let reason: TrackEndReason = serde_json::from_str(r#""stopped""#).unwrap();
        assert!(!reason.may_start_next());
    }
}
