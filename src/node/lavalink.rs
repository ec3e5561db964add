use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client, Response, Url,
};
use serenity::model::id::{GuildId, UserId};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpStream, task::JoinHandle};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, Message},
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    model::{
        ErrorResponse, GatewayEvent, LoadTracksResponse, PlayerUpdate, Ready, TrackEnd,
        TrackException, TrackStart, TrackStuck, UpdatePlayer, UpdatePlayerTrack, VoiceState,
        WebSocketClosed,
    },
    AudioNode, LoadResult,
};
use crate::{
    audio::{
        events::{EventSender, NodeEvent},
        track::TrackDescriptor,
    },
    config::Config,
    error::NodeError,
};

const CLIENT_NAME: &str = concat!("jukebox/", env!("CARGO_PKG_VERSION"));
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u8 = 10;

/// Discord closed the voice connection because the bot was disconnected.
const VOICE_CLOSE_DISCONNECTED: u16 = 4014;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lavalink v4 node: REST for commands, a websocket for events.
///
/// Player calls need the session id the node hands out on `ready`, so they
/// fail with [`NodeError::NoSession`] while the socket is down.
pub struct LavalinkNode {
    http: Client,
    rest: Url,
    socket: String,
    password: String,
    user_id: UserId,
    session_id: RwLock<Option<String>>,
    shutdown: CancellationToken,
}

impl LavalinkNode {
    pub fn new(config: &Config, user_id: UserId) -> Result<Arc<Self>, NodeError> {
        let (http_scheme, ws_scheme) = if config.lavalink_ssl {
            ("https", "wss")
        } else {
            ("http", "ws")
        };

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&config.lavalink_password)?);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.node_timeout)
            .build()?;

        let rest = Url::parse(&format!(
            "{}://{}:{}/v4/",
            http_scheme, config.lavalink_host, config.lavalink_port
        ))?;

        Ok(Arc::new(Self {
            http,
            rest,
            socket: format!(
                "{}://{}:{}/v4/websocket",
                ws_scheme, config.lavalink_host, config.lavalink_port
            ),
            password: config.lavalink_password.clone(),
            user_id,
            session_id: RwLock::new(None),
            shutdown: CancellationToken::new(),
        }))
    }

    /// Starts the event socket. Events are pushed into `events` until
    /// [`shutdown`](Self::shutdown) is called or reconnecting gives up.
    pub fn spawn(self: &Arc<Self>, events: EventSender) -> JoinHandle<()> {
        let node = Arc::clone(self);
        tokio::spawn(async move { node.run(events).await })
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_ready(&self) -> bool {
        self.session_id.read().is_some()
    }

    /// Hands the voice server assignment for a guild to the node.
    pub async fn update_voice(&self, guild_id: GuildId, voice: &VoiceState) -> Result<(), NodeError> {
        self.update_player(
            guild_id,
            &UpdatePlayer {
                voice: Some(voice.clone()),
                ..Default::default()
            },
        )
        .await
    }

    /// Server version string; `/version` lives outside the `/v4` prefix.
    pub async fn version(&self) -> Result<String, NodeError> {
        let url = self.rest.join("/version")?;
        let response = Self::check(self.http.get(url).send().await?).await?;
        Ok(response.text().await?.trim().to_string())
    }

    /// Removes the guild's player from the node.
    pub async fn destroy(&self, guild_id: GuildId) -> Result<(), NodeError> {
        let url = self.player_url(guild_id)?;
        let response = self.http.delete(url).send().await?;
        Self::check(response).await?;
        debug!("Destroyed node player for guild {}", guild_id);
        Ok(())
    }

    async fn run(&self, events: EventSender) {
        let mut attempt = 1u8;

        while attempt <= MAX_RECONNECT_ATTEMPTS {
            info!("🔌 Connecting to Lavalink at {} (attempt {})", self.socket, attempt);

            let stream = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                stream = self.connect() => stream,
            };

            match stream {
                Ok(stream) => {
                    info!("✅ Connected to Lavalink");
                    attempt = 1;

                    self.read_events(stream, &events).await;
                    self.session_id.write().take();

                    if self.shutdown.is_cancelled() || events.is_closed() {
                        return;
                    }
                    warn!("⚠️ Lavalink socket closed, reconnecting in {:?}", RECONNECT_DELAY);
                }
                Err(e) => {
                    warn!(
                        "Failed to connect to Lavalink (attempt {}/{}): {}",
                        attempt, MAX_RECONNECT_ATTEMPTS, e
                    );
                    attempt += 1;
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }

        error!(
            "❌ Lavalink unreachable after {} attempts, giving up",
            MAX_RECONNECT_ATTEMPTS
        );
    }

    async fn connect(&self) -> Result<Socket, NodeError> {
        let mut request = self.socket.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert("Authorization", HeaderValue::from_str(&self.password)?);
        headers.insert("User-Id", HeaderValue::from_str(&self.user_id.to_string())?);
        headers.insert("Client-Name", HeaderValue::from_static(CLIENT_NAME));

        let (stream, _) = connect_async(request).await?;
        Ok(stream)
    }

    async fn read_events(&self, mut stream: Socket, events: &EventSender) {
        loop {
            let message = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                message = stream.next() => message,
            };

            match message {
                Some(Ok(Message::Text(text))) => match decode(&text) {
                    Ok(Some(Inbound::Ready(ready))) => {
                        info!(
                            "🎛️ Lavalink session {} ready (resumed: {})",
                            ready.session_id, ready.resumed
                        );
                        *self.session_id.write() = Some(ready.session_id);
                    }
                    Ok(Some(Inbound::Event(event))) => {
                        if events.send(event).await.is_err() {
                            debug!("Event dispatcher gone, closing Lavalink socket");
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Malformed Lavalink payload: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!("Lavalink closed the socket: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Lavalink socket error: {}", e);
                    break;
                }
                None => break,
            }
        }
    }

    fn player_url(&self, guild_id: GuildId) -> Result<Url, NodeError> {
        let session_id = self.session_id.read().clone().ok_or(NodeError::NoSession)?;
        Ok(self
            .rest
            .join(&format!("sessions/{}/players/{}", session_id, guild_id))?)
    }

    async fn update_player(&self, guild_id: GuildId, body: &UpdatePlayer) -> Result<(), NodeError> {
        let url = self.player_url(guild_id)?;
        let response = self.http.patch(url).json(body).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn check(response: Response) -> Result<Response, NodeError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.message.unwrap_or(body.error),
            Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
        };

        Err(NodeError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl AudioNode for LavalinkNode {
    async fn load_tracks(&self, identifier: &str) -> Result<LoadResult, NodeError> {
        let mut url = self.rest.join("loadtracks")?;
        url.query_pairs_mut().append_pair("identifier", identifier);

        let response = Self::check(self.http.get(url).send().await?).await?;
        let body: LoadTracksResponse = serde_json::from_slice(&response.bytes().await?)?;

        Ok(body.into())
    }

    async fn play(
        &self,
        guild_id: GuildId,
        track: &TrackDescriptor,
        volume: u16,
    ) -> Result<(), NodeError> {
        self.update_player(
            guild_id,
            &UpdatePlayer {
                track: Some(UpdatePlayerTrack {
                    encoded: Some(track.encoded.clone()),
                }),
                paused: Some(false),
                volume: Some(volume),
                ..Default::default()
            },
        )
        .await
    }

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> Result<(), NodeError> {
        self.update_player(
            guild_id,
            &UpdatePlayer {
                paused: Some(paused),
                ..Default::default()
            },
        )
        .await
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), NodeError> {
        self.update_player(
            guild_id,
            &UpdatePlayer {
                track: Some(UpdatePlayerTrack { encoded: None }),
                ..Default::default()
            },
        )
        .await
    }

    // v4 has no skip call; unloading the track ends it with reason `stopped`.
    async fn skip(&self, guild_id: GuildId) -> Result<(), NodeError> {
        self.stop(guild_id).await
    }

    async fn seek(&self, guild_id: GuildId, position: Duration) -> Result<(), NodeError> {
        self.update_player(
            guild_id,
            &UpdatePlayer {
                position: Some(position.as_millis() as u64),
                ..Default::default()
            },
        )
        .await
    }

    async fn set_volume(&self, guild_id: GuildId, volume: u16) -> Result<(), NodeError> {
        self.update_player(
            guild_id,
            &UpdatePlayer {
                volume: Some(volume),
                ..Default::default()
            },
        )
        .await
    }
}

/// What a websocket message means to us.
#[derive(Debug, PartialEq)]
enum Inbound {
    Ready(Ready),
    Event(NodeEvent),
}

/// Reads the `op`/`type` envelope first, then the concrete payload.
/// Messages we don't act on (stats, unknown ops) decode to `None`.
fn decode(text: &str) -> Result<Option<Inbound>, NodeError> {
    let envelope: GatewayEvent = serde_json::from_str(text)?;

    let event = match envelope.op.as_str() {
        "ready" => return Ok(Some(Inbound::Ready(serde_json::from_str(text)?))),
        "playerUpdate" => {
            let update: PlayerUpdate = serde_json::from_str(text)?;
            NodeEvent::PlayerUpdate {
                guild_id: update.guild_id,
                position: Duration::from_millis(update.state.position),
            }
        }
        "stats" => return Ok(None),
        "event" => match envelope.event_type.as_deref() {
            Some("TrackStartEvent") => {
                let start: TrackStart = serde_json::from_str(text)?;
                NodeEvent::TrackStart {
                    guild_id: start.guild_id,
                    encoded: start.track.encoded,
                }
            }
            Some("TrackEndEvent") => {
                let end: TrackEnd = serde_json::from_str(text)?;
                NodeEvent::TrackEnd {
                    guild_id: end.guild_id,
                    encoded: Some(end.track.encoded),
                    reason: end.reason,
                }
            }
            Some("TrackExceptionEvent") => {
                let failure: TrackException = serde_json::from_str(text)?;
                NodeEvent::TrackException {
                    guild_id: failure.guild_id,
                    message: failure.exception.describe(),
                }
            }
            Some("TrackStuckEvent") => {
                let stuck: TrackStuck = serde_json::from_str(text)?;
                NodeEvent::TrackException {
                    guild_id: stuck.guild_id,
                    message: format!("track stuck for {}ms", stuck.threshold_ms),
                }
            }
            Some("WebSocketClosedEvent") => {
                let closed: WebSocketClosed = serde_json::from_str(text)?;
                if closed.code != VOICE_CLOSE_DISCONNECTED {
                    warn!(
                        "Voice socket closed in guild {} ({}: {})",
                        closed.guild_id, closed.code, closed.reason
                    );
                    return Ok(None);
                }
                NodeEvent::VoiceClosed {
                    guild_id: closed.guild_id,
                    channel_id: None,
                }
            }
            other => {
                debug!("Ignoring Lavalink event {:?}", other);
                return Ok(None);
            }
        },
        other => {
            debug!("Ignoring Lavalink op {}", other);
            return Ok(None);
        }
    };

    Ok(Some(Inbound::Event(event)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::audio::events::TrackEndReason;

    const TRACK: &str = r#"{"encoded":"QAAA","info":{"identifier":"abc","isSeekable":true,"author":"a","length":1000,"isStream":false,"position":0,"title":"t","uri":null,"sourceName":"youtube"}}"#;

    #[test]
    fn ready_carries_the_session_id() {
        let inbound = decode(r#"{"op":"ready","resumed":false,"sessionId":"la3kfsdf5eafe848"}"#).unwrap();
        match inbound {
            Some(Inbound::Ready(ready)) => assert_eq!(ready.session_id, "la3kfsdf5eafe848"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decodes_track_end_with_its_track() {
        let raw = format!(
            r#"{{"op":"event","type":"TrackEndEvent","guildId":"42","track":{},"reason":"stopped"}}"#,
            TRACK
        );
        assert_eq!(
            decode(&raw).unwrap(),
            Some(Inbound::Event(NodeEvent::TrackEnd {
                guild_id: GuildId::new(42),
                encoded: Some("QAAA".to_string()),
                reason: TrackEndReason::Stopped,
            }))
        );
    }

    #[test]
    fn decodes_player_updates() {
        let raw = r#"{"op":"playerUpdate","guildId":"42","state":{"time":1500467109,"position":60000,"connected":true,"ping":50}}"#;
        assert_eq!(
            decode(raw).unwrap(),
            Some(Inbound::Event(NodeEvent::PlayerUpdate {
                guild_id: GuildId::new(42),
                position: Duration::from_secs(60),
            }))
        );
    }

    #[test]
    fn stats_and_unknown_ops_are_ignored() {
        let stats = r#"{"op":"stats","players":1,"playingPlayers":1,"uptime":123}"#;
        assert_eq!(decode(stats).unwrap(), None);
        assert_eq!(decode(r#"{"op":"somethingNew"}"#).unwrap(), None);
    }

    #[test]
    fn only_a_disconnect_close_code_closes_the_session() {
        let kicked = r#"{"op":"event","type":"WebSocketClosedEvent","guildId":"42","code":4014,"reason":"Disconnected","byRemote":true}"#;
        assert_eq!(
            decode(kicked).unwrap(),
            Some(Inbound::Event(NodeEvent::VoiceClosed {
                guild_id: GuildId::new(42),
                channel_id: None,
            }))
        );

        let resumable = r#"{"op":"event","type":"WebSocketClosedEvent","guildId":"42","code":4015,"reason":"Voice server crashed","byRemote":true}"#;
        assert_eq!(decode(resumable).unwrap(), None);
    }

    #[test]
    fn malformed_payloads_are_errors() {
        assert!(matches!(decode("not json"), Err(NodeError::Decode(_))));
    }

    #[tokio::test]
    async fn player_calls_need_a_session() {
        let node = LavalinkNode::new(&Config::default(), UserId::new(1)).unwrap();
        assert!(!node.is_ready());
        assert!(matches!(
            node.set_paused(GuildId::new(1), true).await,
            Err(NodeError::NoSession)
        ));
    }

    #[test]
    fn player_urls_are_scoped_to_the_session() {
        let node = LavalinkNode::new(&Config::default(), UserId::new(1)).unwrap();
        *node.session_id.write() = Some("abc".to_string());
        let url = node.player_url(GuildId::new(7)).unwrap();
        assert!(url.as_str().ends_with("/v4/sessions/abc/players/7"));
    }
}
