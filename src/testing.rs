//! Fakes for the node and the voice gateway, shared by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    audio::{
        session::{SessionSettings, VoicePermissions, VoiceRequest},
        track::TrackDescriptor,
    },
    error::{GatewayError, NodeError},
    node::{AudioNode, LoadResult, NodeTrack},
    voice::VoiceGateway,
};

/// Player calls the fake node received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCall {
    Play(GuildId, String),
    Pause(GuildId, bool),
    Stop(GuildId),
    Skip(GuildId),
    Seek(GuildId, Duration),
    Volume(GuildId, u16),
}

#[derive(Default)]
pub struct FakeNode {
    calls: Mutex<Vec<NodeCall>>,
    results: Mutex<HashMap<String, LoadResult>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    /// Volume sent with each accepted play call.
    play_volumes: Mutex<Vec<u16>>,
}

impl FakeNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, identifier: &str, result: LoadResult) {
        self.results.lock().insert(identifier.to_string(), result);
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<NodeCall> {
        self.calls.lock().clone()
    }

    pub fn play_volumes(&self) -> Vec<u16> {
        self.play_volumes.lock().clone()
    }

    async fn wait(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    async fn record(&self, call: NodeCall) -> Result<(), NodeError> {
        self.wait().await;
        self.calls.lock().push(call);

        if self.failing.load(Ordering::SeqCst) {
            return Err(NodeError::Status {
                status: 500,
                message: "fake failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AudioNode for FakeNode {
    async fn load_tracks(&self, identifier: &str) -> Result<LoadResult, NodeError> {
        self.wait().await;
        let result = self.results.lock().get(identifier).cloned();
        Ok(result.unwrap_or(LoadResult::NoMatches))
    }

    async fn play(
        &self,
        guild_id: GuildId,
        track: &TrackDescriptor,
        volume: u16,
    ) -> Result<(), NodeError> {
        self.record(NodeCall::Play(guild_id, track.encoded.clone())).await?;
        self.play_volumes.lock().push(volume);
        Ok(())
    }

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> Result<(), NodeError> {
        self.record(NodeCall::Pause(guild_id, paused)).await
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), NodeError> {
        self.record(NodeCall::Stop(guild_id)).await
    }

    async fn skip(&self, guild_id: GuildId) -> Result<(), NodeError> {
        self.record(NodeCall::Skip(guild_id)).await
    }

    async fn seek(&self, guild_id: GuildId, position: Duration) -> Result<(), NodeError> {
        self.record(NodeCall::Seek(guild_id, position)).await
    }

    async fn set_volume(&self, guild_id: GuildId, volume: u16) -> Result<(), NodeError> {
        self.record(NodeCall::Volume(guild_id, volume)).await
    }
}

#[derive(Default)]
pub struct FakeGateway {
    joins: Mutex<Vec<(GuildId, ChannelId)>>,
    leaves: Mutex<Vec<GuildId>>,
    failing: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn joins(&self) -> Vec<(GuildId, ChannelId)> {
        self.joins.lock().clone()
    }

    pub fn leaves(&self) -> Vec<GuildId> {
        self.leaves.lock().clone()
    }

    fn check(&self) -> Result<(), GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("fake gateway down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), GatewayError> {
        self.check()?;
        self.joins.lock().push((guild_id, channel_id));
        Ok(())
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), GatewayError> {
        self.check()?;
        self.leaves.lock().push(guild_id);
        Ok(())
    }
}

pub fn node_track(name: &str) -> NodeTrack {
    NodeTrack {
        encoded: format!("enc-{}", name),
        identifier: name.to_string(),
        title: name.to_string(),
        author: "artist".to_string(),
        uri: None,
        length: Duration::from_secs(180),
        is_stream: false,
    }
}

pub fn track(name: &str) -> TrackDescriptor {
    TrackDescriptor::from_node(node_track(name), UserId::new(1))
}

/// A caller in `channel` (a voice channel id) who grants the bot every
/// permission. Commands come from text channel 500.
pub fn request(user: u64, channel: Option<u64>) -> VoiceRequest {
    VoiceRequest {
        user_id: UserId::new(user),
        channel_id: channel.map(ChannelId::new),
        text_channel: ChannelId::new(500),
        permissions: VoicePermissions {
            connect: true,
            speak: true,
        },
    }
}

pub fn settings() -> SessionSettings {
    SessionSettings {
        node_timeout: Duration::from_millis(200),
        default_volume: 100,
        max_queue_size: 100,
    }
}

/// Polls `condition` until it holds, failing the test after a second.
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
