//! Per-guild playback session.
//!
//! A [`Session`] owns one guild's voice binding, queue and player settings.
//! Every mutating operation, whether it comes from a command or from a node
//! event, runs under the session's operation gate, so a guild sees its
//! commands and events applied one at a time and in arrival order. State is
//! only written after the node accepted the matching call; a failed call
//! leaves the session exactly as it was.

use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    future::Future,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::sync::{mpsc, Mutex as OpGate};
use tracing::{debug, error, info, warn};

use super::{
    events::{NodeEvent, TrackEndReason},
    queue::QueueStore,
    track::TrackDescriptor,
};
use crate::{
    error::{GatewayError, NodeError, PlaybackError},
    node::AudioNode,
    voice::VoiceGateway,
};

pub const MAX_VOLUME: u16 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub node_timeout: Duration,
    pub default_volume: u16,
    pub max_queue_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            node_timeout: Duration::from_secs(8),
            default_volume: 100,
            max_queue_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Join requested, voice server not confirmed yet.
    Connecting,
    Connected,
}

impl ConnectionState {
    /// `Connecting` counts: the bot is already bound to a channel.
    pub fn is_connected(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoicePermissions {
    pub connect: bool,
    pub speak: bool,
}

/// Who is asking, and where they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceRequest {
    pub user_id: UserId,
    /// The caller's current voice channel.
    pub channel_id: Option<ChannelId>,
    /// Channel the command was issued from.
    pub text_channel: ChannelId,
    /// The bot's permissions in the caller's voice channel.
    pub permissions: VoicePermissions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceStatus {
    /// A join to this channel was (or would be) issued.
    Joining(ChannelId),
    Connected(ChannelId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Changed,
    Unchanged,
}

/// Read-only view for queue and now-playing displays.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub connection: ConnectionState,
    pub channel_id: Option<ChannelId>,
    pub text_channel: Option<ChannelId>,
    pub current: Option<TrackDescriptor>,
    pub pending: Vec<TrackDescriptor>,
    pub position: Duration,
    pub total_duration: Duration,
    pub volume: u16,
    pub paused: bool,
}

#[derive(Debug)]
struct SessionState {
    connection: ConnectionState,
    channel_id: Option<ChannelId>,
    text_channel: Option<ChannelId>,
    queue: QueueStore,
    volume: u16,
    paused: bool,
    /// Set once a skip was accepted; the `stopped` end it causes advances.
    skip_pending: bool,
    /// Channel this session left on its own. The gateway reports that
    /// departure later, and the report must not close a newer binding.
    left_channel: Option<ChannelId>,
}

impl SessionState {
    fn new(volume: u16) -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            channel_id: None,
            text_channel: None,
            queue: QueueStore::new(),
            volume,
            paused: false,
            skip_pending: false,
            left_channel: None,
        }
    }

    /// Back to `Disconnected`. Volume and `left_channel` survive.
    fn reset(&mut self) {
        self.connection = ConnectionState::Disconnected;
        self.channel_id = None;
        self.text_channel = None;
        self.queue.clear();
        self.paused = false;
        self.skip_pending = false;
    }
}

pub struct Session {
    guild_id: GuildId,
    state: Mutex<SessionState>,
    /// Held for the whole of each mutating operation, across node calls.
    ops: OpGate<()>,
    inbox: mpsc::UnboundedSender<NodeEvent>,
    node: Arc<dyn AudioNode>,
    gateway: Arc<dyn VoiceGateway>,
    settings: SessionSettings,
}

impl Session {
    /// Creates the session and its event worker. The worker only holds a
    /// weak reference and exits once the session is dropped.
    pub fn spawn(
        guild_id: GuildId,
        node: Arc<dyn AudioNode>,
        gateway: Arc<dyn VoiceGateway>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        let (inbox, events) = mpsc::unbounded_channel();

        let session = Arc::new(Self {
            guild_id,
            state: Mutex::new(SessionState::new(settings.default_volume)),
            ops: OpGate::new(()),
            inbox,
            node,
            gateway,
            settings,
        });

        tokio::spawn(Self::process_events(Arc::downgrade(&session), events));
        debug!("🆕 Session created for guild {}", guild_id);

        session
    }

    async fn process_events(session: Weak<Self>, mut events: mpsc::UnboundedReceiver<NodeEvent>) {
        while let Some(event) = events.recv().await {
            let Some(session) = session.upgrade() else {
                break;
            };
            session.handle_event(event).await;
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.state.lock().connection
    }

    pub fn volume(&self) -> u16 {
        self.state.lock().volume
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock();
        QueueSnapshot {
            connection: state.connection,
            channel_id: state.channel_id,
            text_channel: state.text_channel,
            current: state.queue.current().cloned(),
            pending: state.queue.pending().cloned().collect(),
            position: state.queue.position(),
            total_duration: state.queue.total_duration(),
            volume: state.volume,
            paused: state.paused,
        }
    }

    /// Queues an event for this session's worker.
    pub fn deliver(&self, event: NodeEvent) {
        if self.inbox.send(event).is_err() {
            debug!("Session worker for guild {} is gone", self.guild_id);
        }
    }

    // Voice

    /// Validates the caller against the current voice binding without
    /// changing anything.
    pub fn check_voice(
        &self,
        request: &VoiceRequest,
        requires_connect: bool,
    ) -> Result<VoiceStatus, PlaybackError> {
        let state = self.state.lock();
        voice_check(&state, request, requires_connect)
    }

    /// Like [`check_voice`](Self::check_voice), but issues the join when the
    /// session is disconnected and `requires_connect` is set.
    pub async fn ensure_voice(
        &self,
        request: &VoiceRequest,
        requires_connect: bool,
    ) -> Result<VoiceStatus, PlaybackError> {
        let _op = self.ops.lock().await;

        let status = {
            let mut state = self.state.lock();
            let status = voice_check(&state, request, requires_connect)?;
            if let VoiceStatus::Joining(channel_id) = status {
                state.connection = ConnectionState::Connecting;
                state.channel_id = Some(channel_id);
                state.text_channel = Some(request.text_channel);
            }
            status
        };

        if let VoiceStatus::Joining(channel_id) = status {
            if let Err(e) = self.gateway.join(self.guild_id, channel_id).await {
                warn!("Voice join rejected in guild {}: {}", self.guild_id, e);
                self.state.lock().reset();
                return Err(e.into());
            }
            info!("🔊 Joining channel {} in guild {}", channel_id, self.guild_id);
        }

        Ok(status)
    }

    // Queue and playback

    /// Appends `tracks` in order. All or nothing when the queue limit would
    /// be exceeded.
    pub async fn enqueue(&self, tracks: Vec<TrackDescriptor>) -> Result<usize, PlaybackError> {
        let _op = self.ops.lock().await;

        let mut state = self.state.lock();
        let limit = self.settings.max_queue_size;
        if state.queue.len() + tracks.len() > limit {
            return Err(PlaybackError::QueueFull { limit });
        }

        let added = tracks.len();
        state.queue.extend(tracks);
        info!(
            "➕ Queued {} track(s) in guild {} ({} pending)",
            added,
            self.guild_id,
            state.queue.len()
        );

        Ok(added)
    }

    /// Starts the next pending track if nothing is playing. Returns the
    /// track that started, if any.
    pub async fn start_or_continue(&self) -> Result<Option<TrackDescriptor>, PlaybackError> {
        let _op = self.ops.lock().await;
        self.play_next().await
    }

    pub async fn pause(&self) -> Result<Toggle, PlaybackError> {
        self.set_paused(true).await
    }

    pub async fn resume(&self) -> Result<Toggle, PlaybackError> {
        self.set_paused(false).await
    }

    /// Asks the node to end the current track. The queue only moves when the
    /// resulting track-end event arrives.
    pub async fn skip(&self) -> Result<(), PlaybackError> {
        let _op = self.ops.lock().await;

        self.call("skip", self.node.skip(self.guild_id)).await?;
        self.state.lock().skip_pending = true;
        debug!("⏭️ Skip requested in guild {}", self.guild_id);

        Ok(())
    }

    /// Stops playback and empties the queue. Returns how many pending tracks
    /// were dropped.
    pub async fn clear(&self) -> Result<usize, PlaybackError> {
        let _op = self.ops.lock().await;

        let playing = self.state.lock().queue.current().is_some();
        if playing {
            self.call("stop", self.node.stop(self.guild_id)).await?;
        }

        let mut state = self.state.lock();
        state.skip_pending = false;
        let dropped = state.queue.clear();
        info!("🗑️ Cleared queue in guild {} ({} dropped)", self.guild_id, dropped);

        Ok(dropped)
    }

    /// Seeks the current track to `offset_ms` milliseconds.
    pub async fn seek(&self, offset_ms: i64) -> Result<Duration, PlaybackError> {
        let offset = u64::try_from(offset_ms)
            .map_err(|_| PlaybackError::invalid("The seek position can't be negative."))?;
        let position = Duration::from_millis(offset);

        let _op = self.ops.lock().await;
        self.call("seek", self.node.seek(self.guild_id, position)).await?;

        let mut state = self.state.lock();
        let running = !state.paused;
        state.queue.record_position(position, running);

        Ok(position)
    }

    /// Sets the player volume. Accepts 0..=1000.
    pub async fn set_volume(&self, value: i64) -> Result<u16, PlaybackError> {
        let volume = u16::try_from(value)
            .ok()
            .filter(|v| *v <= MAX_VOLUME)
            .ok_or_else(|| {
                PlaybackError::invalid(format!("The volume must be between 0 and {}.", MAX_VOLUME))
            })?;

        let _op = self.ops.lock().await;
        self.call("volume", self.node.set_volume(self.guild_id, volume)).await?;
        self.state.lock().volume = volume;
        info!("🔊 Volume set to {} in guild {}", volume, self.guild_id);

        Ok(volume)
    }

    /// Leaves voice on the caller's behalf. Only someone in the bot's channel
    /// may do this.
    pub async fn disconnect(&self, request: &VoiceRequest) -> Result<(), PlaybackError> {
        let _op = self.ops.lock().await;

        let playing = {
            let state = self.state.lock();
            if !state.connection.is_connected() {
                return Err(PlaybackError::NotConnected);
            }
            if request.channel_id.is_none() || request.channel_id != state.channel_id {
                return Err(PlaybackError::PermissionDenied);
            }
            state.queue.current().is_some()
        };

        if playing {
            self.call("stop", self.node.stop(self.guild_id)).await?;
        }
        {
            let mut state = self.state.lock();
            state.queue.clear();
            state.skip_pending = false;
        }

        self.leave_voice().await?;
        self.state.lock().reset();
        info!("*⃣ Disconnected from voice in guild {}", self.guild_id);

        Ok(())
    }

    /// Best-effort stop and leave, used on shutdown.
    pub async fn teardown(&self) {
        let _op = self.ops.lock().await;

        let (playing, connected) = {
            let state = self.state.lock();
            (state.queue.current().is_some(), state.connection.is_connected())
        };

        if playing {
            if let Err(e) = self.call("stop", self.node.stop(self.guild_id)).await {
                warn!("Failed to stop playback in guild {}: {}", self.guild_id, e);
            }
        }
        if connected {
            if let Err(e) = self.leave_voice().await {
                warn!("Failed to leave voice in guild {}: {}", self.guild_id, e);
            }
        }

        self.state.lock().reset();
    }

    // Events

    /// Applies one asynchronous event under the operation gate.
    pub async fn handle_event(&self, event: NodeEvent) {
        let _op = self.ops.lock().await;

        match event {
            NodeEvent::TrackStart { encoded, .. } => {
                debug!("▶️ Node started {} in guild {}", encoded, self.guild_id);
                self.promote_connecting();
            }
            NodeEvent::TrackEnd {
                encoded, reason, ..
            } => self.on_track_end(encoded, reason).await,
            NodeEvent::QueueEnd { .. } => self.on_queue_end().await,
            NodeEvent::TrackException { message, .. } => {
                warn!("⚠️ Track error in guild {}: {}", self.guild_id, message);
            }
            NodeEvent::PlayerUpdate { position, .. } => {
                let mut state = self.state.lock();
                if state.queue.current().is_some() {
                    let running = !state.paused;
                    state.queue.record_position(position, running);
                }
            }
            NodeEvent::VoiceConnected { .. } => self.promote_connecting(),
            NodeEvent::VoiceClosed { channel_id, .. } => self.on_voice_closed(channel_id).await,
            NodeEvent::VoiceMoved { channel_id, .. } => self.on_voice_moved(channel_id),
        }
    }

    async fn on_track_end(&self, encoded: Option<String>, reason: TrackEndReason) {
        let advance = {
            let mut state = self.state.lock();

            let stale = match (encoded.as_deref(), state.queue.current()) {
                (_, None) => true,
                (Some(ended), Some(current)) => ended != current.encoded,
                (None, Some(_)) => false,
            };
            if stale || reason == TrackEndReason::Replaced {
                debug!("Ignoring {:?} track end in guild {}", reason, self.guild_id);
                return;
            }

            let skipped = std::mem::take(&mut state.skip_pending);
            state.queue.finish_current();
            reason.may_start_next() || (reason == TrackEndReason::Stopped && skipped)
        };

        if !advance {
            debug!("Track ended ({:?}) in guild {}, not advancing", reason, self.guild_id);
            return;
        }

        match self.play_next().await {
            Ok(Some(_)) => {}
            Ok(None) => {
                info!("📭 Queue finished in guild {}", self.guild_id);
                self.on_queue_end().await;
            }
            Err(e) => error!("Failed to start the next track in guild {}: {}", self.guild_id, e),
        }
    }

    async fn on_queue_end(&self) {
        let connected = {
            let mut state = self.state.lock();
            state.queue.clear();
            state.connection.is_connected()
        };

        if connected {
            if let Err(e) = self.leave_voice().await {
                warn!("Failed to leave voice in guild {}: {}", self.guild_id, e);
            }
        }

        self.state.lock().reset();
        info!("👋 Queue ended, left voice in guild {}", self.guild_id);
    }

    /// The bot lost its voice channel on its own (kicked, join failed).
    /// Nothing to leave; just stop and forget.
    ///
    /// A close naming a channel only applies to that binding, and the close
    /// that follows our own leave is swallowed. A close without a channel
    /// comes from the node and only applies to a confirmed connection.
    async fn on_voice_closed(&self, channel_id: Option<ChannelId>) {
        let playing = {
            let mut state = self.state.lock();

            let applies = match channel_id {
                Some(left) if state.left_channel == Some(left) => {
                    state.left_channel = None;
                    false
                }
                Some(left) => {
                    state.connection.is_connected() && state.channel_id == Some(left)
                }
                None => state.connection == ConnectionState::Connected && state.left_channel.is_none(),
            };
            if !applies {
                debug!("Ignoring stale voice close in guild {}", self.guild_id);
                return;
            }

            state.queue.current().is_some()
        };

        if playing {
            if let Err(e) = self.call("stop", self.node.stop(self.guild_id)).await {
                debug!("Stop after voice loss failed in guild {}: {}", self.guild_id, e);
            }
        }

        self.state.lock().reset();
        info!("🔇 Voice connection closed in guild {}", self.guild_id);
    }

    /// Someone dragged the bot into another channel; listeners there now
    /// own the session.
    fn on_voice_moved(&self, channel_id: ChannelId) {
        let mut state = self.state.lock();
        if state.connection.is_connected() && state.channel_id != Some(channel_id) {
            state.channel_id = Some(channel_id);
            info!("↪️ Moved to channel {} in guild {}", channel_id, self.guild_id);
        }
    }

    // Helpers; callers hold the operation gate.

    async fn play_next(&self) -> Result<Option<TrackDescriptor>, PlaybackError> {
        let (next, volume) = {
            let state = self.state.lock();
            if state.queue.current().is_some() {
                return Ok(None);
            }
            match state.queue.peek_next() {
                Some(track) => (track.clone(), state.volume),
                None => return Ok(None),
            }
        };

        self.call("play", self.node.play(self.guild_id, &next, volume)).await?;

        let mut state = self.state.lock();
        state.queue.pop_front();
        state.queue.record_position(Duration::ZERO, true);
        state.paused = false;
        info!("🎵 Now playing in guild {}: {}", self.guild_id, next.title);

        Ok(Some(next))
    }

    /// Leaves voice and remembers the channel so the matching close notice
    /// is recognized as ours.
    async fn leave_voice(&self) -> Result<(), GatewayError> {
        let channel_id = self.state.lock().channel_id;
        self.gateway.leave(self.guild_id).await?;
        self.state.lock().left_channel = channel_id;
        Ok(())
    }

    async fn set_paused(&self, paused: bool) -> Result<Toggle, PlaybackError> {
        let _op = self.ops.lock().await;

        let unchanged = self.state.lock().paused == paused;
        if unchanged {
            return Ok(Toggle::Unchanged);
        }

        let action = if paused { "pause" } else { "resume" };
        self.call(action, self.node.set_paused(self.guild_id, paused)).await?;

        let mut state = self.state.lock();
        state.paused = paused;
        state.queue.set_running(!paused);
        info!("{} Playback {}d in guild {}", if paused { "⏸️" } else { "▶️" }, action, self.guild_id);

        Ok(Toggle::Changed)
    }

    /// Runs a node call with the configured timeout. Any accepted call proves
    /// the voice path works, so it also settles a pending join.
    async fn call<T>(
        &self,
        action: &str,
        request: impl Future<Output = Result<T, NodeError>>,
    ) -> Result<T, PlaybackError> {
        let timeout = self.settings.node_timeout;
        let result = tokio::time::timeout(timeout, request)
            .await
            .unwrap_or(Err(NodeError::Timeout(timeout)));

        match result {
            Ok(value) => {
                self.promote_connecting();
                Ok(value)
            }
            Err(e) => {
                warn!("Node {} failed in guild {}: {}", action, self.guild_id, e);
                Err(e.into())
            }
        }
    }

    fn promote_connecting(&self) {
        let mut state = self.state.lock();
        if state.connection == ConnectionState::Connecting {
            state.connection = ConnectionState::Connected;
            info!("✅ Voice connected in guild {}", self.guild_id);
        }
    }
}

fn voice_check(
    state: &SessionState,
    request: &VoiceRequest,
    requires_connect: bool,
) -> Result<VoiceStatus, PlaybackError> {
    let channel_id = request.channel_id.ok_or(PlaybackError::NoVoiceChannel)?;

    if !state.connection.is_connected() {
        if !requires_connect {
            return Err(PlaybackError::NotConnected);
        }
        if !(request.permissions.connect && request.permissions.speak) {
            return Err(PlaybackError::MissingPermission);
        }
        return Ok(VoiceStatus::Joining(channel_id));
    }

    match state.channel_id {
        Some(bound) if bound == channel_id => Ok(VoiceStatus::Connected(bound)),
        _ => Err(PlaybackError::WrongChannel),
    }
}
