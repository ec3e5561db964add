use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

pub use crate::node::model::TrackEndReason;

use super::registry::SessionRegistry;

/// Asynchronous playback events, each scoped to one guild.
///
/// Most come from the node's event socket; the voice events also come from
/// the voice bridge and the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    TrackStart {
        guild_id: GuildId,
        encoded: String,
    },
    TrackEnd {
        guild_id: GuildId,
        /// Encoded form of the track that ended, when the node reports it.
        encoded: Option<String>,
        reason: TrackEndReason,
    },
    QueueEnd {
        guild_id: GuildId,
    },
    TrackException {
        guild_id: GuildId,
        message: String,
    },
    PlayerUpdate {
        guild_id: GuildId,
        position: Duration,
    },
    /// The node received the voice server assignment for this guild.
    VoiceConnected {
        guild_id: GuildId,
    },
    /// The bot is no longer in a voice channel in this guild. `channel_id`
    /// is the channel it left, when known.
    VoiceClosed {
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
    },
    /// Someone moved the bot to another channel.
    VoiceMoved {
        guild_id: GuildId,
        channel_id: ChannelId,
    },
}

impl NodeEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::TrackStart { guild_id, .. }
            | Self::TrackEnd { guild_id, .. }
            | Self::QueueEnd { guild_id }
            | Self::TrackException { guild_id, .. }
            | Self::PlayerUpdate { guild_id, .. }
            | Self::VoiceConnected { guild_id }
            | Self::VoiceClosed { guild_id, .. }
            | Self::VoiceMoved { guild_id, .. } => *guild_id,
        }
    }
}

pub type EventSender = mpsc::Sender<NodeEvent>;

/// Bounded channel feeding the dispatcher.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<NodeEvent>) {
    mpsc::channel(capacity)
}

/// Routes node events to the session that owns the guild.
///
/// Sessions process their events on their own task, so a guild waiting on a
/// slow node call never holds up delivery to other guilds.
pub struct EventDispatcher {
    registry: Arc<SessionRegistry>,
    events: mpsc::Receiver<NodeEvent>,
    shutdown: CancellationToken,
}

impl EventDispatcher {
    pub fn new(
        registry: Arc<SessionRegistry>,
        events: mpsc::Receiver<NodeEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            events,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!("📡 Event dispatcher started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => {
                        self.dispatch(event);
                    }
                    None => break,
                },
            }
        }

        info!("📡 Event dispatcher stopped");
    }

    /// Hands `event` to its session. Events for guilds without a session are
    /// dropped; returns whether the event was delivered.
    pub fn dispatch(&self, event: NodeEvent) -> bool {
        let guild_id = event.guild_id();

        match self.registry.get(guild_id) {
            Some(session) => {
                trace!("Routing {:?} to guild {}", event, guild_id);
                session.deliver(event);
                true
            }
            None => {
                debug!("Dropping event for unknown guild {}", guild_id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::session::ConnectionState;
    use crate::testing::{request, settings, track, wait_until, FakeGateway, FakeNode};

    #[tokio::test]
    async fn drops_events_for_unknown_guilds() {
        let node = FakeNode::new();
        let gateway = FakeGateway::new();
        let registry = Arc::new(SessionRegistry::new(node, gateway, settings()));
        let (_tx, rx) = channel(8);
        let dispatcher = EventDispatcher::new(registry.clone(), rx, CancellationToken::new());

        let delivered = dispatcher.dispatch(NodeEvent::QueueEnd {
            guild_id: GuildId::new(99),
        });

        assert!(!delivered);
        assert!(registry.get(GuildId::new(99)).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn routes_queue_end_to_the_owning_session() {
        let node = FakeNode::new();
        let gateway = FakeGateway::new();
        let registry = Arc::new(SessionRegistry::new(node.clone(), gateway.clone(), settings()));

        let guild_id = GuildId::new(1);
        let session = registry.get_or_create(guild_id);
        session.ensure_voice(&request(1, Some(10)), true).await.unwrap();
        session.enqueue(vec![track("a")]).await.unwrap();
        session.start_or_continue().await.unwrap();

        let (tx, rx) = channel(8);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(EventDispatcher::new(registry.clone(), rx, shutdown.clone()).run());

        tx.send(NodeEvent::QueueEnd { guild_id }).await.unwrap();

        wait_until(|| session.connection() == ConnectionState::Disconnected).await;
        assert!(session.snapshot().current.is_none());
        assert_eq!(gateway.leaves(), vec![guild_id]);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn dispatcher_stops_when_senders_are_gone() {
        let registry = Arc::new(SessionRegistry::new(FakeNode::new(), FakeGateway::new(), settings()));
        let (tx, rx) = channel(1);
        let task = tokio::spawn(EventDispatcher::new(registry, rx, CancellationToken::new()).run());

        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("dispatcher should exit")
            .unwrap();
    }
}
