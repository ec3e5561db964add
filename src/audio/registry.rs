use dashmap::DashMap;
use futures::future::join_all;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::debug;

use super::session::{Session, SessionSettings};
use crate::{node::AudioNode, voice::VoiceGateway};

/// One session per guild, created on first use and kept for the lifetime of
/// the process.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<Session>>,
    node: Arc<dyn AudioNode>,
    gateway: Arc<dyn VoiceGateway>,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(
        node: Arc<dyn AudioNode>,
        gateway: Arc<dyn VoiceGateway>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            node,
            gateway,
            settings,
        }
    }

    /// Returns the guild's session, creating it if needed. Concurrent callers
    /// for the same guild always get the same session.
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<Session> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                Session::spawn(
                    guild_id,
                    Arc::clone(&self.node),
                    Arc::clone(&self.gateway),
                    self.settings,
                )
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Session>> {
        self.sessions.get(&guild_id).map(|s| Arc::clone(s.value()))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Stops every session, leaves voice everywhere and drops the sessions.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self.sessions.iter().map(|s| Arc::clone(s.value())).collect();

        join_all(sessions.iter().map(|s| s.teardown())).await;
        self.sessions.clear();
        debug!("Session registry cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::session::ConnectionState;
    use crate::testing::{request, settings, track, FakeGateway, FakeNode, NodeCall};

    fn registry(node: &Arc<FakeNode>, gateway: &Arc<FakeGateway>) -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(node.clone(), gateway.clone(), settings()))
    }

    #[tokio::test]
    async fn concurrent_lookups_share_one_session() {
        let registry = registry(&FakeNode::new(), &FakeGateway::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.get_or_create(GuildId::new(7)) })
            })
            .collect();

        let sessions: Vec<_> = join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn guilds_play_independently() {
        let node = FakeNode::new();
        let gateway = FakeGateway::new();
        let registry = registry(&node, &gateway);

        let first = registry.get_or_create(GuildId::new(1));
        let second = registry.get_or_create(GuildId::new(2));

        let (a, b) = tokio::join!(
            async {
                first.ensure_voice(&request(1, Some(10)), true).await?;
                first.enqueue(vec![track("a")]).await?;
                first.start_or_continue().await
            },
            async {
                second.ensure_voice(&request(2, Some(20)), true).await?;
                second.enqueue(vec![track("b")]).await?;
                second.start_or_continue().await
            }
        );

        assert_eq!(a.unwrap().unwrap().title, "a");
        assert_eq!(b.unwrap().unwrap().title, "b");
        assert_eq!(first.snapshot().current.unwrap().title, "a");
        assert_eq!(second.snapshot().current.unwrap().title, "b");

        let calls = node.calls();
        assert!(calls.contains(&NodeCall::Play(GuildId::new(1), "enc-a".to_string())));
        assert!(calls.contains(&NodeCall::Play(GuildId::new(2), "enc-b".to_string())));
    }

    #[tokio::test]
    async fn shutdown_leaves_every_connected_guild() {
        let node = FakeNode::new();
        let gateway = FakeGateway::new();
        let registry = registry(&node, &gateway);

        let playing = registry.get_or_create(GuildId::new(1));
        playing.ensure_voice(&request(1, Some(10)), true).await.unwrap();
        playing.enqueue(vec![track("a")]).await.unwrap();
        playing.start_or_continue().await.unwrap();

        let idle = registry.get_or_create(GuildId::new(2));

        registry.shutdown().await;

        assert_eq!(playing.connection(), ConnectionState::Disconnected);
        assert_eq!(idle.connection(), ConnectionState::Disconnected);
        assert!(node.calls().contains(&NodeCall::Stop(GuildId::new(1))));
        assert_eq!(gateway.leaves(), vec![GuildId::new(1)]);
        assert!(registry.is_empty());
    }
}
