//! Voice channel membership.
//!
//! Joining is fire-and-forget from a session's point of view: the gateway
//! accepts the request, and once Discord assigns a voice server the bridge
//! forwards it to the node and reports [`NodeEvent::VoiceConnected`].

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{error::JoinError, Songbird};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{
    audio::events::{EventSender, NodeEvent},
    error::GatewayError,
    node::{lavalink::LavalinkNode, model::VoiceState},
};

#[async_trait]
pub trait VoiceGateway: Send + Sync + 'static {
    /// Asks the gateway to move the bot into `channel_id`.
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), GatewayError>;

    /// Leaves whatever voice channel the bot is in for this guild.
    async fn leave(&self, guild_id: GuildId) -> Result<(), GatewayError>;
}

/// Uses songbird purely as the gateway half: it changes the bot's voice state
/// and collects the voice server info, which the Lavalink node then uses to
/// open the actual voice connection.
pub struct SongbirdGateway {
    songbird: Arc<Songbird>,
    node: Arc<LavalinkNode>,
    events: EventSender,
}

impl SongbirdGateway {
    pub fn new(songbird: Arc<Songbird>, node: Arc<LavalinkNode>, events: EventSender) -> Self {
        Self {
            songbird,
            node,
            events,
        }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), GatewayError> {
        // Without a node session the voice server could not be handed over.
        if !self.node.is_ready() {
            return Err(GatewayError::Rejected("audio node not connected".to_string()));
        }

        let songbird = Arc::clone(&self.songbird);
        let node = Arc::clone(&self.node);
        let events = self.events.clone();

        tokio::spawn(async move {
            let event = match songbird.join_gateway(guild_id, channel_id).await {
                Ok((info, _call)) => {
                    let voice = VoiceState {
                        token: info.token,
                        endpoint: info.endpoint,
                        session_id: info.session_id,
                    };

                    match node.update_voice(guild_id, &voice).await {
                        Ok(()) => {
                            info!("🔊 Voice server forwarded to node for guild {}", guild_id);
                            NodeEvent::VoiceConnected { guild_id }
                        }
                        Err(e) => {
                            error!("Failed to forward voice server for guild {}: {}", guild_id, e);
                            NodeEvent::VoiceClosed {
                                guild_id,
                                channel_id: Some(channel_id),
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Voice join failed in guild {}: {}", guild_id, e);
                    NodeEvent::VoiceClosed {
                        guild_id,
                        channel_id: Some(channel_id),
                    }
                }
            };

            if events.send(event).await.is_err() {
                debug!("Event dispatcher gone, dropping voice result for guild {}", guild_id);
            }
        });

        Ok(())
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), GatewayError> {
        match self.songbird.remove(guild_id).await {
            Ok(()) | Err(JoinError::NoCall) => {}
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.node.destroy(guild_id).await {
            warn!("Failed to destroy node player for guild {}: {}", guild_id, e);
        }

        info!("👋 Left voice in guild {}", guild_id);
        Ok(())
    }
}
