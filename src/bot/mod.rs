//! # Bot Module
//!
//! Discord glue for the jukebox.
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`]. It registers the
//! slash commands, turns interactions into [`surface::CommandSurface`] calls
//! and reports the bot being kicked out of voice back to the owning session.
//! Everything stateful lives in [`crate::audio`]; this module only
//! translates between Discord and the session layer.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod surface;

use crate::{
    audio::events::{EventSender, NodeEvent},
    config::Config,
};
use surface::CommandSurface;

/// Main Discord event handler.
pub struct JukeboxBot {
    config: Arc<Config>,
    surface: Arc<CommandSurface>,
    /// Same channel the node writes to; voice drops are reported through it.
    events: EventSender,
}

impl JukeboxBot {
    pub fn new(config: Arc<Config>, surface: Arc<CommandSurface>, events: EventSender) -> Self {
        Self {
            config,
            surface,
            events,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands go to a single guild when `GUILD_ID` is set (propagates in
    /// about a second) and globally otherwise (up to an hour).
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ The bot is not in the configured guild: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Failed to register guild commands: {:?}", e);
                    anyhow::anyhow!("Could not register guild commands. Check the bot has 'applications.commands' in the guild.")
                })?;
                info!("✅ Guild commands registered for: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Failed to register global commands: {:?}", e);
                    anyhow::anyhow!("Could not register global commands. Check the bot has 'applications.commands'.")
                })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Failed to register commands: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Failed to handle command: {:?}", e);
            }
        }
    }

    /// Reports the bot's own voice changes made by someone else. Leaving
    /// ends the session's voice binding, like the node reporting a closed
    /// connection. Being dragged to another channel rebinds it.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }
        let (Some(guild_id), Some(old_channel)) = (new.guild_id, old.and_then(|o| o.channel_id)) else {
            return;
        };

        let event = match new.channel_id {
            None => {
                info!("🔌 Bot disconnected from channel {} in guild {}", old_channel, guild_id);
                NodeEvent::VoiceClosed {
                    guild_id,
                    channel_id: Some(old_channel),
                }
            }
            Some(channel_id) if channel_id != old_channel => {
                info!("↪️ Bot moved to channel {} in guild {}", channel_id, guild_id);
                NodeEvent::VoiceMoved { guild_id, channel_id }
            }
            Some(_) => return,
        };

        if self.events.send(event).await.is_err() {
            warn!("Event dispatcher stopped, dropping voice update for guild {}", guild_id);
        }
    }
}
