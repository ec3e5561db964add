use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{application::CommandInteraction, id::GuildId},
    prelude::Context,
};
use tracing::{debug, info, warn};

use super::surface::{Invocation, PlayOutcome, VolumeOutcome};
use crate::{
    audio::{
        resolver::ResolvedKind,
        session::{Toggle, VoicePermissions, VoiceRequest, VoiceStatus},
    },
    bot::JukeboxBot,
    error::PlaybackError,
    ui::embeds,
};

/// Routes a slash command to its handler.
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return respond(
            ctx,
            &command,
            embeds::create_error_embed("Error", "This command only works in a server."),
        )
        .await;
    };

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    let inv = invocation(ctx, &command, guild_id);

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, &inv).await?,
        "disconnect" => handle_disconnect(ctx, &command, bot, &inv).await?,
        "pause" | "stop" => handle_pause(ctx, &command, bot, &inv).await?,
        "resume" => handle_resume(ctx, &command, bot, &inv).await?,
        "queue" => handle_queue(ctx, &command, bot, &inv).await?,
        "skip" => handle_skip(ctx, &command, bot, &inv).await?,
        "clear" => handle_clear(ctx, &command, bot, &inv).await?,
        "summon" => handle_summon(ctx, &command, bot, &inv).await?,
        "volume" => handle_volume(ctx, &command, bot, &inv).await?,
        "seek" => handle_seek(ctx, &command, bot, &inv).await?,
        "np" => handle_now_playing(ctx, &command, bot, &inv).await?,
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Unknown command")
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

// Command handlers

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    inv: &Invocation,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .unwrap_or_default();

    // Resolving can take a while
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let embed = match bot.surface.play(inv, query).await {
        Ok(outcome) => play_embed(&outcome),
        Err(e) => error_embed(inv.guild_id, &e),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

fn play_embed(outcome: &PlayOutcome) -> CreateEmbed {
    match (&outcome.kind, outcome.queued.first()) {
        (ResolvedKind::Playlist { name }, _) => {
            embeds::create_playlist_added_embed(name, &outcome.queued)
        }
        (_, Some(track)) => embeds::create_track_added_embed(track, outcome.started.is_some()),
        (_, None) => embeds::create_error_embed("Error", &PlaybackError::NoMatches.to_string()),
    }
}

async fn handle_disconnect(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    inv: &Invocation,
) -> Result<()> {
    let embed = match bot.surface.disconnect(inv).await {
        Ok(()) => embeds::create_success_embed("Disconnected", "👋 Left the voice channel and cleared the queue."),
        Err(e) => error_embed(inv.guild_id, &e),
    };

    respond(ctx, command, embed).await
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    inv: &Invocation,
) -> Result<()> {
    let embed = match bot.surface.pause(inv).await {
        Ok(Toggle::Changed) => embeds::create_success_embed("Paused", "⏸️ The player is paused."),
        Ok(Toggle::Unchanged) => embeds::create_info_embed("Paused", "The player is already paused."),
        Err(e) => error_embed(inv.guild_id, &e),
    };

    respond(ctx, command, embed).await
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    inv: &Invocation,
) -> Result<()> {
    let embed = match bot.surface.resume(inv).await {
        Ok(Toggle::Changed) => embeds::create_success_embed("Resumed", "▶️ The player is playing again."),
        Ok(Toggle::Unchanged) => embeds::create_info_embed("Resumed", "The player is not paused."),
        Err(e) => error_embed(inv.guild_id, &e),
    };

    respond(ctx, command, embed).await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    inv: &Invocation,
) -> Result<()> {
    let embed = match bot.surface.queue(inv).await {
        Ok(snapshot) => embeds::create_queue_embed(&guild_name(ctx, inv.guild_id), &snapshot),
        Err(e) => error_embed(inv.guild_id, &e),
    };

    respond(ctx, command, embed).await
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    inv: &Invocation,
) -> Result<()> {
    let embed = match bot.surface.skip(inv).await {
        Ok(()) => embeds::create_success_embed("Skipped", "⏭️ Skipped the current song."),
        Err(e) => error_embed(inv.guild_id, &e),
    };

    respond(ctx, command, embed).await
}

async fn handle_clear(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    inv: &Invocation,
) -> Result<()> {
    let embed = match bot.surface.clear(inv).await {
        Ok(removed) => embeds::create_success_embed(
            "Cleared",
            &format!("🧹 Removed {} track(s) and stopped the player.", removed),
        ),
        Err(e) => error_embed(inv.guild_id, &e),
    };

    respond(ctx, command, embed).await
}

async fn handle_summon(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    inv: &Invocation,
) -> Result<()> {
    let embed = match bot.surface.summon(inv).await {
        Ok(VoiceStatus::Joining(channel)) => {
            embeds::create_success_embed("Joining", &format!("🔊 Joining <#{}>", channel))
        }
        Ok(VoiceStatus::Connected(channel)) => {
            embeds::create_info_embed("Connected", &format!("Already connected to <#{}>", channel))
        }
        Err(e) => error_embed(inv.guild_id, &e),
    };

    respond(ctx, command, embed).await
}

async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    inv: &Invocation,
) -> Result<()> {
    let level = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "level")
        .and_then(|opt| opt.value.as_i64());

    let embed = match bot.surface.volume(inv, level).await {
        Ok(VolumeOutcome::Current(volume)) => {
            embeds::create_info_embed("Volume", &format!("🔊 Current volume: {}", volume))
        }
        Ok(VolumeOutcome::Set(volume)) => {
            embeds::create_success_embed("Volume", &format!("🔊 Volume set to {}", volume))
        }
        Err(e) => error_embed(inv.guild_id, &e),
    };

    respond(ctx, command, embed).await
}

async fn handle_seek(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    inv: &Invocation,
) -> Result<()> {
    let position = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "position")
        .and_then(|opt| opt.value.as_str())
        .unwrap_or_default();

    let embed = match bot.surface.seek(inv, position).await {
        Ok(offset) => embeds::create_success_embed(
            "Seeked",
            &format!("⏩ Jumped to {}", embeds::format_duration(offset)),
        ),
        Err(e) => error_embed(inv.guild_id, &e),
    };

    respond(ctx, command, embed).await
}

async fn handle_now_playing(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    inv: &Invocation,
) -> Result<()> {
    let embed = match bot.surface.now_playing(inv).await {
        Ok(snapshot) => embeds::create_now_playing_embed(&snapshot),
        Err(e) => error_embed(inv.guild_id, &e),
    };

    respond(ctx, command, embed).await
}

// Helpers

async fn respond(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;

    Ok(())
}

fn error_embed(guild_id: GuildId, error: &PlaybackError) -> CreateEmbed {
    match error {
        PlaybackError::NodeUnavailable(_) | PlaybackError::GatewayUnavailable(_) => {
            warn!("Command failed in guild {}: {}", guild_id, error);
        }
        _ => debug!("Command rejected in guild {}: {}", guild_id, error),
    }

    embeds::create_error_embed("Error", &error.to_string())
}

/// Reads the caller's voice channel and the bot's permissions there from the
/// cache. The cache guard is released before returning.
fn invocation(ctx: &Context, command: &CommandInteraction, guild_id: GuildId) -> Invocation {
    let user_id = command.user.id;
    let bot_id = ctx.cache.current_user().id;

    let (channel_id, permissions) = match guild_id.to_guild_cached(&ctx.cache) {
        Some(guild) => {
            let channel_id = guild
                .voice_states
                .get(&user_id)
                .and_then(|voice_state| voice_state.channel_id);

            let permissions = channel_id
                .and_then(|id| {
                    let channel = guild.channels.get(&id)?;
                    let member = guild.members.get(&bot_id)?;
                    let permissions = guild.user_permissions_in(channel, member);
                    Some(VoicePermissions {
                        connect: permissions.connect(),
                        speak: permissions.speak(),
                    })
                })
                // Unknown to the cache; Discord rejects the join if they are missing.
                .unwrap_or(VoicePermissions {
                    connect: true,
                    speak: true,
                });

            (channel_id, permissions)
        }
        None => {
            warn!("Guild {} not found in cache", guild_id);
            (None, VoicePermissions::default())
        }
    };

    Invocation {
        guild_id,
        voice: VoiceRequest {
            user_id,
            channel_id,
            text_channel: command.channel_id,
            permissions,
        },
    }
}

fn guild_name(ctx: &Context, guild_id: GuildId) -> String {
    guild_id
        .to_guild_cached(&ctx.cache)
        .map(|guild| guild.name.clone())
        .unwrap_or_else(|| "Server".to_string())
}
