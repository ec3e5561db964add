use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

use crate::audio::session::MAX_VOLUME;

/// Registers the commands globally.
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers the commands for a single guild, used during development.
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        disconnect_command(),
        pause_command("stop"),
        pause_command("pause"),
        resume_command(),
        queue_command(),
        skip_command(),
        clear_command(),
        summon_command(),
        volume_command(),
        seek_command(),
        np_command(),
    ]
}

// Playback

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Searches and plays a song from a given query")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "URL or search terms")
                .required(true),
        )
}

fn disconnect_command() -> CreateCommand {
    CreateCommand::new("disconnect")
        .description("Disconnects the player from the voice channel and clears its queue")
}

/// `stop` and `pause` are the same command.
fn pause_command(name: &str) -> CreateCommand {
    CreateCommand::new(name).description("Pauses the player")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resumes the player")
}

// Queue

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Shows the current queue")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skips the current song")
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Clears the queue and stops the player")
}

fn summon_command() -> CreateCommand {
    CreateCommand::new("summon").description("Summons the player to your channel")
}

// Audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Shows or sets the player volume")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "level",
                format!("Volume level (0-{})", MAX_VOLUME),
            )
            .min_int_value(0)
            .max_int_value(u64::from(MAX_VOLUME)),
        )
}

fn seek_command() -> CreateCommand {
    CreateCommand::new("seek")
        .description("Seeks to a point in the current track")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "position", "HH:MM:SS")
                .required(true),
        )
}

fn np_command() -> CreateCommand {
    CreateCommand::new("np").description("Shows the position in the current track")
}
