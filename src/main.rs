use anyhow::{Context as _, Result};
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod node;
#[cfg(test)]
mod testing;
mod ui;
mod voice;

use crate::audio::{
    events::{self, EventDispatcher},
    registry::SessionRegistry,
    resolver::TrackResolver,
};
use crate::bot::{surface::CommandSurface, JukeboxBot};
use crate::config::Config;
use crate::node::lavalink::LavalinkNode;
use crate::voice::SongbirdGateway;

#[tokio::main]
async fn main() -> Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Configuration
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Discord user id is needed for the node handshake
    let http = Http::new(&config.discord_token);
    let user_id = http
        .get_current_user()
        .await
        .context("Failed to fetch the bot user; check DISCORD_TOKEN")?
        .id;

    let node = LavalinkNode::new(&config, user_id)?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&node).await;
    }

    let (events_tx, events_rx) = events::channel(config.event_buffer);
    let node_task = node.spawn(events_tx.clone());

    let songbird = Songbird::serenity();
    let gateway = Arc::new(SongbirdGateway::new(
        Arc::clone(&songbird),
        Arc::clone(&node),
        events_tx.clone(),
    ));

    let registry = Arc::new(SessionRegistry::new(
        node.clone(),
        gateway,
        config.session_settings(),
    ));
    let resolver = TrackResolver::new(node.clone(), config.search_provider, config.node_timeout);
    let surface = Arc::new(CommandSurface::new(Arc::clone(&registry), resolver));

    let shutdown = CancellationToken::new();
    let dispatcher = EventDispatcher::new(Arc::clone(&registry), events_rx, shutdown.clone());
    let dispatcher_task = tokio::spawn(dispatcher.run());

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
    let handler = JukeboxBot::new(Arc::clone(&config), surface, events_tx);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Graceful shutdown on Ctrl+C
    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, closing...");
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    shutdown.cancel();
    if !registry.is_empty() {
        info!("🛑 Closing {} active session(s)", registry.len());
        registry.shutdown().await;
    }
    node.shutdown();
    let (dispatcher_result, node_result) = tokio::join!(dispatcher_task, node_task);
    for (task, result) in [("event dispatcher", dispatcher_result), ("node connection", node_result)] {
        if let Err(e) = result {
            error!("The {} task did not finish cleanly: {}", task, e);
        }
    }

    info!("👋 Jukebox stopped");
    Ok(())
}

/// Exits successfully when the Lavalink node answers.
async fn health_check(node: &LavalinkNode) -> Result<()> {
    let version = node
        .version()
        .await
        .context("Lavalink node is not reachable")?;

    println!("OK (Lavalink {})", version);
    Ok(())
}
