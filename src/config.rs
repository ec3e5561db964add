use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

use crate::audio::resolver::SearchProvider;
use crate::audio::session::SessionSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Slash commands registered here instead of globally

    // Lavalink node
    pub lavalink_host: String,
    pub lavalink_port: u16,
    pub lavalink_password: String,
    pub lavalink_ssl: bool,
    #[serde(deserialize_with = "deserialize_duration")]
    pub node_timeout: Duration,
    pub event_buffer: usize,

    // Playback
    pub default_volume: u16,
    pub max_queue_size: usize,
    pub search_provider: SearchProvider,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();
        let settings = config::Config::builder()
            .set_default("discord_token", defaults.discord_token)?
            .set_default("lavalink_host", defaults.lavalink_host)?
            .set_default("lavalink_port", i64::from(defaults.lavalink_port))?
            .set_default("lavalink_password", defaults.lavalink_password)?
            .set_default("lavalink_ssl", defaults.lavalink_ssl)?
            .set_default("node_timeout", "8s")?
            .set_default("event_buffer", defaults.event_buffer as i64)?
            .set_default("default_volume", i64::from(defaults.default_volume))?
            .set_default("max_queue_size", defaults.max_queue_size as i64)?
            .set_default("search_provider", "youtube")?
            .add_source(config::File::with_name("jukebox").required(false))
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Sanity checks that catch common deployment mistakes before any
    /// connection is attempted.
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must be set");
        }

        if self.node_timeout.is_zero() {
            anyhow::bail!("NODE_TIMEOUT must be greater than 0");
        }

        if self.event_buffer == 0 {
            anyhow::bail!("EVENT_BUFFER must be greater than 0");
        }

        if self.default_volume > 1000 {
            anyhow::bail!("Default volume must be between 0 and 1000, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            node_timeout: self.node_timeout,
            default_volume: self.default_volume,
            max_queue_size: self.max_queue_size,
        }
    }

    /// Token-free summary for the startup log.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands in {}\n  \
            Node: {}:{} (ssl={}, timeout={})\n  \
            Playback: {} vol, {} max queue, {} search",
            self.guild_id.map_or("global".to_string(), |id| format!("guild {}", id)),
            self.lavalink_host,
            self.lavalink_port,
            self.lavalink_ssl,
            humantime::format_duration(self.node_timeout),
            self.default_volume,
            self.max_queue_size,
            self.search_provider.prefix().trim_end_matches(':'),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            guild_id: None,

            lavalink_host: "localhost".to_string(),
            lavalink_port: 2333,
            lavalink_password: "youshallnotpass".to_string(),
            lavalink_ssl: false,
            node_timeout: Duration::from_secs(8),
            event_buffer: 256,

            default_volume: 100, // Lavalink's own default
            max_queue_size: 1000,
            search_provider: SearchProvider::YouTube,
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}
