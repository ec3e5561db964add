use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};
use tracing::debug;

use crate::{
    audio::{
        registry::SessionRegistry,
        resolver::{ResolvedKind, TrackResolver},
        session::{QueueSnapshot, Toggle, VoiceRequest, VoiceStatus},
        track::TrackDescriptor,
    },
    error::PlaybackError,
};

/// A command call: which guild, and who is asking from where.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub guild_id: GuildId,
    pub voice: VoiceRequest,
}

#[derive(Debug, Clone)]
pub struct PlayOutcome {
    pub kind: ResolvedKind,
    pub queued: Vec<TrackDescriptor>,
    /// Set when this call started playback.
    pub started: Option<TrackDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeOutcome {
    Current(u16),
    Set(u16),
}

/// The user-facing commands, free of any Discord transport.
pub struct CommandSurface {
    registry: Arc<SessionRegistry>,
    resolver: TrackResolver,
}

impl CommandSurface {
    pub fn new(registry: Arc<SessionRegistry>, resolver: TrackResolver) -> Self {
        Self { registry, resolver }
    }

    /// Resolves `query`, joins the caller's channel if needed, queues the
    /// result and starts playback if nothing is playing.
    pub async fn play(&self, inv: &Invocation, query: &str) -> Result<PlayOutcome, PlaybackError> {
        let session = self.registry.get_or_create(inv.guild_id);

        // Reject before touching the node.
        session.check_voice(&inv.voice, true)?;

        let resolved = self.resolver.resolve(query, inv.voice.user_id).await?;
        session.ensure_voice(&inv.voice, true).await?;

        let queued = resolved.tracks.clone();
        session.enqueue(resolved.tracks).await?;
        let started = session.start_or_continue().await?;

        Ok(PlayOutcome {
            kind: resolved.kind,
            queued,
            started,
        })
    }

    pub async fn disconnect(&self, inv: &Invocation) -> Result<(), PlaybackError> {
        let session = self.registry.get_or_create(inv.guild_id);
        session.disconnect(&inv.voice).await
    }

    pub async fn pause(&self, inv: &Invocation) -> Result<Toggle, PlaybackError> {
        let session = self.registry.get_or_create(inv.guild_id);
        session.ensure_voice(&inv.voice, false).await?;
        session.pause().await
    }

    pub async fn resume(&self, inv: &Invocation) -> Result<Toggle, PlaybackError> {
        let session = self.registry.get_or_create(inv.guild_id);
        session.ensure_voice(&inv.voice, false).await?;
        session.resume().await
    }

    pub async fn queue(&self, inv: &Invocation) -> Result<QueueSnapshot, PlaybackError> {
        let session = self.registry.get_or_create(inv.guild_id);
        session.ensure_voice(&inv.voice, false).await?;
        Ok(session.snapshot())
    }

    pub async fn skip(&self, inv: &Invocation) -> Result<(), PlaybackError> {
        let session = self.registry.get_or_create(inv.guild_id);
        session.ensure_voice(&inv.voice, false).await?;
        session.skip().await
    }

    pub async fn clear(&self, inv: &Invocation) -> Result<usize, PlaybackError> {
        let session = self.registry.get_or_create(inv.guild_id);
        session.ensure_voice(&inv.voice, false).await?;
        session.clear().await
    }

    /// Joins the caller's channel. `Connected` means the bot was already
    /// there.
    pub async fn summon(&self, inv: &Invocation) -> Result<VoiceStatus, PlaybackError> {
        let session = self.registry.get_or_create(inv.guild_id);
        session.ensure_voice(&inv.voice, true).await
    }

    pub async fn volume(
        &self,
        inv: &Invocation,
        value: Option<i64>,
    ) -> Result<VolumeOutcome, PlaybackError> {
        let session = self.registry.get_or_create(inv.guild_id);
        session.ensure_voice(&inv.voice, false).await?;

        match value {
            Some(value) => Ok(VolumeOutcome::Set(session.set_volume(value).await?)),
            None => Ok(VolumeOutcome::Current(session.volume())),
        }
    }

    /// Seeks to an `HH:MM:SS` timestamp.
    pub async fn seek(&self, inv: &Invocation, timestamp: &str) -> Result<Duration, PlaybackError> {
        let session = self.registry.get_or_create(inv.guild_id);
        session.ensure_voice(&inv.voice, false).await?;

        let offset_ms = parse_timestamp(timestamp)?;
        debug!("⏩ Seek to {}ms requested in guild {}", offset_ms, inv.guild_id);
        session.seek(offset_ms).await
    }

    /// Estimated position of the current track, if any.
    pub async fn now_playing(&self, inv: &Invocation) -> Result<QueueSnapshot, PlaybackError> {
        self.queue(inv).await
    }
}

/// `HH:MM:SS` to milliseconds. A leading `-` is kept so that a negative
/// offset reaches the session's own range check.
fn parse_timestamp(raw: &str) -> Result<i64, PlaybackError> {
    let invalid = || PlaybackError::invalid("Use the `HH:MM:SS` format, e.g. `00:01:30`.");

    let raw = raw.trim();
    let (sign, body) = match raw.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, raw),
    };

    let parts = body
        .split(':')
        .map(|p| p.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;

    let &[h, m, s] = parts.as_slice() else {
        return Err(invalid());
    };

    h.checked_mul(3600)
        .and_then(|total| total.checked_add(m.checked_mul(60)?))
        .and_then(|total| total.checked_add(s))
        .and_then(|total| total.checked_mul(1000 * sign))
        .ok_or_else(invalid)
}
