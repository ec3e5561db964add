use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{session::QueueSnapshot, track::TrackDescriptor};

/// Colors shared by every embed the bot sends.
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
    pub const QUEUE_LIME: Colour = Colour::from_rgb(163, 207, 50);
}

const STANDARD_FOOTER: &str = "🎵 Jukebox";

/// Queue listing is cut here to stay under Discord's embed size limit.
const MAX_LISTED: usize = 20;

/// Discord rejects embed field values longer than this many characters.
const FIELD_LIMIT: usize = 1024;

/// Room kept for the "… and N more" line.
const MORE_RESERVE: usize = 32;

/// Longer titles are cut so one track never fills a field.
const TITLE_LIMIT: usize = 100;

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Single track added to the queue.
pub fn create_track_added_embed(track: &TrackDescriptor, started: bool) -> CreateEmbed {
    let title = if started { "🎵 Now Playing" } else { "✅ Track Enqueued" };

    CreateEmbed::default()
        .title(title)
        .description(track_link(track))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artist", &track.author, true)
        .field("⏱️ Duration", duration_label(track.duration), true)
        .field("👤 Requested by", format!("<@{}>", track.requested_by), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_playlist_added_embed(name: &str, tracks: &[TrackDescriptor]) -> CreateEmbed {
    let total: Duration = tracks.iter().filter_map(|t| t.duration).sum();

    CreateEmbed::default()
        .title("📋 Playlist Enqueued!")
        .description(format!("**{}** - {} tracks", name, tracks.len()))
        .color(colors::MUSIC_PURPLE)
        .field("📊 Tracks", tracks.len().to_string(), true)
        .field("⏱️ Duration", format_duration(total), true)
        .footer(CreateEmbedFooter::new(
            "🎵 Playback starts on its own • Use /queue to see every track",
        ))
        .timestamp(Timestamp::now())
}

/// Current track plus pending list.
pub fn create_queue_embed(guild_name: &str, snapshot: &QueueSnapshot) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title(format!("📋 {}'s Queue", guild_name))
        .color(colors::QUEUE_LIME);

    let Some(current) = &snapshot.current else {
        return embed
            .description("😴 **The queue is empty**\n\n💡 Use `/play <song>` to add music")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    };

    let status = if snapshot.paused { "⏸️" } else { "▶️" };
    let mut embed = embed.field(format!("{} Now playing", status), track_link(current), false);

    if !snapshot.pending.is_empty() {
        embed = embed.field("Up next", up_next(&snapshot.pending), false);
    }

    let mut info = format!("**Total:** {} tracks", snapshot.pending.len() + 1);
    if snapshot.total_duration > Duration::ZERO {
        info.push_str(&format!(" • **Duration:** {}", format_duration(snapshot.total_duration)));
    }
    info.push_str(&format!(" • **Volume:** {}", snapshot.volume));

    embed
        .field("Info", info, false)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Position in the current track.
pub fn create_now_playing_embed(snapshot: &QueueSnapshot) -> CreateEmbed {
    let Some(current) = &snapshot.current else {
        return create_info_embed("Nothing playing", "The queue is empty.");
    };

    let progress = match current.duration {
        Some(length) => format!("{} / {}", format_duration(snapshot.position), format_duration(length)),
        None => format!("{} / 🔴 Live", format_duration(snapshot.position)),
    };

    CreateEmbed::default()
        .title(if snapshot.paused { "⏸️ Paused" } else { "🎵 Now Playing" })
        .description(track_link(current))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Position", progress, true)
        .field("👤 Requested by", format!("<@{}>", current.requested_by), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Pending tracks, cut to fit one embed field.
fn up_next(pending: &[TrackDescriptor]) -> String {
    let mut listing = String::new();
    let mut length = 0;
    let mut shown = 0;

    for (i, item) in pending.iter().take(MAX_LISTED).enumerate() {
        let line = format!(
            "**{}**. {} `[{}]`\n",
            i + 1,
            track_link(item),
            duration_label(item.duration)
        );
        let line_length = line.chars().count();
        if length + line_length + MORE_RESERVE > FIELD_LIMIT {
            break;
        }
        listing.push_str(&line);
        length += line_length;
        shown += 1;
    }

    if shown < pending.len() {
        listing.push_str(&format!("… and {} more", pending.len() - shown));
    }
    listing
}

fn track_link(track: &TrackDescriptor) -> String {
    let title = if track.title.chars().count() > TITLE_LIMIT {
        let cut: String = track.title.chars().take(TITLE_LIMIT - 1).collect();
        format!("{}…", cut)
    } else {
        track.title.clone()
    };
    format!("[{}]({})", title, track.link())
}

fn duration_label(duration: Option<Duration>) -> String {
    duration.map_or_else(|| "🔴 Live".to_string(), format_duration)
}

/// Formats a duration as `m:ss`, or `h:mm:ss` past an hour.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audio::session::ConnectionState, testing::track};
    use serenity::all::ChannelId;

    #[test]
    fn formats_short_and_long_durations() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00");
        assert_eq!(format_duration(Duration::from_secs(212)), "3:32");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 5)), "3:00:05");
    }

    fn snapshot(pending: Vec<TrackDescriptor>) -> QueueSnapshot {
        QueueSnapshot {
            connection: ConnectionState::Connected,
            channel_id: Some(ChannelId::new(10)),
            text_channel: Some(ChannelId::new(500)),
            current: Some(track("current")),
            total_duration: Duration::from_secs(180 * (pending.len() as u64 + 1)),
            pending,
            position: Duration::ZERO,
            volume: 100,
            paused: false,
        }
    }

    fn long_track(i: usize) -> TrackDescriptor {
        let mut item = track(&format!("video{:05}", i));
        item.title = format!("{} {}", i, "Extended Official Music Video ".repeat(6));
        item.uri = Some(format!("https://www.youtube.com/watch?v=video{:05}&list=PL{}", i, "x".repeat(40)));
        item
    }

    fn field_values(embed: &CreateEmbed) -> Vec<(String, String)> {
        let json = serde_json::to_value(embed).unwrap();
        json["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| {
                (
                    f["name"].as_str().unwrap().to_string(),
                    f["value"].as_str().unwrap().to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn long_queues_fit_discord_field_limits() {
        let pending: Vec<_> = (0..30).map(long_track).collect();
        let embed = create_queue_embed("Guild", &snapshot(pending));

        let fields = field_values(&embed);
        for (name, value) in &fields {
            assert!(
                value.chars().count() <= FIELD_LIMIT,
                "field {} has {} characters",
                name,
                value.chars().count()
            );
        }

        let (_, listing) = fields.iter().find(|(name, _)| name == "Up next").unwrap();
        let shown = listing.lines().filter(|l| l.starts_with("**")).count();
        assert!(shown > 0);
        assert!(listing.ends_with(&format!("… and {} more", 30 - shown)));
    }

    #[test]
    fn short_queues_are_listed_in_full() {
        let pending = vec![track("a"), track("b")];
        let embed = create_queue_embed("Guild", &snapshot(pending));

        let fields = field_values(&embed);
        let (_, listing) = fields.iter().find(|(name, _)| name == "Up next").unwrap();
        assert_eq!(listing.lines().count(), 2);
        assert!(!listing.contains("more"));
    }

    #[test]
    fn long_titles_are_cut() {
        let mut item = track("a");
        item.title = "x".repeat(300);
        let link = track_link(&item);
        assert!(link.starts_with(&format!("[{}…]", "x".repeat(TITLE_LIMIT - 1))));
    }

    #[test]
    fn live_tracks_have_no_duration() {
        assert_eq!(duration_label(None), "🔴 Live");
        assert_eq!(duration_label(Some(Duration::from_secs(61))), "1:01");
    }
}
