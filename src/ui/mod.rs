//! Presentation: turns session state into Discord embeds.

pub mod embeds;
