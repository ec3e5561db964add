//! # Audio Module
//!
//! Per-guild playback on top of an external audio node.
//!
//! ## Architecture
//!
//! ### [`session`] - Playback Session
//! - One voice binding, queue and player state per guild
//! - Commands and node events applied one at a time, in arrival order
//!
//! ### [`registry`] - Session Registry
//! - Creates sessions lazily and hands out the same one to concurrent callers
//!
//! ### [`events`] - Node Events
//! - Routes asynchronous node notifications to the owning session
//!
//! ### [`resolver`] - Track Resolution
//! - Turns user input into node identifiers and loaded tracks
//!
//! ### [`queue`] - Queue Management
//! - Current track, pending FIFO and position bookkeeping

pub mod events;
pub mod queue;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod track;
