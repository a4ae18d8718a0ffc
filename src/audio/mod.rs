//! # Audio Module
//!
//! Per-guild playback for the bot.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue Store
//! - One [`queue::GuildQueue`] per guild, created on the first `play`
//! - Volume (0-10), repeat and shuffle of the upcoming tracks
//! - A generation number per queue instance so late results from a removed
//!   queue never touch its replacement
//!
//! ### [`controller`] - Playback Controller
//! - State machine driven by a single `handle_event` entry point
//! - Returns [`controller::PlaybackAction`]s instead of doing I/O
//! - No-retry policy: a track that cannot be resolved or fails is skipped
//!
//! ### [`player`] - Audio Player
//! - Executes controller actions against songbird and Discord
//! - Voice connection with timeout, stream resolution tasks, loop refills
//!
//! ### [`loop_session`] - Loop Mode
//! - Random walk over a named playlist, each title once per cycle

pub mod controller;
pub mod loop_session;
pub mod player;
pub mod queue;
