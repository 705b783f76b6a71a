//! # Audio Module
//!
//! Per-guild playback queues and the voice output they drive.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue State
//! - `now_playing` plus a FIFO of pending tracks per guild
//! - Playback tickets that tell current completions from stale ones
//!
//! ### [`player`] - Queue Registry
//! - One lazily created session per guild, guarded by its own async mutex
//! - Play / advance / skip / clear / pause / resume / inspect
//!
//! ### [`sink`] - Voice Output
//! - [`sink::VoiceSink`] trait, implemented on top of songbird
//!
//! ### [`events`] - Completion Events
//! - Sinks report "track finished" as a [`events::PlaybackEvent`]
//! - A single dispatcher task feeds them back into the player
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use guild_jukebox::audio::{events, player::AudioPlayer};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let (tx, rx) = events::channel();
//! let player = Arc::new(AudioPlayer::new(500));
//! tokio::spawn(events::dispatch(player.clone(), rx));
//! // sinks created with `tx` now advance the queue when tracks end
//! # }
//! ```

pub mod error;
pub mod events;
pub mod player;
pub mod queue;
pub mod sink;

pub use error::PlayerError;
