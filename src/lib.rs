//! Discord voice bot that plays Spotify and YouTube links, or search results,
//! through a per-guild queue.

pub mod audio;
pub mod bot;
pub mod config;
pub mod sources;
pub mod ui;
