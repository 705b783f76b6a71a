use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::GuildId;
use songbird::{
    input::HttpRequest,
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{
    events::{EventSender, PlaybackEvent},
    queue::PlaybackTicket,
};

/// The bot's audio output in one guild.
///
/// Instead of taking a completion callback, a sink reports the end of each
/// track as a [`PlaybackEvent`] tagged with the ticket passed to [`play`].
///
/// [`play`]: VoiceSink::play
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceSink: Send + Sync {
    /// Starts streaming `stream_url`, replacing anything currently playing.
    async fn play(&self, stream_url: &str, ticket: PlaybackTicket) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    async fn resume(&self) -> Result<()>;
    /// Stops the current track. Its completion event still fires.
    async fn stop(&self) -> Result<()>;
    async fn is_playing(&self) -> bool;
    async fn is_paused(&self) -> bool;
}

/// [`VoiceSink`] backed by a songbird voice call.
pub struct SongbirdSink {
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    volume: f32,
    events: EventSender,
    current: SyncMutex<Option<TrackHandle>>,
}

impl SongbirdSink {
    pub fn new(
        guild_id: GuildId,
        call: Arc<Mutex<Call>>,
        http: reqwest::Client,
        volume: f32,
        events: EventSender,
    ) -> Self {
        Self {
            guild_id,
            call,
            http,
            volume,
            events,
            current: SyncMutex::new(None),
        }
    }

    fn current(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }

    async fn play_mode(&self) -> Option<PlayMode> {
        let track = self.current()?;
        track.get_info().await.ok().map(|state| state.playing)
    }
}

#[async_trait]
impl VoiceSink for SongbirdSink {
    async fn play(&self, stream_url: &str, ticket: PlaybackTicket) -> Result<()> {
        let input = HttpRequest::new(self.http.clone(), stream_url.to_string());

        let track = {
            let mut call = self.call.lock().await;
            call.play_only_input(input.into())
        };

        track.set_volume(self.volume)?;

        let notifier = TrackEndNotifier {
            guild_id: self.guild_id,
            ticket,
            events: self.events.clone(),
        };
        track.add_event(Event::Track(TrackEvent::End), notifier.clone())?;
        track.add_event(Event::Track(TrackEvent::Error), notifier)?;

        *self.current.lock() = Some(track);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        if let Some(track) = self.current() {
            track.pause()?;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        if let Some(track) = self.current() {
            track.play()?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(track) = self.current() {
            // Already-finished tracks refuse further commands.
            if let Err(e) = track.stop() {
                debug!("stop on finished track in guild {}: {:?}", self.guild_id, e);
            }
        }
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Pause))
    }
}

/// Forwards songbird's end/error events for one track to the dispatcher.
#[derive(Clone)]
struct TrackEndNotifier {
    guild_id: GuildId,
    ticket: PlaybackTicket,
    events: EventSender,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut failure = None;
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    failure = Some(format!("{:?}", e));
                }
            }
        }

        let event = match failure {
            Some(reason) => PlaybackEvent::Failed {
                guild_id: self.guild_id,
                ticket: self.ticket,
                reason,
            },
            None => PlaybackEvent::Finished {
                guild_id: self.guild_id,
                ticket: self.ticket,
            },
        };

        if self.events.send(event).is_err() {
            warn!("Playback dispatcher is gone, dropping event for guild {}", self.guild_id);
        }

        None
    }
}
