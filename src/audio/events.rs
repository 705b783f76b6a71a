use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use super::{player::AudioPlayer, queue::PlaybackTicket};

/// Something a voice sink reports about a track it was given.
#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    /// The track reached its end or was stopped.
    Finished {
        guild_id: GuildId,
        ticket: PlaybackTicket,
    },
    /// The track could not be decoded or streamed.
    Failed {
        guild_id: GuildId,
        ticket: PlaybackTicket,
        reason: String,
    },
}

impl PlaybackEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            PlaybackEvent::Finished { guild_id, .. } | PlaybackEvent::Failed { guild_id, .. } => *guild_id,
        }
    }

    pub fn ticket(&self) -> PlaybackTicket {
        match self {
            PlaybackEvent::Finished { ticket, .. } | PlaybackEvent::Failed { ticket, .. } => *ticket,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<PlaybackEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<PlaybackEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Feeds every playback event into the player, one at a time.
///
/// Runs until all senders are dropped.
pub async fn dispatch(player: Arc<AudioPlayer>, mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        player.handle_event(event).await;
    }

    info!("🔚 Playback event dispatcher stopped");
}
