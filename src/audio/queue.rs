use std::collections::VecDeque;
use tracing::{debug, info};

use super::error::PlayerError;
use crate::sources::Track;

/// Identifies one hand-off of a track to the voice sink.
///
/// Completion events carry the ticket of the track they belong to, so an
/// event that arrives after its track was already replaced can be told apart
/// from the end of the track currently playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PlaybackTicket(u64);

impl PlaybackTicket {
    fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Per-guild queue state: the current track plus what is waiting.
#[derive(Debug)]
pub struct GuildQueue {
    now_playing: Option<Track>,
    pending: VecDeque<Track>,
    ticket: PlaybackTicket,
    max_size: usize,
}

impl GuildQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            now_playing: None,
            pending: VecDeque::new(),
            ticket: PlaybackTicket::default(),
            max_size,
        }
    }

    pub fn now_playing(&self) -> Option<&Track> {
        self.now_playing.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn peek_next(&self) -> Option<&Track> {
        self.pending.front()
    }

    /// Whether `ticket` belongs to the most recently started track.
    pub fn is_current(&self, ticket: PlaybackTicket) -> bool {
        self.ticket == ticket
    }

    /// Marks `track` as playing and returns the ticket for its hand-off.
    pub fn start(&mut self, track: Track) -> PlaybackTicket {
        self.ticket = self.ticket.next();
        info!("▶️ Now playing: {}", track.title());
        self.now_playing = Some(track);
        self.ticket
    }

    /// Appends to the pending list; returns the 1-based position.
    pub fn push(&mut self, track: Track) -> Result<usize, PlayerError> {
        if self.pending.len() >= self.max_size {
            return Err(PlayerError::QueueFull { max: self.max_size });
        }

        info!("➕ Queued: {}", track.title());
        self.pending.push_back(track);
        Ok(self.pending.len())
    }

    /// Moves the head of the pending list to `now_playing`.
    ///
    /// Returns `None` and clears `now_playing` when nothing is left.
    pub fn advance(&mut self) -> Option<(Track, PlaybackTicket)> {
        match self.pending.pop_front() {
            Some(track) => {
                let ticket = self.start(track.clone());
                Some((track, ticket))
            }
            None => {
                if self.now_playing.take().is_some() {
                    info!("📭 Queue exhausted");
                }
                None
            }
        }
    }

    /// Forgets the current track without touching the pending list.
    pub fn finish(&mut self) {
        self.now_playing = None;
    }

    /// Drops every pending track; `now_playing` is left alone.
    pub fn clear(&mut self) -> usize {
        let removed = self.pending.len();
        self.pending.clear();
        debug!("🗑️ Cleared {} pending tracks", removed);
        removed
    }

    /// Back to an empty queue. The ticket keeps counting so events from
    /// before the reset stay stale.
    pub fn reset(&mut self) {
        self.now_playing = None;
        self.pending.clear();
        self.ticket = self.ticket.next();
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            now_playing: self.now_playing.clone(),
            pending: self.pending.iter().cloned().collect(),
        }
    }
}

/// Read-only copy of a guild's queue, for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub now_playing: Option<Track>,
    pub pending: Vec<Track>,
}
