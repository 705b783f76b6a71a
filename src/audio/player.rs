use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::{future::Future, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    error::PlayerError,
    events::PlaybackEvent,
    queue::{GuildQueue, QueueSnapshot},
    sink::VoiceSink,
};
use crate::sources::{Track, TrackResolver};

// Longest resolver error shown back to the user.
const MAX_REASON_LEN: usize = 200;

/// Result of a play request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Started(Track),
    Queued { track: Track, position: usize },
}

/// Result of moving to the next track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Started(Track),
    Exhausted,
}

/// What a skip stopped and what will play after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipOutcome {
    pub skipped: Option<Track>,
    pub next: Option<Track>,
}

struct GuildSession {
    queue: GuildQueue,
    sink: Option<Arc<dyn VoiceSink>>,
}

/// Registry of per-guild playback queues.
///
/// Each guild's state sits behind its own async mutex which is held across
/// the whole "check sink, mutate queue, call sink" sequence, so two requests
/// for the same guild never interleave. Different guilds never block each
/// other.
pub struct AudioPlayer {
    sessions: DashMap<GuildId, Arc<Mutex<GuildSession>>>,
    max_queue_size: usize,
}

impl AudioPlayer {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_queue_size,
        }
    }

    /// Binds `sink` as the voice output for `guild_id` unless one is already
    /// attached. Returns whether `sink` was taken.
    pub async fn attach(&self, guild_id: GuildId, sink: Arc<dyn VoiceSink>) -> bool {
        let attached = self
            .ensure_sink(guild_id, || async move { Ok::<_, anyhow::Error>(sink) })
            .await;
        matches!(attached, Ok(true))
    }

    /// Runs `connect` and binds the sink it yields, but only when the guild
    /// has no voice output yet. The guild stays locked while connecting, so
    /// concurrent callers connect once. Returns whether a new sink was bound.
    pub async fn ensure_sink<F, Fut>(&self, guild_id: GuildId, connect: F) -> anyhow::Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Arc<dyn VoiceSink>>>,
    {
        let session = self.session(guild_id);
        let mut session = session.lock().await;
        if session.sink.is_some() {
            return Ok(false);
        }

        session.sink = Some(connect().await?);
        info!("🔊 Voice output attached for guild {}", guild_id);
        Ok(true)
    }

    /// Drops the voice output and everything queued for `guild_id`.
    pub async fn detach(&self, guild_id: GuildId) {
        let Some(session) = self.existing_session(guild_id) else {
            return;
        };
        let mut session = session.lock().await;

        if let Some(sink) = session.sink.take() {
            if let Err(e) = sink.stop().await {
                warn!("Error stopping playback in guild {}: {:?}", guild_id, e);
            }
        }
        session.queue.reset();
        info!("⏹️ Playback state reset for guild {}", guild_id);
    }

    /// Resolves `reference` and plays or queues the result.
    ///
    /// Resolution happens before the guild is locked; a failure leaves the
    /// guild untouched.
    pub async fn play_request(
        &self,
        guild_id: GuildId,
        resolver: &dyn TrackResolver,
        reference: &str,
    ) -> Result<PlayOutcome, PlayerError> {
        let track = resolver.resolve(reference).await.map_err(|e| {
            warn!("Could not resolve '{}' for guild {}: {:?}", reference, guild_id, e);
            PlayerError::Unresolvable(short_reason(&e))
        })?;

        self.enqueue_or_play(guild_id, track).await
    }

    /// Plays `track` right away when the guild is idle, otherwise appends it.
    pub async fn enqueue_or_play(&self, guild_id: GuildId, track: Track) -> Result<PlayOutcome, PlayerError> {
        let session = self.session(guild_id);
        let mut session = session.lock().await;
        let sink = session.sink.clone().ok_or(PlayerError::NotConnected)?;

        let busy = sink.is_playing().await || sink.is_paused().await || session.queue.has_pending();
        if busy {
            let position = session.queue.push(track.clone())?;
            return Ok(PlayOutcome::Queued { track, position });
        }

        let ticket = session.queue.start(track.clone());
        if let Err(e) = sink.play(track.stream_url(), ticket).await {
            session.queue.finish();
            return Err(PlayerError::Sink(e));
        }

        Ok(PlayOutcome::Started(track))
    }

    /// Starts the next pending track, or marks the guild idle.
    pub async fn advance(&self, guild_id: GuildId) -> Result<AdvanceOutcome, PlayerError> {
        let session = self.session(guild_id);
        let mut session = session.lock().await;
        Self::advance_locked(&mut session, guild_id).await
    }

    /// Single entry point for sink completion events.
    pub async fn handle_event(&self, event: PlaybackEvent) {
        let guild_id = event.guild_id();
        let Some(session) = self.existing_session(guild_id) else {
            return;
        };
        let mut session = session.lock().await;

        if !session.queue.is_current(event.ticket()) {
            debug!("Ignoring stale playback event for guild {}", guild_id);
            return;
        }

        if let PlaybackEvent::Failed { reason, .. } = &event {
            warn!("❌ Track failed in guild {}: {}", guild_id, reason);
        }

        match Self::advance_locked(&mut session, guild_id).await {
            Ok(AdvanceOutcome::Started(track)) => debug!("Advanced to '{}' in guild {}", track.title(), guild_id),
            Ok(AdvanceOutcome::Exhausted) => debug!("Nothing left to play in guild {}", guild_id),
            Err(e) => warn!("Could not advance guild {}: {}", guild_id, e),
        }
    }

    /// Stops the current track; its completion event moves the queue on.
    pub async fn skip(&self, guild_id: GuildId) -> Result<SkipOutcome, PlayerError> {
        let session = self.session(guild_id);
        let session = session.lock().await;
        let sink = session.sink.clone().ok_or(PlayerError::NotConnected)?;

        if !sink.is_playing().await && !sink.is_paused().await {
            return Err(PlayerError::NothingPlaying);
        }

        sink.stop().await.map_err(PlayerError::Sink)?;
        info!("⏭️ Skipped track in guild {}", guild_id);

        Ok(SkipOutcome {
            skipped: session.queue.now_playing().cloned(),
            next: session.queue.peek_next().cloned(),
        })
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<(), PlayerError> {
        let session = self.existing_session(guild_id).ok_or(PlayerError::NotConnected)?;
        let session = session.lock().await;
        let sink = session.sink.as_ref().ok_or(PlayerError::NotConnected)?;

        if !sink.is_playing().await {
            return Err(PlayerError::NothingPlaying);
        }
        sink.pause().await.map_err(PlayerError::Sink)?;
        info!("⏸️ Paused in guild {}", guild_id);
        Ok(())
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<(), PlayerError> {
        let session = self.existing_session(guild_id).ok_or(PlayerError::NotConnected)?;
        let session = session.lock().await;
        let sink = session.sink.as_ref().ok_or(PlayerError::NotConnected)?;

        if !sink.is_paused().await {
            return Err(PlayerError::NotPaused);
        }
        sink.resume().await.map_err(PlayerError::Sink)?;
        info!("▶️ Resumed in guild {}", guild_id);
        Ok(())
    }

    /// Empties the pending list; returns how many tracks were dropped.
    pub async fn clear(&self, guild_id: GuildId) -> usize {
        match self.existing_session(guild_id) {
            Some(session) => session.lock().await.queue.clear(),
            None => 0,
        }
    }

    pub async fn inspect(&self, guild_id: GuildId) -> QueueSnapshot {
        match self.existing_session(guild_id) {
            Some(session) => session.lock().await.queue.snapshot(),
            None => QueueSnapshot::default(),
        }
    }

    async fn advance_locked(session: &mut GuildSession, guild_id: GuildId) -> Result<AdvanceOutcome, PlayerError> {
        let Some(sink) = session.sink.clone() else {
            session.queue.finish();
            return Err(PlayerError::NotConnected);
        };

        // A track the sink refuses is dropped and the next one is tried.
        while let Some((track, ticket)) = session.queue.advance() {
            match sink.play(track.stream_url(), ticket).await {
                Ok(()) => return Ok(AdvanceOutcome::Started(track)),
                Err(e) => warn!("Skipping '{}' in guild {}: {:?}", track.title(), guild_id, e),
            }
        }

        session.queue.finish();
        Ok(AdvanceOutcome::Exhausted)
    }

    fn session(&self, guild_id: GuildId) -> Arc<Mutex<GuildSession>> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(GuildSession {
                    queue: GuildQueue::new(self.max_queue_size),
                    sink: None,
                }))
            })
            .clone()
    }

    fn existing_session(&self, guild_id: GuildId) -> Option<Arc<Mutex<GuildSession>>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }
}

fn short_reason(error: &anyhow::Error) -> String {
    let reason = error.to_string();
    let first_line = reason.lines().next().unwrap_or_default();
    match first_line.char_indices().nth(MAX_REASON_LEN) {
        Some((idx, _)) => format!("{}…", &first_line[..idx]),
        None => first_line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        events::{self, EventReceiver, EventSender},
        queue::PlaybackTicket,
        sink::MockVoiceSink,
    };
    use crate::sources::MockTrackResolver;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sink that records what it was asked to play and reports completions
    /// the way songbird does, through the event channel.
    struct RecordingSink {
        guild_id: GuildId,
        events: EventSender,
        // yield to the scheduler inside state queries and play
        yielding: bool,
        refused: Option<&'static str>,
        state: parking_lot::Mutex<RecordingState>,
    }

    #[derive(Default)]
    struct RecordingState {
        current: Option<PlaybackTicket>,
        paused: bool,
        played: Vec<String>,
        tickets: Vec<PlaybackTicket>,
    }

    impl RecordingSink {
        fn new(guild_id: GuildId, events: EventSender) -> Arc<Self> {
            Self::build(guild_id, events, false, None)
        }

        fn yielding(guild_id: GuildId, events: EventSender) -> Arc<Self> {
            Self::build(guild_id, events, true, None)
        }

        /// Sink that fails to start `refused`.
        fn refusing(guild_id: GuildId, events: EventSender, refused: &'static str) -> Arc<Self> {
            Self::build(guild_id, events, false, Some(refused))
        }

        fn build(guild_id: GuildId, events: EventSender, yielding: bool, refused: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                guild_id,
                events,
                yielding,
                refused,
                state: parking_lot::Mutex::new(RecordingState::default()),
            })
        }

        async fn maybe_yield(&self) {
            if self.yielding {
                tokio::task::yield_now().await;
            }
        }

        fn played(&self) -> Vec<String> {
            self.state.lock().played.clone()
        }

        fn tickets(&self) -> Vec<PlaybackTicket> {
            self.state.lock().tickets.clone()
        }

        /// Simulates the current track reaching its natural end.
        fn finish_current(&self) {
            if let Some(ticket) = self.state.lock().current.take() {
                let _ = self.events.send(PlaybackEvent::Finished {
                    guild_id: self.guild_id,
                    ticket,
                });
            }
        }
    }

    #[async_trait]
    impl VoiceSink for RecordingSink {
        async fn play(&self, stream_url: &str, ticket: PlaybackTicket) -> anyhow::Result<()> {
            self.maybe_yield().await;
            if self.refused == Some(stream_url) {
                anyhow::bail!("unsupported stream");
            }

            let mut state = self.state.lock();
            state.current = Some(ticket);
            state.paused = false;
            state.played.push(stream_url.to_string());
            state.tickets.push(ticket);
            Ok(())
        }

        async fn pause(&self) -> anyhow::Result<()> {
            self.state.lock().paused = true;
            Ok(())
        }

        async fn resume(&self) -> anyhow::Result<()> {
            self.state.lock().paused = false;
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.finish_current();
            Ok(())
        }

        async fn is_playing(&self) -> bool {
            self.maybe_yield().await;
            let state = self.state.lock();
            state.current.is_some() && !state.paused
        }

        async fn is_paused(&self) -> bool {
            let state = self.state.lock();
            state.current.is_some() && state.paused
        }
    }

    fn guild() -> GuildId {
        GuildId::new(42)
    }

    fn track(name: &str) -> Track {
        Track::new(format!("https://stream/{}", name), name, "Artist")
    }

    async fn setup() -> (AudioPlayer, Arc<RecordingSink>, EventReceiver) {
        let (tx, rx) = events::channel();
        let player = AudioPlayer::new(100);
        let sink = RecordingSink::new(guild(), tx);
        player.attach(guild(), sink.clone()).await;
        (player, sink, rx)
    }

    async fn drain(player: &AudioPlayer, rx: &mut EventReceiver) {
        while let Ok(event) = rx.try_recv() {
            player.handle_event(event).await;
        }
    }

    #[tokio::test]
    async fn idle_guild_starts_playing_immediately() {
        let (player, sink, _rx) = setup().await;

        let outcome = player.enqueue_or_play(guild(), track("a")).await.unwrap();

        assert_eq!(outcome, PlayOutcome::Started(track("a")));
        assert_eq!(
            player.inspect(guild()).await,
            QueueSnapshot {
                now_playing: Some(track("a")),
                pending: vec![],
            }
        );
        assert_eq!(sink.played(), vec!["https://stream/a"]);
    }

    #[tokio::test]
    async fn busy_guild_queues_without_touching_now_playing() {
        let (player, sink, _rx) = setup().await;
        player.enqueue_or_play(guild(), track("a")).await.unwrap();

        let outcome = player.enqueue_or_play(guild(), track("b")).await.unwrap();

        assert_eq!(
            outcome,
            PlayOutcome::Queued {
                track: track("b"),
                position: 1,
            }
        );
        let snapshot = player.inspect(guild()).await;
        assert_eq!(snapshot.now_playing, Some(track("a")));
        assert_eq!(snapshot.pending, vec![track("b")]);
        assert_eq!(sink.played().len(), 1);
    }

    #[tokio::test]
    async fn paused_guild_counts_as_busy() {
        let (player, _sink, _rx) = setup().await;
        player.enqueue_or_play(guild(), track("a")).await.unwrap();
        player.pause(guild()).await.unwrap();

        let outcome = player.enqueue_or_play(guild(), track("b")).await.unwrap();
        assert!(matches!(outcome, PlayOutcome::Queued { position: 1, .. }));
    }

    #[tokio::test]
    async fn advancing_plays_tracks_in_order_then_goes_idle() {
        let (player, sink, _rx) = setup().await;
        for name in ["a", "b", "c"] {
            player.enqueue_or_play(guild(), track(name)).await.unwrap();
        }

        assert_eq!(player.advance(guild()).await.unwrap(), AdvanceOutcome::Started(track("b")));
        assert_eq!(player.advance(guild()).await.unwrap(), AdvanceOutcome::Started(track("c")));
        assert_eq!(
            player.inspect(guild()).await,
            QueueSnapshot {
                now_playing: Some(track("c")),
                pending: vec![],
            }
        );

        assert_eq!(player.advance(guild()).await.unwrap(), AdvanceOutcome::Exhausted);
        assert_eq!(player.inspect(guild()).await.now_playing, None);
        assert_eq!(
            sink.played(),
            vec!["https://stream/a", "https://stream/b", "https://stream/c"]
        );
    }

    #[tokio::test]
    async fn advance_on_empty_queue_stays_idle() {
        let (player, sink, _rx) = setup().await;

        for _ in 0..3 {
            assert_eq!(player.advance(guild()).await.unwrap(), AdvanceOutcome::Exhausted);
            assert_eq!(player.inspect(guild()).await, QueueSnapshot::default());
        }
        assert!(sink.played().is_empty());
    }

    #[tokio::test]
    async fn finished_events_drive_the_queue() {
        let (player, sink, mut rx) = setup().await;
        for name in ["a", "b"] {
            player.enqueue_or_play(guild(), track(name)).await.unwrap();
        }

        sink.finish_current();
        drain(&player, &mut rx).await;
        assert_eq!(player.inspect(guild()).await.now_playing, Some(track("b")));

        sink.finish_current();
        drain(&player, &mut rx).await;
        assert_eq!(player.inspect(guild()).await, QueueSnapshot::default());
    }

    #[tokio::test]
    async fn skip_stops_current_and_event_advances() {
        let (player, sink, mut rx) = setup().await;
        for name in ["x", "y", "z"] {
            player.enqueue_or_play(guild(), track(name)).await.unwrap();
        }

        let outcome = player.skip(guild()).await.unwrap();
        assert_eq!(
            outcome,
            SkipOutcome {
                skipped: Some(track("x")),
                next: Some(track("y")),
            }
        );

        drain(&player, &mut rx).await;
        assert_eq!(
            player.inspect(guild()).await,
            QueueSnapshot {
                now_playing: Some(track("y")),
                pending: vec![track("z")],
            }
        );
        assert_eq!(sink.played(), vec!["https://stream/x", "https://stream/y"]);
    }

    #[tokio::test]
    async fn skip_last_track_reports_exhaustion() {
        let (player, _sink, mut rx) = setup().await;
        player.enqueue_or_play(guild(), track("x")).await.unwrap();

        let outcome = player.skip(guild()).await.unwrap();
        assert_eq!(outcome.next, None);

        drain(&player, &mut rx).await;
        assert_eq!(player.inspect(guild()).await.now_playing, None);
    }

    #[tokio::test]
    async fn skip_with_nothing_playing_fails() {
        let (player, _sink, _rx) = setup().await;
        assert!(matches!(player.skip(guild()).await, Err(PlayerError::NothingPlaying)));
    }

    #[tokio::test]
    async fn stale_events_are_ignored() {
        let (player, sink, _rx) = setup().await;
        player.enqueue_or_play(guild(), track("a")).await.unwrap();
        player.enqueue_or_play(guild(), track("b")).await.unwrap();
        player.enqueue_or_play(guild(), track("c")).await.unwrap();
        player.advance(guild()).await.unwrap();

        // "a" ends only after "b" already took over
        let first = sink.tickets()[0];
        player
            .handle_event(PlaybackEvent::Finished {
                guild_id: guild(),
                ticket: first,
            })
            .await;

        let snapshot = player.inspect(guild()).await;
        assert_eq!(snapshot.now_playing, Some(track("b")));
        assert_eq!(snapshot.pending, vec![track("c")]);
    }

    #[tokio::test]
    async fn clear_only_drops_pending() {
        let (player, sink, _rx) = setup().await;
        for name in ["x", "y", "z"] {
            player.enqueue_or_play(guild(), track(name)).await.unwrap();
        }

        assert_eq!(player.clear(guild()).await, 2);
        assert_eq!(
            player.inspect(guild()).await,
            QueueSnapshot {
                now_playing: Some(track("x")),
                pending: vec![],
            }
        );
        assert!(sink.is_playing().await);
    }

    #[tokio::test]
    async fn pause_and_resume_check_sink_state() {
        let (player, _sink, _rx) = setup().await;
        assert!(matches!(player.pause(guild()).await, Err(PlayerError::NothingPlaying)));

        player.enqueue_or_play(guild(), track("a")).await.unwrap();
        assert!(matches!(player.resume(guild()).await, Err(PlayerError::NotPaused)));
        player.pause(guild()).await.unwrap();
        player.resume(guild()).await.unwrap();
    }

    #[tokio::test]
    async fn detach_resets_guild() {
        let (player, _sink, mut rx) = setup().await;
        player.enqueue_or_play(guild(), track("a")).await.unwrap();
        player.enqueue_or_play(guild(), track("b")).await.unwrap();

        player.detach(guild()).await;
        drain(&player, &mut rx).await;

        assert_eq!(player.inspect(guild()).await, QueueSnapshot::default());
        assert!(matches!(
            player.enqueue_or_play(guild(), track("c")).await,
            Err(PlayerError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn unresolvable_request_leaves_guild_untouched() {
        let player = AudioPlayer::new(100);
        let mut sink = MockVoiceSink::new();
        sink.expect_play().never();
        player.attach(guild(), Arc::new(sink)).await;

        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .returning(|_| Err(anyhow::anyhow!("yt-dlp error: video unavailable")));

        let result = player.play_request(guild(), &resolver, "https://youtu.be/gone").await;

        match result {
            Err(PlayerError::Unresolvable(reason)) => assert_eq!(reason, "yt-dlp error: video unavailable"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(player.inspect(guild()).await, QueueSnapshot::default());
    }

    #[tokio::test]
    async fn resolved_request_reaches_the_sink() {
        let player = AudioPlayer::new(100);
        let mut sink = MockVoiceSink::new();
        sink.expect_is_playing().returning(|| false);
        sink.expect_is_paused().returning(|| false);
        sink.expect_play()
            .withf(|url, _| url.to_string() == "https://stream/a")
            .times(1)
            .returning(|_, _| Ok(()));
        player.attach(guild(), Arc::new(sink)).await;

        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().returning(|_| Ok(track("a")));

        let outcome = player.play_request(guild(), &resolver, "a").await.unwrap();
        assert_eq!(outcome, PlayOutcome::Started(track("a")));
    }

    #[tokio::test]
    async fn refused_track_is_not_left_as_now_playing() {
        let player = AudioPlayer::new(100);
        let mut sink = MockVoiceSink::new();
        sink.expect_is_playing().returning(|| false);
        sink.expect_is_paused().returning(|| false);
        sink.expect_play()
            .returning(|_, _| Err(anyhow::anyhow!("driver gone")));
        player.attach(guild(), Arc::new(sink)).await;

        let result = player.enqueue_or_play(guild(), track("a")).await;

        assert!(matches!(result, Err(PlayerError::Sink(_))));
        assert_eq!(player.inspect(guild()).await.now_playing, None);
    }

    #[tokio::test]
    async fn full_queue_is_rejected() {
        let (tx, _rx) = events::channel();
        let player = AudioPlayer::new(1);
        player.attach(guild(), RecordingSink::new(guild(), tx)).await;

        player.enqueue_or_play(guild(), track("a")).await.unwrap();
        player.enqueue_or_play(guild(), track("b")).await.unwrap();
        assert!(matches!(
            player.enqueue_or_play(guild(), track("c")).await,
            Err(PlayerError::QueueFull { max: 1 })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn simultaneous_plays_start_only_one_track() {
        let (tx, _rx) = events::channel();
        let player = AudioPlayer::new(100);
        let sink = RecordingSink::yielding(guild(), tx);
        player.attach(guild(), sink.clone()).await;

        let (first, second) = tokio::join!(
            player.enqueue_or_play(guild(), track("a")),
            player.enqueue_or_play(guild(), track("b")),
        );

        let outcomes = [first.unwrap(), second.unwrap()];
        let started = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, PlayOutcome::Started(_)))
            .count();
        let queued = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, PlayOutcome::Queued { position: 1, .. }))
            .count();
        assert_eq!((started, queued), (1, 1));
        assert_eq!(sink.played().len(), 1);
        assert_eq!(player.inspect(guild()).await.pending.len(), 1);
    }

    #[tokio::test]
    async fn failed_event_advances_like_a_finish() {
        let (player, sink, _rx) = setup().await;
        player.enqueue_or_play(guild(), track("x")).await.unwrap();
        player.enqueue_or_play(guild(), track("y")).await.unwrap();

        player
            .handle_event(PlaybackEvent::Failed {
                guild_id: guild(),
                ticket: sink.tickets()[0],
                reason: "decoder error".to_string(),
            })
            .await;

        assert_eq!(
            player.inspect(guild()).await,
            QueueSnapshot {
                now_playing: Some(track("y")),
                pending: vec![],
            }
        );
        assert_eq!(sink.played(), vec!["https://stream/x", "https://stream/y"]);
    }

    #[tokio::test]
    async fn advance_skips_tracks_the_sink_refuses() {
        let (tx, _rx) = events::channel();
        let player = AudioPlayer::new(100);
        let sink = RecordingSink::refusing(guild(), tx, "https://stream/y");
        player.attach(guild(), sink.clone()).await;
        for name in ["x", "y", "z"] {
            player.enqueue_or_play(guild(), track(name)).await.unwrap();
        }

        assert_eq!(player.advance(guild()).await.unwrap(), AdvanceOutcome::Started(track("z")));
        assert_eq!(
            player.inspect(guild()).await,
            QueueSnapshot {
                now_playing: Some(track("z")),
                pending: vec![],
            }
        );
        assert_eq!(sink.played(), vec!["https://stream/x", "https://stream/z"]);
    }

    #[tokio::test]
    async fn attach_keeps_a_live_sink() {
        let (player, sink, _rx) = setup().await;
        player.enqueue_or_play(guild(), track("a")).await.unwrap();

        let mut replacement = MockVoiceSink::new();
        replacement.expect_play().never();
        assert!(!player.attach(guild(), Arc::new(replacement)).await);

        let outcome = player.enqueue_or_play(guild(), track("b")).await.unwrap();
        assert!(matches!(outcome, PlayOutcome::Queued { position: 1, .. }));
        assert_eq!(sink.played(), vec!["https://stream/a"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_connects_join_once() {
        let (tx, _rx) = events::channel();
        let player = AudioPlayer::new(100);
        let counter = AtomicUsize::new(0);
        let (connects, tx) = (&counter, &tx);
        let connect = move || async move {
            connects.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok::<Arc<dyn VoiceSink>, anyhow::Error>(RecordingSink::new(guild(), tx.clone()))
        };

        let (first, second) = tokio::join!(
            player.ensure_sink(guild(), connect),
            player.ensure_sink(guild(), connect),
        );

        let mut bound = [first.unwrap(), second.unwrap()];
        bound.sort();
        assert_eq!(bound, [false, true]);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_connect_leaves_guild_detached() {
        let player = AudioPlayer::new(100);

        let result = player
            .ensure_sink(guild(), || async {
                Err::<Arc<dyn VoiceSink>, _>(anyhow::anyhow!("missing permissions"))
            })
            .await;

        assert!(result.is_err());
        assert!(matches!(
            player.enqueue_or_play(guild(), track("a")).await,
            Err(PlayerError::NotConnected)
        ));
    }

    #[test]
    fn long_reasons_are_shortened() {
        let error = anyhow::anyhow!("{}\nsecond line", "x".repeat(500));
        let reason = short_reason(&error);
        assert_eq!(reason.chars().count(), MAX_REASON_LEN + 1);
        assert!(!reason.contains("second line"));
    }
}
