use thiserror::Error;

/// Errors surfaced by queue operations. The `Display` text is what the user
/// sees in the reply.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("I'm not connected to a voice channel in this server.")]
    NotConnected,

    #[error("Nothing is playing right now.")]
    NothingPlaying,

    #[error("Playback isn't paused.")]
    NotPaused,

    #[error("The queue is full ({max} tracks).")]
    QueueFull { max: usize },

    #[error("Couldn't get that track: {0}")]
    Unresolvable(String),

    #[error("Playback failed: {0}")]
    Sink(anyhow::Error),
}
