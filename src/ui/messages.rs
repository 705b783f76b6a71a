//! Text of every reply the bot sends.

use crate::{
    audio::{
        player::{PlayOutcome, SkipOutcome},
        queue::QueueSnapshot,
        PlayerError,
    },
    sources::Track,
};

/// Discord rejects messages longer than this.
const MESSAGE_LIMIT: usize = 2000;

/// How many pending tracks `/queue` lists before summarizing.
const MAX_LISTED: usize = 15;

/// Longest title or artist shown, in characters.
const MAX_FIELD_LEN: usize = 200;

pub const NOT_IN_GUILD: &str = "❌ This command only works in a server.";
pub const NOT_IN_VOICE: &str = "❌ You need to be in a voice channel!";
pub const JOIN_FAILED: &str = "❌ I couldn't join your voice channel.";
pub const UNKNOWN_COMMAND: &str = "❌ Unknown command.";
pub const PAUSED: &str = "⏸️ Music paused.";
pub const RESUMED: &str = "▶️ Music resumed.";

pub fn play_outcome(outcome: &PlayOutcome) -> String {
    match outcome {
        PlayOutcome::Started(track) => format!("🎶 Now playing: {}", describe(track)),
        PlayOutcome::Queued { track, position } => {
            format!("🎵 {} added to the queue (#{}).", describe(track), position)
        }
    }
}

pub fn skipped(outcome: &SkipOutcome) -> String {
    let skipped = match &outcome.skipped {
        Some(track) => format!("⏭️ Skipped {}.", describe(track)),
        None => "⏭️ Skipped.".to_string(),
    };

    match &outcome.next {
        Some(next) => format!("{}\nUp next: {}", skipped, describe(next)),
        None => format!("{}\n📜 No more music in the queue.", skipped),
    }
}

pub fn cleared(removed: usize) -> String {
    match removed {
        0 => "🗑️ The queue was already empty.".to_string(),
        1 => "🗑️ Queue cleared (1 track removed).".to_string(),
        n => format!("🗑️ Queue cleared ({} tracks removed).", n),
    }
}

pub fn error(err: &PlayerError) -> String {
    format!("❌ {}", err)
}

pub fn queue(snapshot: &QueueSnapshot) -> String {
    let mut message = match &snapshot.now_playing {
        Some(track) => format!("🎶 **Now playing:**\n{} - {}", field(track.title()), field(track.artist())),
        None => "🎶 Nothing is playing.".to_string(),
    };

    if snapshot.pending.is_empty() {
        message.push_str("\n📜 No music waiting.");
        return message;
    }

    message.push_str("\n📜 **Up next:**");
    let mut listed = 0;
    for (i, track) in snapshot.pending.iter().enumerate().take(MAX_LISTED) {
        let line = format!("\n{}. {} - {}", i + 1, field(track.title()), field(track.artist()));
        // leave room for the "...and N more" line
        if message.len() + line.len() > MESSAGE_LIMIT - 40 {
            break;
        }
        message.push_str(&line);
        listed += 1;
    }

    let remaining = snapshot.pending.len() - listed;
    if remaining > 0 {
        message.push_str(&format!("\n…and {} more", remaining));
    }

    message
}

fn describe(track: &Track) -> String {
    format!("**{}** by **{}**", field(track.title()), field(track.artist()))
}

/// A title or artist, shortened and escaped for display.
fn field(text: &str) -> String {
    match text.char_indices().nth(MAX_FIELD_LEN) {
        Some((idx, _)) => format!("{}…", escape(&text[..idx])),
        None => escape(text),
    }
}

/// Escapes Discord markdown so titles can't break the formatting.
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '_' | '~' | '`' | '|' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
