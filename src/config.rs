use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // register commands in this guild only

    // Spotify (optional)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // yt-dlp
    pub ytdlp_path: String,
    pub max_concurrent_extractions: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_BOT_TOKEN")
                .or_else(|_| std::env::var("DISCORD_TOKEN"))
                .context("DISCORD_BOT_TOKEN is not set")?,
            guild_id: non_empty_var("GUILD_ID").map(|s| s.parse()).transpose()?,

            // Spotify
            spotify_client_id: non_empty_var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: non_empty_var("SPOTIFY_CLIENT_SECRET"),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()
                .context("DEFAULT_VOLUME must be a number")?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .context("MAX_QUEUE_SIZE must be a positive integer")?,

            // yt-dlp
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            max_concurrent_extractions: std::env::var("MAX_CONCURRENT_EXTRACTIONS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("MAX_CONCURRENT_EXTRACTIONS must be a positive integer")?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Token must not be empty
    /// - Volume must be between 0.0 and 2.0
    /// - Queue size and extraction concurrency must be > 0
    /// - Spotify credentials come in pairs
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("Discord token must not be empty");
        }

        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_concurrent_extractions == 0 {
            anyhow::bail!("Max concurrent extractions must be greater than 0");
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Never includes the token or the Spotify secret.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Spotify: {}\n  \
            Audio: {}% vol, {} max queued\n  \
            yt-dlp: {} ({} concurrent)",
            self.guild_id.map_or("global".to_string(), |id| format!("in guild {}", id)),
            if self.spotify_client_id.is_some() { "enabled" } else { "disabled" },
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.ytdlp_path,
            self.max_concurrent_extractions
        )
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            spotify_client_id: None,
            spotify_client_secret: None,

            default_volume: 0.5,
            max_queue_size: 500,

            ytdlp_path: "yt-dlp".to_string(),
            max_concurrent_extractions: 3,
        }
    }
}
