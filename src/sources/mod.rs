//! # Sources Module
//!
//! Turns whatever a user typed into `/play` into a playable [`Track`].
//!
//! - [`spotify`] looks up Spotify track links and builds a search query
//! - [`youtube`] runs `yt-dlp` to extract a direct audio stream URL
//!
//! [`SourceManager`] ties both together behind the [`TrackResolver`] trait,
//! which is what the audio layer depends on.

pub mod spotify;
pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;

pub use spotify::SpotifyClient;
pub use youtube::YouTubeClient;

pub const UNKNOWN_TITLE: &str = "Unknown title";
pub const UNKNOWN_ARTIST: &str = "Unknown artist";

/// A resolved, playable track. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    stream_url: String,
    title: String,
    artist: String,
}

impl Track {
    pub fn new(stream_url: impl Into<String>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            stream_url: stream_url.into(),
            title: title.into(),
            artist: artist.into(),
        }
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }
}

/// Anything able to turn a user reference into a [`Track`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<Track>;
}

/// What kind of reference the user handed us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Spotify track id
    Spotify(String),
    /// Any other http(s) link, passed to yt-dlp as-is
    Url(String),
    /// Free text
    Search(String),
}

impl Reference {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            anyhow::bail!("empty request");
        }

        if SpotifyClient::is_spotify_reference(input) {
            return SpotifyClient::extract_track_id(input)
                .map(Reference::Spotify)
                .ok_or_else(|| anyhow::anyhow!("only Spotify track links are supported"));
        }

        match Url::parse(input) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Reference::Url(input.to_string())),
            _ => Ok(Reference::Search(input.to_string())),
        }
    }
}

/// Resolver used in production: Spotify for metadata, yt-dlp for streams.
pub struct SourceManager {
    spotify: Option<SpotifyClient>,
    youtube: YouTubeClient,
}

impl SourceManager {
    pub fn new(config: &Config) -> Result<Self> {
        let spotify = match (&config.spotify_client_id, &config.spotify_client_secret) {
            (Some(id), Some(secret)) => Some(SpotifyClient::new(id.clone(), secret.clone())?),
            _ => {
                warn!("⚠️ Spotify credentials missing, Spotify links will not resolve");
                None
            }
        };

        Ok(Self {
            spotify,
            youtube: YouTubeClient::new(config.ytdlp_path.clone(), config.max_concurrent_extractions),
        })
    }

    /// Checks that the extractor binary can run.
    pub async fn verify_dependencies(&self) -> Result<()> {
        let version = self.youtube.version().await?;
        info!("✅ yt-dlp {}", version);
        Ok(())
    }
}

#[async_trait]
impl TrackResolver for SourceManager {
    async fn resolve(&self, reference: &str) -> Result<Track> {
        match Reference::parse(reference)? {
            Reference::Spotify(track_id) => {
                let spotify = self
                    .spotify
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("Spotify support is not configured"))?;
                let query = spotify.search_query(&track_id).await?;
                debug!("Spotify track {} -> '{}'", track_id, query);
                self.youtube.search(&query).await
            }
            Reference::Url(url) => self.youtube.extract(&url).await,
            Reference::Search(query) => self.youtube.search(&query).await,
        }
    }
}
