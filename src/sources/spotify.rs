use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

// Refresh a little before Spotify says the token expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

static TRACK_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?open\.spotify\.com/(?:intl-[A-Za-z-]+/)?track/([A-Za-z0-9]{22})")
        .expect("valid Spotify link regex")
});

static TRACK_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^spotify:track:([A-Za-z0-9]{22})$").expect("valid Spotify URI regex")
});

/// Minimal Spotify Web API client (client-credentials flow).
///
/// Only used to turn a track link into a `"<name> <artist>"` search query;
/// Spotify itself never serves audio.
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            client_id,
            client_secret,
            token: Mutex::new(None),
        })
    }

    pub fn is_spotify_reference(reference: &str) -> bool {
        reference.contains("spotify.com") || reference.starts_with("spotify:")
    }

    /// Extracts the 22-character track id from a link or `spotify:track:` URI.
    pub fn extract_track_id(reference: &str) -> Option<String> {
        let reference = reference.trim();
        TRACK_LINK
            .captures(reference)
            .or_else(|| TRACK_URI.captures(reference))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Looks the track up and returns the query used to find it on YouTube.
    pub async fn search_query(&self, track_id: &str) -> Result<String> {
        let token = self.access_token().await?;

        let track: SpotifyTrack = self
            .http
            .get(format!("{}/tracks/{}", API_BASE, track_id))
            .bearer_auth(token)
            .send()
            .await
            .context("Spotify request failed")?
            .error_for_status()
            .context("Spotify rejected the track lookup")?
            .json()
            .await
            .context("unexpected Spotify track payload")?;

        Ok(build_query(&track))
    }

    async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;

        if let Some(current) = token.as_ref() {
            if Instant::now() < current.expires_at {
                return Ok(current.value.clone());
            }
            debug!("Spotify token expired, refreshing");
        }

        let response: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("Spotify token request failed")?
            .error_for_status()
            .context("Spotify rejected the client credentials")?
            .json()
            .await
            .context("unexpected Spotify token payload")?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        info!("🔑 Spotify token refreshed (valid {}s)", lifetime.as_secs());

        let value = response.access_token.clone();
        *token = Some(AccessToken {
            value: response.access_token,
            expires_at: Instant::now() + lifetime,
        });

        Ok(value)
    }
}

fn build_query(track: &SpotifyTrack) -> String {
    match track.artists.first() {
        Some(artist) => format!("{} {}", track.name, artist.name),
        None => track.name.clone(),
    }
}
