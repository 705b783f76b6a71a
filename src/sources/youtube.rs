use anyhow::{Context, Result};
use async_process::Command;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::{Track, UNKNOWN_ARTIST, UNKNOWN_TITLE};

/// Extracts audio stream URLs through `yt-dlp`.
pub struct YouTubeClient {
    binary: String,
    // caps concurrent yt-dlp processes
    rate_limiter: Semaphore,
}

/// Subset of `yt-dlp --dump-single-json` we care about.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    url: Option<String>,
    title: Option<String>,
    uploader: Option<String>,
    entries: Option<Vec<YtDlpInfo>>,
}

impl YouTubeClient {
    pub fn new(binary: impl Into<String>, max_concurrent: usize) -> Self {
        Self {
            binary: binary.into(),
            rate_limiter: Semaphore::new(max_concurrent.max(1)),
        }
    }

    /// Searches YouTube and returns the first result.
    pub async fn search(&self, query: &str) -> Result<Track> {
        info!("🔍 Searching YouTube: {}", query);
        self.extract(&format!("ytsearch1:{}", query)).await
    }

    /// Runs yt-dlp on a URL (or `ytsearch` target) and returns the best audio stream.
    pub async fn extract(&self, target: &str) -> Result<Track> {
        let _permit = self.rate_limiter.acquire().await?;

        debug!("📊 Extracting: {}", target);

        let output = Command::new(&self.binary)
            .args([
                "-f",
                "bestaudio/best",
                "--no-playlist",
                "--dump-single-json",
                "--no-warnings",
                "--quiet",
                target,
            ])
            .output()
            .await
            .context("failed to run yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        let track = parse_info(&String::from_utf8_lossy(&output.stdout))?;
        info!("🎵 Resolved: {} - {}", track.title(), track.artist());
        Ok(track)
    }

    pub async fn version(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.binary))?;

        if !output.status.success() {
            anyhow::bail!("{} --version exited with {}", self.binary, output.status);
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Picks the first entry of a search result, or the top-level info for a
/// direct link.
fn parse_info(json: &str) -> Result<Track> {
    let info: YtDlpInfo = serde_json::from_str(json).context("failed to parse yt-dlp output")?;

    let info = match info.entries {
        Some(entries) => entries
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no results found"))?,
        None => info,
    };

    let stream_url = info
        .url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| anyhow::anyhow!("no playable audio stream"))?;

    Ok(Track::new(
        stream_url,
        info.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        info.uploader.unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
    ))
}
