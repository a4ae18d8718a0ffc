use anyhow::Context;
use async_process::Command;
use regex::Regex;
use serde::Deserialize;
use std::{sync::LazyLock, time::Duration};
use tokio::time::timeout;
use tracing::{debug, info};
use url::Url;

use super::{Requester, Track, UNKNOWN_DURATION};
use crate::{cache::duration::format_duration, error::MusicError};

static VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([a-zA-Z0-9_-]{11})")
        .expect("regex de video ID válida")
});

/// Información extraída de `yt-dlp --dump-json`
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: String,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
    webpage_url: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

/// Cliente de búsqueda de metadata usando yt-dlp
pub struct YouTubeClient {
    program: String,
    search_timeout: Duration,
}

impl YouTubeClient {
    pub fn new(program: String, search_timeout: Duration) -> Self {
        Self {
            program,
            search_timeout,
        }
    }

    /// Busca el mejor resultado para `query` (texto libre o URL de YouTube).
    pub async fn search(&self, query: &str, requester: Requester) -> Result<Track, MusicError> {
        info!("🔍 Buscando en YouTube: {}", query);

        let target = if Self::is_youtube_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        };

        let output = timeout(self.search_timeout, self.dump_json(&target))
            .await
            .map_err(|_| MusicError::SearchTimeout)?
            .map_err(|e| MusicError::SearchFailed(e.to_string()))?;

        let info = output
            .lines()
            .find_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
            .ok_or_else(|| MusicError::NoResults(query.to_string()))?;

        debug!("📊 Resultado: {} ({})", info.title, info.id);
        Ok(into_track(info, requester).with_search_query(query))
    }

    async fn dump_json(&self, target: &str) -> anyhow::Result<String> {
        let output = Command::new(&self.program)
            .args([
                "--dump-json",
                "--no-playlist",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                target,
            ])
            // Si vence el timeout de búsqueda el proceso no queda vivo
            .kill_on_drop(true)
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Verifica si la URL es de YouTube
    pub fn is_youtube_url(url: &str) -> bool {
        let Ok(parsed) = Url::parse(url.trim()) else {
            return false;
        };
        matches!(parsed.scheme(), "http" | "https")
            && parsed.host_str().is_some_and(|host| {
                host == "youtu.be" || host == "youtube.com" || host.ends_with(".youtube.com")
            })
    }

    /// Verifica que el binario responda a `--version`
    pub async fn verify(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.program).arg("--version").output().await?;
        if !output.status.success() {
            anyhow::bail!("{} no puede ejecutarse correctamente", self.program);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Extrae el video ID de una URL de YouTube
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn into_track(info: YtDlpInfo, requester: Requester) -> Track {
    let url = info
        .webpage_url
        .filter(|u| u.starts_with("http"))
        .or(info.url.filter(|u| u.starts_with("http")))
        .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", info.id));

    let duration = info
        .duration
        .filter(|d| *d > 0.0)
        .map(|d| format_duration(d as u64))
        .unwrap_or_else(|| UNKNOWN_DURATION.to_string());

    let thumbnail = info
        .thumbnail
        .or_else(|| info.thumbnails.into_iter().last().map(|t| t.url));

    let mut track = Track::new(info.title, url, requester).with_duration(duration);
    if let Some(thumbnail) = thumbnail {
        track = track.with_thumbnail(thumbnail);
    }
    track
}
