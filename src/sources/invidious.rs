use async_trait::async_trait;
use serde::Deserialize;
use songbird::input::{HttpRequest, Input};
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use tracing::{info, warn};

use super::{StreamProvider, Track};
use crate::error::SourceError;

/// Instancias públicas usadas cuando no se configura ninguna
pub const DEFAULT_INSTANCES: &[&str] = &[
    "https://yewtu.be",
    "https://inv.nadeko.net",
    "https://invidious.nerdvpn.de",
    "https://invidious.protokolla.fi",
    "https://invidious.privacydev.net",
];

/// Intentos (instancias distintas) por resolución
const ATTEMPTS_PER_RESOLVE: usize = 3;

/// Fuente secundaria: URL de audio directa desde la API de Invidious
pub struct InvidiousClient {
    client: reqwest::Client,
    instances: Vec<String>,
    current_instance: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct InvidiousVideo {
    #[serde(rename = "adaptiveFormats", default)]
    adaptive_formats: Vec<MediaFormat>,
    #[serde(rename = "formatStreams", default)]
    format_streams: Vec<MediaFormat>,
}

#[derive(Debug, Deserialize)]
struct MediaFormat {
    url: String,
    #[serde(rename = "type")]
    format_type: String,
}

impl InvidiousClient {
    pub fn new(client: reqwest::Client, instances: Vec<String>) -> Self {
        Self {
            client,
            instances,
            current_instance: AtomicUsize::new(0),
        }
    }

    /// Obtiene la siguiente instancia de Invidious (round-robin)
    fn next_instance(&self) -> Option<&str> {
        if self.instances.is_empty() {
            return None;
        }
        let current = self.current_instance.fetch_add(1, Ordering::SeqCst);
        Some(self.instances[current % self.instances.len()].as_str())
    }

    /// Obtiene la URL de audio directo del video
    pub async fn get_audio_url(&self, video_id: &str) -> Result<String, SourceError> {
        let mut last_error = String::from("sin instancias configuradas");

        for _ in 0..ATTEMPTS_PER_RESOLVE.min(self.instances.len()) {
            let Some(instance) = self.next_instance() else {
                break;
            };
            let url = format!(
                "{}/api/v1/videos/{}",
                instance,
                urlencoding::encode(video_id)
            );

            match self.fetch_video(&url).await {
                Ok(video) => match pick_audio_format(video) {
                    Some(audio_url) => {
                        info!("✅ Audio directo obtenido de {}", instance);
                        return Ok(audio_url);
                    }
                    None => last_error = format!("{}: sin formato de audio", instance),
                },
                Err(e) => {
                    warn!("❌ Falló obtener info en {}: {}", instance, e);
                    last_error = format!("{}: {}", instance, e);
                }
            }
        }

        Err(SourceError::provider(self.name(), last_error))
    }

    async fn fetch_video(&self, url: &str) -> reqwest::Result<InvidiousVideo> {
        self.client
            .get(url)
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

/// Prefiere audio mp4 adaptativo; si no hay, cualquier stream con audio.
fn pick_audio_format(video: InvidiousVideo) -> Option<String> {
    let InvidiousVideo {
        adaptive_formats,
        format_streams,
    } = video;

    let (mp4_audio, other_audio): (Vec<_>, Vec<_>) = adaptive_formats
        .into_iter()
        .filter(|f| f.format_type.starts_with("audio/"))
        .partition(|f| f.format_type.contains("mp4"));

    mp4_audio
        .into_iter()
        .chain(other_audio)
        .chain(
            format_streams
                .into_iter()
                .filter(|f| f.format_type.contains("audio")),
        )
        .map(|f| f.url)
        .next()
}

#[async_trait]
impl StreamProvider for InvidiousClient {
    type Stream = Input;

    fn name(&self) -> &'static str {
        "invidious"
    }

    async fn resolve(&self, track: &Track) -> Result<Input, SourceError> {
        let video_id = track
            .media_id()
            .ok_or_else(|| SourceError::provider(self.name(), "la URL no es un video de YouTube"))?;

        let audio_url = self.get_audio_url(&video_id).await?;
        Ok(HttpRequest::new(self.client.clone(), audio_url).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_mp4_adaptive_audio() {
        let video: InvidiousVideo = serde_json::from_str(
            r#"{
                "adaptiveFormats": [
                    {"url": "https://v/1", "type": "video/mp4; codecs=\"avc1\""},
                    {"url": "https://a/webm", "type": "audio/webm; codecs=\"opus\""},
                    {"url": "https://a/mp4", "type": "audio/mp4; codecs=\"mp4a.40.2\""}
                ],
                "formatStreams": []
            }"#,
        )
        .unwrap();

        assert_eq!(pick_audio_format(video).as_deref(), Some("https://a/mp4"));
    }

    #[test]
    fn test_no_audio_formats() {
        let video: InvidiousVideo = serde_json::from_str(
            r#"{"adaptiveFormats": [{"url": "https://v/1", "type": "video/webm"}]}"#,
        )
        .unwrap();

        assert_eq!(pick_audio_format(video), None);
    }

    #[test]
    fn test_instances_rotate() {
        let client = InvidiousClient::new(
            reqwest::Client::new(),
            vec!["https://a".to_string(), "https://b".to_string()],
        );
        assert_eq!(client.next_instance(), Some("https://a"));
        assert_eq!(client.next_instance(), Some("https://b"));
        assert_eq!(client.next_instance(), Some("https://a"));
    }
}
