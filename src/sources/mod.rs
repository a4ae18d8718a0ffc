pub mod invidious;
pub mod pipe;
pub mod youtube;
pub mod ytdl;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use songbird::input::Input;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::{config::Config, error::SourceError};

pub use invidious::InvidiousClient;
pub use pipe::PipeProvider;
pub use youtube::YouTubeClient;
pub use ytdl::YtDlProvider;

/// Texto mostrado cuando la plataforma no informa la duración.
pub const UNKNOWN_DURATION: &str = "Desconocida";

/// Origen de un track en la cola
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOrigin {
    Manual,
    Loop,
}

/// Usuario que pidió el track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub id: UserId,
    pub name: String,
}

/// Representa un track de música
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub title: String,
    pub url: String,
    /// Duración tal como la informa la plataforma (`m:ss` o `h:mm:ss`)
    pub duration: String,
    pub thumbnail: Option<String>,
    pub requested_by: Requester,
    pub origin: TrackOrigin,
    pub search_query: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl Track {
    pub fn new(title: impl Into<String>, url: impl Into<String>, requested_by: Requester) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            duration: UNKNOWN_DURATION.to_string(),
            thumbnail: None,
            requested_by,
            origin: TrackOrigin::Manual,
            search_query: None,
            added_at: Utc::now(),
        }
    }

    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = duration.into();
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: String) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn with_origin(mut self, origin: TrackOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_search_query(mut self, query: impl Into<String>) -> Self {
        self.search_query = Some(query.into());
        self
    }

    /// ID del video de YouTube, si la URL lo contiene
    pub fn media_id(&self) -> Option<String> {
        youtube::extract_video_id(&self.url)
    }
}

/// Una estrategia capaz de convertir un track en un stream reproducible.
///
/// El tipo de stream es asociado para poder probar el resolver sin songbird.
#[cfg_attr(test, mockall::automock(type Stream = String;))]
#[async_trait]
pub trait StreamProvider: Send + Sync {
    type Stream: Send;

    /// Nombre corto usado en logs y para excluir la fuente en un reintento
    fn name(&self) -> &'static str;

    async fn resolve(&self, track: &Track) -> Result<Self::Stream, SourceError>;
}

/// Stream obtenido junto con la fuente que lo produjo
#[derive(Debug)]
pub struct ResolvedStream<S> {
    pub stream: S,
    pub provider: &'static str,
}

/// Recorre las fuentes en orden fijo hasta que una devuelva un stream.
///
/// Cada fuente se intenta como máximo una vez por llamada y cada intento está
/// acotado por `attempt_timeout`.
pub struct StreamResolver<S> {
    providers: Vec<Box<dyn StreamProvider<Stream = S>>>,
    attempt_timeout: Duration,
}

impl<S: Send> StreamResolver<S> {
    pub fn new(attempt_timeout: Duration) -> Self {
        Self {
            providers: Vec::new(),
            attempt_timeout,
        }
    }

    pub fn with_provider(mut self, provider: impl StreamProvider<Stream = S> + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Resuelve el track saltando la fuente `exclude` (si se indica).
    pub async fn resolve(
        &self,
        track: &Track,
        exclude: Option<&str>,
    ) -> Result<ResolvedStream<S>, SourceError> {
        let mut attempts = Vec::new();

        for provider in &self.providers {
            let name = provider.name();
            if exclude == Some(name) {
                info!("⏭️ Saltando {} para '{}' (reintento)", name, track.title);
                continue;
            }

            info!("🔄 Intentando {} para '{}'", name, track.title);
            match timeout(self.attempt_timeout, provider.resolve(track)).await {
                Ok(Ok(stream)) => {
                    info!("✅ Stream obtenido con {}", name);
                    return Ok(ResolvedStream {
                        stream,
                        provider: name,
                    });
                }
                Ok(Err(e)) => {
                    warn!("❌ {} falló: {}", name, e);
                    attempts.push(e.to_string());
                }
                Err(_) => {
                    let e = SourceError::Timeout {
                        provider: name,
                        secs: self.attempt_timeout.as_secs(),
                    };
                    warn!("⏰ {}", e);
                    attempts.push(e.to_string());
                }
            }
        }

        Err(SourceError::Exhausted {
            title: track.title.clone(),
            attempts,
        })
    }
}

/// Cadena de producción: songbird/yt-dlp → Invidious → yt-dlp por tubería.
pub fn default_resolver(config: &Config) -> anyhow::Result<StreamResolver<Input>> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    Ok(StreamResolver::new(config.resolve_timeout())
        .with_provider(YtDlProvider::new(http.clone()))
        .with_provider(InvidiousClient::new(http, config.invidious_instances.clone()))
        .with_provider(PipeProvider::new(config.ytdlp_path.clone())))
}

#[cfg(test)]
pub(crate) fn test_track(title: &str, url: &str, duration: &str) -> Track {
    Track::new(
        title,
        url,
        Requester {
            id: UserId::new(42),
            name: "tester".to_string(),
        },
    )
    .with_duration(duration)
}

/// Descargador falso: anota su pid y se queda dormido
#[cfg(all(test, target_os = "linux"))]
pub(crate) fn sleepy_downloader(dir: &std::path::Path) -> (String, std::path::PathBuf) {
    use std::os::unix::fs::PermissionsExt;

    let pid_file = dir.join("pid");
    let script = dir.join("fake-yt-dlp");
    std::fs::write(
        &script,
        format!("#!/bin/sh\necho $$ > {}\nexec sleep 30\n", pid_file.display()),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    (script.display().to_string(), pid_file)
}

/// Espera a que el proceso `pid` deje de existir (o quede zombi)
#[cfg(all(test, target_os = "linux"))]
pub(crate) async fn wait_for_exit(pid: &str) -> bool {
    for _ in 0..50 {
        let alive = std::fs::read_to_string(format!("/proc/{}/stat", pid))
            .ok()
            .and_then(|stat| {
                let state = stat.rsplit_once(')')?.1.trim_start().chars().next()?;
                Some(state != 'Z' && state != 'X')
            })
            .unwrap_or(false);
        if !alive {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(40)).await;
    }
    false
}

/// Pid anotado por `sleepy_downloader`
#[cfg(all(test, target_os = "linux"))]
pub(crate) async fn read_pid(pid_file: &std::path::Path) -> String {
    for _ in 0..50 {
        if let Ok(pid) = std::fs::read_to_string(pid_file) {
            if !pid.trim().is_empty() {
                return pid.trim().to_string();
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("el proceso nunca anotó su pid");
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::always;

    fn failing(name: &'static str) -> MockStreamProvider {
        let mut provider = MockStreamProvider::new();
        provider.expect_name().return_const(name);
        provider
            .expect_resolve()
            .with(always())
            .times(1)
            .returning(move |_| Err(SourceError::provider(name, "boom")));
        provider
    }

    fn succeeding(name: &'static str, times: usize) -> MockStreamProvider {
        let mut provider = MockStreamProvider::new();
        provider.expect_name().return_const(name);
        provider
            .expect_resolve()
            .times(times)
            .returning(move |_| Ok(format!("stream-from-{name}")));
        provider
    }

    fn track() -> Track {
        test_track("Song", "https://www.youtube.com/watch?v=dQw4w9WgXcQ", "3:00")
    }

    #[tokio::test]
    async fn test_subprocess_attempted_once_after_libraries_fail() {
        let resolver = StreamResolver::new(Duration::from_secs(5))
            .with_provider(failing("a"))
            .with_provider(failing("b"))
            .with_provider(succeeding("pipe", 1));

        let resolved = resolver.resolve(&track(), None).await.unwrap();
        assert_eq!(resolved.provider, "pipe");
        assert_eq!(resolved.stream, "stream-from-pipe");
    }

    #[tokio::test]
    async fn test_first_success_stops_the_chain() {
        let resolver = StreamResolver::new(Duration::from_secs(5))
            .with_provider(succeeding("a", 1))
            .with_provider(succeeding("b", 0))
            .with_provider(succeeding("pipe", 0));

        let resolved = resolver.resolve(&track(), None).await.unwrap();
        assert_eq!(resolved.provider, "a");
    }

    #[tokio::test]
    async fn test_exhausted_lists_every_attempt_once() {
        let resolver = StreamResolver::new(Duration::from_secs(5))
            .with_provider(failing("a"))
            .with_provider(failing("b"))
            .with_provider(failing("pipe"));

        match resolver.resolve(&track(), None).await {
            Err(SourceError::Exhausted { title, attempts }) => {
                assert_eq!(title, "Song");
                assert_eq!(attempts.len(), 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_excluded_provider_is_skipped() {
        let resolver = StreamResolver::new(Duration::from_secs(5))
            .with_provider(succeeding("a", 0))
            .with_provider(succeeding("b", 1));

        let resolved = resolver.resolve(&track(), Some("a")).await.unwrap();
        assert_eq!(resolved.provider, "b");
    }

    #[test]
    fn test_media_id_from_track_url() {
        assert_eq!(track().media_id().as_deref(), Some("dQw4w9WgXcQ"));
        let search = test_track("x", "https://www.youtube.com/results?search_query=x", "1:00");
        assert_eq!(search.media_id(), None);
    }
}
