use async_trait::async_trait;
use songbird::input::{ChildContainer, Input};
use std::{
    process::{Child, Command, Stdio},
    time::Duration,
};
use tracing::{debug, info};

use super::{StreamProvider, Track};
use crate::error::SourceError;

/// Margen para detectar que el proceso murió nada más arrancar
const SPAWN_GRACE: Duration = Duration::from_millis(750);

/// Último recurso: `yt-dlp` escribiendo el mejor audio por stdout.
///
/// Solo se consumen stdout y el código de salida del proceso.
pub struct PipeProvider {
    program: String,
}

impl PipeProvider {
    pub fn new(program: String) -> Self {
        Self { program }
    }

    fn command(&self, url: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "-f",
            "bestaudio/best",
            "--no-playlist",
            "--quiet",
            "--no-warnings",
            "-o",
            "-",
            url,
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
        cmd
    }
}

#[async_trait]
impl StreamProvider for PipeProvider {
    type Stream = Input;

    fn name(&self) -> &'static str {
        "yt-dlp-pipe"
    }

    async fn resolve(&self, track: &Track) -> Result<Input, SourceError> {
        let child = self
            .command(&track.url)
            .spawn()
            .map_err(|e| SourceError::provider(self.name(), format!("no se pudo iniciar {}: {}", self.program, e)))?;
        let mut guard = ChildGuard(Some(child));

        // Cancelar este future (timeout del resolver) mata el proceso
        tokio::time::sleep(SPAWN_GRACE).await;

        let Some(child) = guard.0.as_mut() else {
            return Err(SourceError::provider(self.name(), "proceso perdido"));
        };
        match child.try_wait() {
            Ok(Some(status)) if !status.success() => {
                return Err(SourceError::provider(
                    self.name(),
                    format!("{} terminó con {}", self.program, status),
                ));
            }
            Ok(_) => {}
            Err(e) => return Err(SourceError::provider(self.name(), e)),
        }

        let Some(child) = guard.0.take() else {
            return Err(SourceError::provider(self.name(), "proceso perdido"));
        };
        info!("🎧 Stream por tubería iniciado para '{}'", track.title);
        Ok(ChildContainer::from(child).into())
    }
}

/// Mata y recoge el proceso salvo que se haya entregado a songbird
struct ChildGuard(Option<Child>);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.0.take() {
            if let Err(e) = child.kill() {
                debug!("Proceso {} ya terminado: {:?}", child.id(), e);
            }
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_streams_best_audio_to_stdout() {
        let provider = PipeProvider::new("yt-dlp".to_string());
        let cmd = provider.command("https://youtu.be/dQw4w9WgXcQ");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(cmd.get_program(), "yt-dlp");
        assert!(args.windows(2).any(|w| w == ["-o", "-"]));
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1].starts_with("bestaudio")));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/dQw4w9WgXcQ"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_provider_error() {
        let provider = PipeProvider::new("definitely-not-a-real-downloader".to_string());
        let track = crate::sources::test_track("x", "https://youtu.be/dQw4w9WgXcQ", "1:00");

        match provider.resolve(&track).await {
            Err(SourceError::Provider { provider, .. }) => assert_eq!(provider, "yt-dlp-pipe"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("a missing binary must not resolve"),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_cancelled_resolve_kills_the_child() {
        use crate::sources::{read_pid, sleepy_downloader, wait_for_exit};

        let dir = tempfile::tempdir().unwrap();
        let (program, pid_file) = sleepy_downloader(dir.path());
        let provider = PipeProvider::new(program);
        let track = crate::sources::test_track("x", "https://youtu.be/dQw4w9WgXcQ", "1:00");

        // Más corto que SPAWN_GRACE: el future se cancela durante la espera
        let result = tokio::time::timeout(Duration::from_millis(300), provider.resolve(&track)).await;
        assert!(result.is_err());

        let pid = read_pid(&pid_file).await;
        assert!(wait_for_exit(&pid).await, "yt-dlp {} sigue vivo", pid);
    }
}
