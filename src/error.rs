use thiserror::Error;

/// Errores de dominio que terminan como respuesta corta en el chat.
#[derive(Error, Debug)]
pub enum MusicError {
    #[error("🔊 Debes estar en un canal de voz")]
    NotInVoiceChannel,
    #[error("🔊 El volumen debe estar entre 0 y {max} (recibido: {given})")]
    VolumeOutOfRange { given: i64, max: u8 },
    #[error("🔊 `{0}` no es un número válido")]
    InvalidVolume(String),
    #[error("📭 No hay una cola activa")]
    NoActiveQueue,
    #[error("🚫 No se encontraron resultados para `{0}`")]
    NoResults(String),
    #[error("⏰ La búsqueda tardó demasiado")]
    SearchTimeout,
    #[error("🚫 Error en la búsqueda: {0}")]
    SearchFailed(String),
    #[error("📋 La cola está llena (máximo {0} canciones)")]
    QueueFull(usize),
    #[error("❌ No se pudo conectar al canal de voz: {0}")]
    Join(#[from] songbird::error::JoinError),
    #[error("❌ La conexión de voz no está disponible")]
    ConnectionUnavailable,
    #[error("🎰 No existe la playlist `{0}` o está vacía")]
    EmptyPlaylist(String),
    #[error("❌ Songbird no está inicializado")]
    VoiceManagerMissing,
}

/// Errores al convertir un track en un stream reproducible.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("{provider}: {reason}")]
    Provider {
        provider: &'static str,
        reason: String,
    },
    #[error("{provider}: sin respuesta tras {secs}s")]
    Timeout { provider: &'static str, secs: u64 },
    #[error("ninguna fuente pudo reproducir `{title}` ({})", .attempts.join("; "))]
    Exhausted { title: String, attempts: Vec<String> },
}

impl SourceError {
    pub fn provider(provider: &'static str, reason: impl ToString) -> Self {
        Self::Provider {
            provider,
            reason: reason.to_string(),
        }
    }
}
