use anyhow::{Context, Result};
use std::{collections::HashMap, path::Path};
use tokio::fs;
use tracing::{info, warn};

/// Playlists con nombre para el modo loop, leídas de un JSON
/// `{ "nombre": ["título", ...] }`
#[derive(Debug, Clone, Default)]
pub struct PlaylistBook {
    playlists: HashMap<String, Vec<String>>,
}

impl PlaylistBook {
    /// Carga el archivo de playlists.
    ///
    /// Sin ruta o con el archivo ausente se obtiene un libro vacío; un JSON
    /// mal formado sí es un error.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            warn!("📁 PLAYLISTS_PATH no configurado, el modo loop no tendrá playlists");
            return Ok(Self::default());
        };

        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("📁 Archivo de playlists no encontrado: {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("No se pudo leer {}", path.display()))
            }
        };

        let playlists: HashMap<String, Vec<String>> = serde_json::from_str(&content)
            .with_context(|| format!("Formato inválido en {}", path.display()))?;

        info!(
            "📁 {} playlists cargadas desde {}",
            playlists.len(),
            path.display()
        );

        Ok(Self { playlists })
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.playlists.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_load_playlists() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"loop": ["Song A", "Song B"], "chill": []}}"#).unwrap();

        let book = PlaylistBook::load(Some(file.path())).await.unwrap();
        assert_eq!(book.len(), 2);
        assert_eq!(
            book.get("loop").unwrap(),
            &["Song A".to_string(), "Song B".to_string()]
        );
        assert!(book.get("otra").is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_book() {
        let dir = tempfile::tempdir().unwrap();
        let book = PlaylistBook::load(Some(&dir.path().join("no-existe.json")))
            .await
            .unwrap();
        assert!(book.is_empty());

        assert!(PlaylistBook::load(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_is_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[1, 2, 3]").unwrap();
        assert!(PlaylistBook::load(Some(file.path())).await.is_err());
    }
}
