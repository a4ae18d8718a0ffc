use async_trait::async_trait;
use songbird::input::{Compose, Input, YoutubeDl};
use tracing::debug;

use super::{StreamProvider, Track};
use crate::error::SourceError;

/// Fuente principal: el `YoutubeDl` perezoso de songbird.
///
/// Se pide la metadata antes de devolver el input para que un video caído
/// falle aquí y no en el reproductor.
pub struct YtDlProvider {
    http: reqwest::Client,
}

impl YtDlProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl StreamProvider for YtDlProvider {
    type Stream = Input;

    fn name(&self) -> &'static str {
        "songbird-ytdl"
    }

    async fn resolve(&self, track: &Track) -> Result<Input, SourceError> {
        let mut source = YoutubeDl::new(self.http.clone(), track.url.clone())
            .user_args(vec!["-f".into(), "bestaudio[ext=webm]/bestaudio/best".into()]);

        let metadata = source
            .aux_metadata()
            .await
            .map_err(|e| SourceError::provider(self.name(), e))?;
        debug!(
            "📊 Metadata de songbird: {:?} ({:?})",
            metadata.title, metadata.duration
        );

        Ok(source.into())
    }
}
