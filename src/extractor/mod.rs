// Extraction backend
//
// Enumerates the encodings available for a video ID and streams the bytes of
// a chosen encoding. The default implementation drives the yt-dlp binary.

pub mod ytdlp;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

pub use ytdlp::YtDlpExtractor;

use crate::config::ExtractorConfig;
use crate::error::Result;
use crate::models::Encoding;

/// Trait for extraction backends
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// List every encoding the backend offers for `id`, in backend order
    async fn encodings(&self, id: &str, cancel: &CancellationToken) -> Result<Vec<Encoding>>;

    /// Stream the bytes of `encoding` into `dst`
    async fn download(
        &self,
        id: &str,
        encoding: &Encoding,
        dst: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Check if the backend binary responds
    fn check_availability(&self) -> Result<()>;
}

/// Factory for creating extraction backends
pub struct ExtractorFactory;

impl ExtractorFactory {
    pub fn create(config: ExtractorConfig) -> Arc<dyn Extractor> {
        Arc::new(YtDlpExtractor::new(config))
    }
}
