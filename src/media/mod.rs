// Media transform capability
//
// The gateway never decodes media itself. It hands streams to an external
// encoder and only decides when that happens and with which inputs:
// - Processor: ffmpeg-backed implementation of MediaTransform
// - Commands: command builders and process execution

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

pub use commands::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;

/// Convert and merge operations performed by an external encoder
#[async_trait]
pub trait MediaTransform: Send + Sync {
    /// Convert an arbitrary media stream into an mp3 stream
    async fn convert(
        &self,
        src: &mut (dyn AsyncRead + Unpin + Send),
        dst: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Merge a video stream and an audio stream into one mp4 container
    async fn merge(
        &self,
        video: &mut (dyn AsyncRead + Unpin + Send),
        audio: &mut (dyn AsyncRead + Unpin + Send),
        dst: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Check if the encoder is available
    fn check_availability(&self) -> Result<()>;

    /// Get encoder version information
    async fn version_info(&self) -> Result<String>;
}

/// Factory for creating media transform instances
pub struct MediaTransformFactory;

impl MediaTransformFactory {
    /// Create the default transform implementation (FFmpeg-based)
    pub fn create(config: MediaConfig) -> Arc<dyn MediaTransform> {
        Arc::new(processor::FfmpegTransform::new(config))
    }
}
