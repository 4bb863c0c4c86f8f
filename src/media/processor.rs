use async_trait::async_trait;
use std::process::Command;
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::MediaConfig;
use crate::error::{Result, JayeError};
use super::{MediaCommandBuilder, MediaTransform};

/// FFmpeg-backed media transform
pub struct FfmpegTransform {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl FfmpegTransform {
    /// Create a new ffmpeg transform
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);

        Self {
            config,
            command_builder,
        }
    }
}

/// Spool a stream into a fresh temporary file. The file is removed when the
/// returned handle is dropped.
async fn spool(prefix: &str, src: &mut (dyn AsyncRead + Unpin + Send)) -> Result<NamedTempFile> {
    let temp = tempfile::Builder::new()
        .prefix(prefix)
        .tempfile()
        .map_err(|e| JayeError::MergeFailed(format!("Failed to create temp file: {}", e)))?;

    let mut file = tokio::fs::File::from_std(
        temp.reopen()
            .map_err(|e| JayeError::MergeFailed(format!("Failed to open temp file: {}", e)))?,
    );
    tokio::io::copy(src, &mut file)
        .await
        .map_err(|e| JayeError::MergeFailed(format!("Failed to copy input to temp file: {}", e)))?;
    file.flush()
        .await
        .map_err(|e| JayeError::MergeFailed(format!("Failed to flush temp file: {}", e)))?;

    Ok(temp)
}

#[async_trait]
impl MediaTransform for FfmpegTransform {
    async fn convert(
        &self,
        src: &mut (dyn AsyncRead + Unpin + Send),
        dst: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!("Converting stream to mp3");

        let command = self.command_builder.convert_to_mp3(&self.config.convert_options);
        command.pipe(src, dst, cancel).await?;
        dst.flush()
            .await
            .map_err(|e| JayeError::ConvertFailed(format!("Failed to flush converted output: {}", e)))?;

        info!("Conversion completed");
        Ok(())
    }

    async fn merge(
        &self,
        video: &mut (dyn AsyncRead + Unpin + Send),
        audio: &mut (dyn AsyncRead + Unpin + Send),
        dst: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> Result<()> {
        let video_tmp = spool("jaye-video", video).await?;
        let audio_tmp = spool("jaye-audio", audio).await?;
        let merged_tmp = tempfile::Builder::new()
            .prefix("jaye-merged")
            .tempfile()
            .map_err(|e| JayeError::MergeFailed(format!("Failed to create temp merge file: {}", e)))?;

        info!(
            "Merging {} and {} -> {}",
            video_tmp.path().display(),
            audio_tmp.path().display(),
            merged_tmp.path().display()
        );

        let command = self.command_builder.merge_to_mp4(
            video_tmp.path(),
            audio_tmp.path(),
            merged_tmp.path(),
            &self.config.merge_options,
        );
        command.execute(cancel).await?;

        let mut merged = tokio::fs::File::open(merged_tmp.path())
            .await
            .map_err(|e| JayeError::MergeFailed(format!("Failed to open merged file: {}", e)))?;
        tokio::io::copy(&mut merged, dst)
            .await
            .map_err(|e| JayeError::MergeFailed(format!("Failed writing merged file to output: {}", e)))?;
        dst.flush()
            .await
            .map_err(|e| JayeError::MergeFailed(format!("Failed to flush merged output: {}", e)))?;

        info!("Merge completed");
        Ok(())
    }

    fn check_availability(&self) -> Result<()> {
        let output = Command::new(&self.config.binary_path)
            .arg("-version")
            .output()
            .map_err(|e| JayeError::Config(format!("Encoder not found: {}", e)))?;

        if output.status.success() {
            info!("Encoder is available");
            Ok(())
        } else {
            Err(JayeError::Config("Encoder version check failed".to_string()))
        }
    }

    async fn version_info(&self) -> Result<String> {
        debug!("Getting encoder version information");

        let command = self.command_builder.version_check();
        let output = tokio::process::Command::new(&command.binary_path)
            .args(&command.args)
            .output()
            .await
            .map_err(|e| JayeError::Config(format!("Failed to execute encoder: {}", e)))?;

        if output.status.success() {
            let version_info = String::from_utf8_lossy(&output.stdout);
            // First line carries the version
            let first_line = version_info.lines().next().unwrap_or("Unknown version");
            Ok(first_line.to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(JayeError::Config(format!("Encoder version check failed: {}", stderr)))
        }
    }
}
