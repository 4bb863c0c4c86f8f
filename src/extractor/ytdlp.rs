use async_trait::async_trait;
use serde::Deserialize;
use std::process::{Command as StdCommand, Stdio};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Extractor;
use crate::config::ExtractorConfig;
use crate::error::{Result, JayeError};
use crate::models::{AudioEncoding, Encoding};

/// Extraction backend using the yt-dlp binary
pub struct YtDlpExtractor {
    config: ExtractorConfig,
}

/// Subset of `yt-dlp --dump-json` output we rely on
#[derive(Debug, Deserialize)]
struct DumpJson {
    #[serde(default)]
    formats: Vec<DumpFormat>,
}

#[derive(Debug, Deserialize)]
struct DumpFormat {
    format_id: String,
    #[serde(default)]
    ext: String,
    height: Option<u32>,
    vcodec: Option<String>,
    acodec: Option<String>,
    abr: Option<f64>,
}

impl DumpFormat {
    fn into_encoding(self) -> Option<Encoding> {
        let has_video = self.vcodec.as_deref().is_some_and(|v| v != "none" && !v.is_empty());
        let audio_encoding = AudioEncoding::from_codec(self.acodec.as_deref());

        // Storyboards and other image tracks carry neither stream
        if !has_video && audio_encoding == AudioEncoding::None {
            return None;
        }

        let audio_bitrate = match audio_encoding {
            AudioEncoding::None => 0,
            _ => self.abr.map(|a| a.round().max(0.0) as u32).unwrap_or(0),
        };

        Some(Encoding {
            format_id: self.format_id,
            extension: self.ext,
            resolution: if has_video { self.height.unwrap_or(0) } else { 0 },
            audio_bitrate,
            audio_encoding,
        })
    }
}

/// Parse `--dump-json` output into encodings, preserving backend order
pub(crate) fn parse_encodings(stdout: &[u8]) -> Result<Vec<Encoding>> {
    let dump: DumpJson = serde_json::from_slice(stdout)
        .map_err(|e| JayeError::UpstreamUnavailable(format!("Invalid yt-dlp JSON: {}", e)))?;

    Ok(dump
        .formats
        .into_iter()
        .filter_map(DumpFormat::into_encoding)
        .collect())
}

/// Distinguish "this ID does not exist" from everything else yt-dlp reports
fn classify_failure(id: &str, stderr: &str) -> JayeError {
    let lower = stderr.to_ascii_lowercase();
    let missing = ["video unavailable", "incomplete youtube id", "is not a valid url", "private video", "has been removed"];

    if missing.iter().any(|m| lower.contains(m)) {
        JayeError::NotFound(format!("{}: {}", id, stderr.trim()))
    } else {
        JayeError::UpstreamUnavailable(format!("yt-dlp failed for {}: {}", id, stderr.trim()))
    }
}

impl YtDlpExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    fn video_url(id: &str) -> String {
        format!("https://www.youtube.com/watch?v={}", id)
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.config.socket_timeout.to_string(),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        args
    }

    /// Build arguments for listing formats
    pub(crate) fn dump_args(&self, id: &str) -> Vec<String> {
        let mut args = vec!["--dump-json".to_string()];
        args.extend(self.base_args());
        args.push(Self::video_url(id));
        args
    }

    /// Build arguments for streaming one format to stdout
    pub(crate) fn download_args(&self, id: &str, encoding: &Encoding) -> Vec<String> {
        let mut args = vec![
            "--quiet".to_string(),
            "--no-part".to_string(),
            "-f".to_string(),
            encoding.format_id.clone(),
            "-o".to_string(),
            "-".to_string(),
        ];
        args.extend(self.base_args());
        args.push(Self::video_url(id));
        args
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.config.binary_path);
        cmd.args(args).kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn encodings(&self, id: &str, cancel: &CancellationToken) -> Result<Vec<Encoding>> {
        let args = self.dump_args(id);
        debug!("Executing {} {}", self.config.binary_path, args.join(" "));

        let child = self
            .command(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| JayeError::UpstreamUnavailable(format!("Failed to execute yt-dlp: {}", e)))?;

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JayeError::Cancelled),
            output = child.wait_with_output() => output,
        }
        .map_err(|e| JayeError::UpstreamUnavailable(format!("Failed to wait for yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(id, &stderr));
        }

        let encodings = parse_encodings(&output.stdout)?;
        info!("Resolved {} encodings for {}", encodings.len(), id);
        Ok(encodings)
    }

    async fn download(
        &self,
        id: &str,
        encoding: &Encoding,
        dst: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> Result<()> {
        let args = self.download_args(id, encoding);
        debug!("Executing {} {}", self.config.binary_path, args.join(" "));

        let mut child = self
            .command(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| JayeError::DownloadFailed(format!("Failed to execute yt-dlp: {}", e)))?;

        let (mut stdout, mut stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(o), Some(e)) => (o, e),
            _ => return Err(JayeError::DownloadFailed("yt-dlp pipes unavailable".to_string())),
        };

        let io = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            io = async {
                let drain = async {
                    let copied = tokio::io::copy(&mut stdout, &mut *dst).await;
                    if copied.is_err() {
                        // Nobody reads stdout any more; stop yt-dlp so stderr reaches EOF.
                        drop(stdout);
                        if let Err(e) = child.start_kill() {
                            warn!("Failed to kill yt-dlp for {}: {}", id, e);
                        }
                    }
                    copied
                };
                let collect = async move {
                    let mut buf = String::new();
                    let _ = stderr.read_to_string(&mut buf).await;
                    buf
                };
                tokio::join!(drain, collect)
            } => Some(io),
        };

        let Some((copied, stderr)) = io else {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill yt-dlp for {}: {}", id, e);
            }
            return Err(JayeError::Cancelled);
        };

        let status = child
            .wait()
            .await
            .map_err(|e| JayeError::DownloadFailed(format!("Failed to wait for yt-dlp: {}", e)))?;

        let bytes = copied
            .map_err(|e| JayeError::DownloadFailed(format!("Failed to write download of {}: {}", id, e)))?;

        if !status.success() {
            return Err(JayeError::DownloadFailed(format!(
                "yt-dlp exited with {} for {} format {}: {}",
                status,
                id,
                encoding.format_id,
                stderr.trim()
            )));
        }

        dst.flush()
            .await
            .map_err(|e| JayeError::DownloadFailed(format!("Failed to flush download: {}", e)))?;

        debug!("Streamed {} bytes of {} format {}", bytes, id, encoding.format_id);
        Ok(())
    }

    fn check_availability(&self) -> Result<()> {
        let output = StdCommand::new(&self.config.binary_path)
            .arg("--version")
            .output()
            .map_err(|e| JayeError::Config(format!("yt-dlp not found: {}", e)))?;

        if output.status.success() {
            info!("yt-dlp is available");
            Ok(())
        } else {
            Err(JayeError::Config("yt-dlp version check failed".to_string()))
        }
    }
}
