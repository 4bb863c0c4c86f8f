//! Shared fakes for integration tests: an extractor, an encoder and a catalog
//! that never spawn processes or touch the network.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use jaye::acquire::Acquirer;
use jaye::cache::CacheStore;
use jaye::catalog::CatalogApi;
use jaye::config::AcquisitionConfig;
use jaye::error::{JayeError, Result};
use jaye::extractor::Extractor;
use jaye::media::MediaTransform;
use jaye::models::{AudioEncoding, Encoding, VideoInfo};

pub fn encoding(format_id: &str, extension: &str, resolution: u32, audio_bitrate: u32, audio: AudioEncoding) -> Encoding {
    Encoding {
        format_id: format_id.to_string(),
        extension: extension.to_string(),
        resolution,
        audio_bitrate,
        audio_encoding: audio,
    }
}

/// A typical listing: two video-only tracks, two audio-only tracks
pub fn typical_encodings() -> Vec<Encoding> {
    vec![
        encoding("137", "mp4", 1080, 0, AudioEncoding::None),
        encoding("136", "mp4", 720, 0, AudioEncoding::None),
        encoding("140", "m4a", 0, 129, AudioEncoding::Aac),
        encoding("251", "webm", 0, 160, AudioEncoding::Opus),
    ]
}

/// Extractor serving canned encodings; downloads write `<id>:<format_id>`
#[derive(Default)]
pub struct FakeExtractor {
    pub encodings: Mutex<HashMap<String, Vec<Encoding>>>,
    /// Format IDs whose download writes a few bytes and then fails
    pub failing_formats: Mutex<Vec<String>>,
    pub encoding_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    pub download_delay: Option<Duration>,
}

impl FakeExtractor {
    pub fn with(id: &str, encodings: Vec<Encoding>) -> Self {
        let fake = Self::default();
        fake.set_encodings(id, encodings);
        fake
    }

    pub fn set_encodings(&self, id: &str, encodings: Vec<Encoding>) {
        self.encodings.lock().unwrap().insert(id.to_string(), encodings);
    }

    pub fn fail_format(&self, format_id: &str) {
        self.failing_formats.lock().unwrap().push(format_id.to_string());
    }

    pub fn downloads(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn resolutions(&self) -> usize {
        self.encoding_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn encodings(&self, id: &str, _cancel: &CancellationToken) -> Result<Vec<Encoding>> {
        self.encoding_calls.fetch_add(1, Ordering::SeqCst);
        self.encodings
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| JayeError::NotFound(format!("unknown id {}", id)))
    }

    async fn download(
        &self,
        id: &str,
        encoding: &Encoding,
        dst: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.download_delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(JayeError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let fails = self.failing_formats.lock().unwrap().contains(&encoding.format_id);
        if fails {
            dst.write_all(b"partial").await?;
            return Err(JayeError::UpstreamUnavailable("connection reset".to_string()));
        }

        dst.write_all(format!("{}:{}", id, encoding.format_id).as_bytes()).await?;
        Ok(())
    }

    fn check_availability(&self) -> Result<()> {
        Ok(())
    }
}

/// Encoder that records how many runs overlap. Convert prefixes the input
/// with `mp3:`; merge joins both inputs with `+`.
#[derive(Default)]
pub struct FakeTransform {
    pub convert_calls: AtomicUsize,
    pub merge_calls: AtomicUsize,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    pub delay: Duration,
    pub fail: bool,
}

impl FakeTransform {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn run(&self, output: Vec<u8>, dst: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            dst.write_all(b"garbage").await?;
            return Err(JayeError::Io(std::io::Error::other("encoder exited with status 1")));
        }
        dst.write_all(&output).await?;
        Ok(())
    }
}

#[async_trait]
impl MediaTransform for FakeTransform {
    async fn convert(
        &self,
        src: &mut (dyn AsyncRead + Unpin + Send),
        dst: &mut (dyn AsyncWrite + Unpin + Send),
        _cancel: &CancellationToken,
    ) -> Result<()> {
        self.convert_calls.fetch_add(1, Ordering::SeqCst);
        let mut input = Vec::new();
        src.read_to_end(&mut input).await?;

        let mut output = b"mp3:".to_vec();
        output.extend_from_slice(&input);
        self.run(output, dst).await
    }

    async fn merge(
        &self,
        video: &mut (dyn AsyncRead + Unpin + Send),
        audio: &mut (dyn AsyncRead + Unpin + Send),
        dst: &mut (dyn AsyncWrite + Unpin + Send),
        _cancel: &CancellationToken,
    ) -> Result<()> {
        self.merge_calls.fetch_add(1, Ordering::SeqCst);
        let mut output = Vec::new();
        video.read_to_end(&mut output).await?;
        output.push(b'+');
        audio.read_to_end(&mut output).await?;
        self.run(output, dst).await
    }

    fn check_availability(&self) -> Result<()> {
        Ok(())
    }

    async fn version_info(&self) -> Result<String> {
        Ok("fake encoder 1.0".to_string())
    }
}

/// Catalog answering from a fixed title table
#[derive(Default)]
pub struct FakeCatalog {
    pub titles: HashMap<String, String>,
}

impl FakeCatalog {
    pub fn with(entries: &[(&str, &str)]) -> Self {
        Self {
            titles: entries
                .iter()
                .map(|(id, title)| (id.to_string(), title.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .titles
            .iter()
            .filter(|(_, title)| title.contains(query))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn info(&self, id: &str) -> Result<VideoInfo> {
        self.titles
            .get(id)
            .map(|title| VideoInfo::new(id, title.clone(), format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", id)))
            .ok_or_else(|| JayeError::NotFound(format!("no video for id {}", id)))
    }
}

pub fn acquirer(
    root: &std::path::Path,
    extractor: Arc<FakeExtractor>,
    transform: Arc<FakeTransform>,
) -> Acquirer {
    Acquirer::new(&AcquisitionConfig::default(), CacheStore::new(root), extractor, transform)
}
