// Acquisition pipeline
//
// video: lock(id) -> combined cached? -> resolve -> raw video -> raw audio -> merge
// audio: lock(id) -> audio.mp3 cached? -> resolve -> raw audio -> convert
//
// Every step reuses what the cache already holds. A failed request leaves
// no per-ID directory behind unless a completed artifact lives in it.
// Work for one ID is serialized by that ID's lock; encoder runs are bounded
// process-wide by a permit pool.

use std::sync::Arc;
use tokio::fs::File;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{validate_id, Artifact, CacheLookup, CacheStore, PendingArtifact};
use crate::config::{AcquisitionConfig, Config};
use crate::error::{Result, JayeError};
use crate::extractor::{Extractor, ExtractorFactory};
use crate::locks::{KeyGuard, KeyedLocks};
use crate::media::{MediaTransform, MediaTransformFactory};
use crate::models::Encoding;
use crate::resolver::FormatResolver;

/// Lock key shared by every ID when acquisitions are fully serialized
const GLOBAL_LOCK_KEY: &str = "*";

/// Wrap a failure from a pipeline stage into that stage's error kind.
/// Cancellation and errors already of that kind pass through unchanged.
fn stage_error(err: JayeError, wrap: fn(String) -> JayeError) -> JayeError {
    let expected = std::mem::discriminant(&wrap(String::new()));
    match err {
        JayeError::Cancelled => JayeError::Cancelled,
        err if std::mem::discriminant(&err) == expected => err,
        err => wrap(err.to_string()),
    }
}

/// Drives resolver, downloads, cache and encoder for one request at a time per ID
pub struct Acquirer {
    store: CacheStore,
    resolver: FormatResolver,
    extractor: Arc<dyn Extractor>,
    transform: Arc<dyn MediaTransform>,
    locks: KeyedLocks,
    transform_permits: Semaphore,
    serialize_all: bool,
}

impl Acquirer {
    pub fn new(
        config: &AcquisitionConfig,
        store: CacheStore,
        extractor: Arc<dyn Extractor>,
        transform: Arc<dyn MediaTransform>,
    ) -> Self {
        Self {
            store,
            resolver: FormatResolver::new(Arc::clone(&extractor)),
            extractor,
            transform,
            locks: KeyedLocks::new(),
            transform_permits: Semaphore::new(config.max_concurrent_transforms.max(1)),
            serialize_all: config.serialize_all,
        }
    }

    /// Build the pipeline with the yt-dlp and ffmpeg backends
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.acquisition,
            CacheStore::new(&config.cache.video_path),
            ExtractorFactory::create(config.extractor.clone()),
            MediaTransformFactory::create(config.media.clone()),
        )
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Check that both external tools respond
    pub fn check_availability(&self) -> Result<()> {
        self.extractor.check_availability()?;
        self.transform.check_availability()
    }

    /// Encoder version line, for diagnostics
    pub async fn encoder_version(&self) -> Result<String> {
        self.transform.version_info().await
    }

    async fn lock(&self, id: &str, cancel: &CancellationToken) -> Result<KeyGuard> {
        let key = if self.serialize_all { GLOBAL_LOCK_KEY } else { id };
        self.locks.acquire(key, cancel).await
    }

    async fn transform_permit(&self, cancel: &CancellationToken) -> Result<SemaphorePermit<'_>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(JayeError::Cancelled),
            permit = self.transform_permits.acquire() => permit.map_err(|_| JayeError::Cancelled),
        }
    }

    /// Merged video+audio container for `id`, rewound to the start
    pub async fn video_artifact(&self, id: &str, cancel: &CancellationToken) -> Result<File> {
        validate_id(id)?;
        let _guard = self.lock(id, cancel).await?;

        let pending = match self.store.open(id, &Artifact::Combined).await? {
            CacheLookup::Hit(file) => {
                info!("Combined video already exists: {}", id);
                return Ok(file);
            }
            CacheLookup::Miss(pending) => pending,
        };

        let result = self.produce_video(id, pending, cancel).await;
        if result.is_err() {
            self.store.prune(id).await;
        }
        result
    }

    /// Converted mp3 for `id`, rewound to the start
    pub async fn audio_artifact(&self, id: &str, cancel: &CancellationToken) -> Result<File> {
        validate_id(id)?;
        let _guard = self.lock(id, cancel).await?;

        let pending = match self.store.open(id, &Artifact::AudioOnly).await? {
            CacheLookup::Hit(file) => {
                info!("Audio already exists: {}", id);
                return Ok(file);
            }
            CacheLookup::Miss(pending) => pending,
        };

        let result = self.produce_audio(id, pending, cancel).await;
        if result.is_err() {
            self.store.prune(id).await;
        }
        result
    }

    async fn produce_video(&self, id: &str, pending: PendingArtifact, cancel: &CancellationToken) -> Result<File> {
        let (video_encoding, audio_encoding) = self.resolver.resolve_video_pair(id, cancel).await?;

        let mut video = self
            .download_raw(id, &video_encoding, Artifact::RawVideo(video_encoding.extension.clone()), cancel)
            .await?;
        let mut audio = self
            .download_raw(id, &audio_encoding, Artifact::RawAudio(audio_encoding.extension.clone()), cancel)
            .await?;

        self.merge(id, &mut video, &mut audio, pending, cancel).await
    }

    async fn produce_audio(&self, id: &str, pending: PendingArtifact, cancel: &CancellationToken) -> Result<File> {
        let encoding = self.resolver.resolve_best_audio_only(id, cancel).await?;
        let mut raw = self
            .download_raw(id, &encoding, Artifact::RawAudio(encoding.extension.clone()), cancel)
            .await?;

        self.convert(id, &mut raw, pending, cancel).await
    }

    async fn download_raw(
        &self,
        id: &str,
        encoding: &Encoding,
        artifact: Artifact,
        cancel: &CancellationToken,
    ) -> Result<File> {
        let label = artifact.label();
        let mut pending = match self.store.open(id, &artifact).await? {
            CacheLookup::Hit(file) => {
                info!("Raw {} already exists: {}", label, id);
                return Ok(file);
            }
            CacheLookup::Miss(pending) => pending,
        };

        info!("Downloading {} of {} (format {}, {})", label, id, encoding.format_id, encoding.extension);

        if let Err(e) = self.extractor.download(id, encoding, pending.file(), cancel).await {
            warn!("Download of {} failed for {}: {}", label, id, e);
            pending.discard();
            return Err(stage_error(e, JayeError::DownloadFailed));
        }

        let file = pending.commit().await?;
        info!("Finished downloading {}: {}", label, id);
        Ok(file)
    }

    async fn merge(
        &self,
        id: &str,
        video: &mut File,
        audio: &mut File,
        mut pending: PendingArtifact,
        cancel: &CancellationToken,
    ) -> Result<File> {
        let _permit = self.transform_permit(cancel).await?;
        info!("Merging video and audio: {}", id);

        if let Err(e) = self.transform.merge(video, audio, pending.file(), cancel).await {
            warn!("Merge failed for {}: {}", id, e);
            pending.discard();
            return Err(stage_error(e, JayeError::MergeFailed));
        }

        let file = pending.commit().await?;
        info!("Finished merging: {}", id);
        Ok(file)
    }

    async fn convert(
        &self,
        id: &str,
        raw: &mut File,
        mut pending: PendingArtifact,
        cancel: &CancellationToken,
    ) -> Result<File> {
        let _permit = self.transform_permit(cancel).await?;
        info!("Converting audio: {}", id);

        if let Err(e) = self.transform.convert(raw, pending.file(), cancel).await {
            warn!("Conversion failed for {}: {}", id, e);
            pending.discard();
            return Err(stage_error(e, JayeError::ConvertFailed));
        }

        let file = pending.commit().await?;
        info!("Finished converting audio: {}", id);
        Ok(file)
    }
}
