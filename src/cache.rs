// On-disk artifact cache
//
// Layout: <root>/<id>/<artifact-name>. A file at its final path is complete by
// construction: writers populate a hidden staging file in the same directory
// and rename it into place only after it has been synced.

use chrono::{DateTime, Utc};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Result, JayeError};

/// Name of the merged container artifact
pub const COMBINED_NAME: &str = "combined.mp4";
/// Name of the converted audio artifact
pub const AUDIO_ONLY_NAME: &str = "audio.mp3";

const STAGING_SUFFIX: &str = ".part";

/// Kinds of files kept per video ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// Raw video download, `video.<ext>`
    RawVideo(String),
    /// Raw audio download, `audio.<ext>`
    RawAudio(String),
    /// Merged video and audio, `combined.mp4`
    Combined,
    /// Converted standalone audio, `audio.mp3`
    AudioOnly,
}

impl Artifact {
    pub fn file_name(&self) -> String {
        match self {
            Self::RawVideo(ext) => format!("video.{}", ext),
            Self::RawAudio(ext) => format!("audio.{}", ext),
            Self::Combined => COMBINED_NAME.to_string(),
            Self::AudioOnly => AUDIO_ONLY_NAME.to_string(),
        }
    }

    /// Short label used in log lines
    pub fn label(&self) -> &'static str {
        match self {
            Self::RawVideo(_) => "video",
            Self::RawAudio(_) => "audio",
            Self::Combined => "combined",
            Self::AudioOnly => "audio-only",
        }
    }
}

/// Reject IDs that could escape the cache root or collide with staging files
pub fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= 64
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(JayeError::InvalidRequest(format!("invalid video id: {:?}", id)))
    }
}

/// One per-ID directory in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub id: String,
    pub modified: DateTime<Utc>,
}

/// Result of looking up an artifact
#[derive(Debug)]
pub enum CacheLookup {
    /// The artifact exists; the handle is open for reading at offset 0
    Hit(File),
    /// The artifact is absent; populate and commit the pending file
    Miss(PendingArtifact),
}

/// A staging file that becomes an artifact on `commit`. Dropping it without
/// committing deletes the staging file, so failed writes leave nothing behind.
#[derive(Debug)]
pub struct PendingArtifact {
    file: File,
    staging: TempPath,
    target: PathBuf,
}

impl PendingArtifact {
    /// Writer for the artifact content
    pub fn file(&mut self) -> &mut File {
        &mut self.file
    }

    /// Final path the artifact will be published at
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Flush to durable storage, publish at the final path and rewind
    pub async fn commit(mut self) -> Result<File> {
        self.file
            .flush()
            .await
            .map_err(|e| JayeError::StorageUnavailable(format!("Failed to flush {}: {}", self.target.display(), e)))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| JayeError::StorageUnavailable(format!("Failed to sync {}: {}", self.target.display(), e)))?;

        self.staging
            .persist(&self.target)
            .map_err(|e| JayeError::StorageUnavailable(format!("Failed to publish {}: {}", self.target.display(), e)))?;

        self.file
            .seek(SeekFrom::Start(0))
            .await
            .map_err(|e| JayeError::StorageUnavailable(format!("Failed to rewind {}: {}", self.target.display(), e)))?;

        debug!("Published {}", self.target.display());
        Ok(self.file)
    }

    /// Drop the partial content explicitly
    pub fn discard(self) {
        debug!("Discarding partial {}", self.target.display());
    }
}

/// Per-ID artifact store rooted at a directory
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every artifact of `id`
    pub fn dir_for(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.root.join(id))
    }

    /// Final path of one artifact
    pub fn path_for(&self, id: &str, artifact: &Artifact) -> Result<PathBuf> {
        Ok(self.dir_for(id)?.join(artifact.file_name()))
    }

    async fn ensure_dir(&self, dir: &Path) -> Result<()> {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o700);

        builder
            .create(dir)
            .await
            .map_err(|e| JayeError::StorageUnavailable(format!("Failed to create {}: {}", dir.display(), e)))
    }

    /// Open an artifact for reading if it exists, otherwise start a pending one
    pub async fn open(&self, id: &str, artifact: &Artifact) -> Result<CacheLookup> {
        let dir = self.dir_for(id)?;
        self.ensure_dir(&dir).await?;

        let name = artifact.file_name();
        let target = dir.join(&name);

        match File::open(&target).await {
            Ok(file) => return Ok(CacheLookup::Hit(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(JayeError::StorageUnavailable(format!(
                    "Failed to open {}: {}",
                    target.display(),
                    e
                )));
            }
        }

        let staging = tempfile::Builder::new()
            .prefix(&format!(".{}.", name))
            .suffix(STAGING_SUFFIX)
            .tempfile_in(&dir)
            .map_err(|e| JayeError::StorageUnavailable(format!("Failed to create staging file for {}: {}", target.display(), e)))?;
        let (file, staging) = staging.into_parts();

        Ok(CacheLookup::Miss(PendingArtifact {
            file: File::from_std(file),
            staging,
            target,
        }))
    }

    /// Per-ID directories in the cache root, oldest modification first
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry
                .map_err(|e| JayeError::StorageUnavailable(format!("Failed to read cache root: {}", e)))?;
            if !entry.file_type().is_dir() {
                continue;
            }

            let id = entry.file_name().to_string_lossy().to_string();
            if validate_id(&id).is_err() {
                debug!("Skipping foreign directory in cache root: {}", id);
                continue;
            }

            let modified = entry
                .metadata()
                .map_err(|e| JayeError::StorageUnavailable(format!("Failed to stat {}: {}", id, e)))?
                .modified()
                .map_err(|e| JayeError::StorageUnavailable(format!("Failed to read mtime of {}: {}", id, e)))?;

            entries.push(CacheEntry {
                id,
                modified: DateTime::<Utc>::from(modified),
            });
        }

        // Stable, so equal mtimes keep name order
        entries.sort_by_key(|e| e.modified);
        Ok(entries)
    }

    /// `entries` run on the blocking pool, for use inside request handlers
    pub async fn scan(&self) -> Result<Vec<CacheEntry>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.entries())
            .await
            .map_err(|e| JayeError::StorageUnavailable(format!("Cache scan task failed: {}", e)))?
    }

    /// Published artifact names for one ID
    pub fn artifacts(&self, id: &str) -> Result<Vec<String>> {
        let dir = self.dir_for(id)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry
                .map_err(|e| JayeError::StorageUnavailable(format!("Failed to read {}: {}", dir.display(), e)))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().is_file() && !name.starts_with('.') {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Delete everything cached for one ID
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let dir = self.dir_for(id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!("Removed cached artifacts for {}", id);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(JayeError::StorageUnavailable(format!("Failed to remove {}: {}", dir.display(), e))),
        }
    }

    /// Remove the directory of `id` if nothing is left in it. Callers hold the
    /// ID's lock, so no writer can be staging into it.
    pub async fn prune(&self, id: &str) {
        let Ok(dir) = self.dir_for(id) else {
            return;
        };
        match tokio::fs::remove_dir(&dir).await {
            Ok(()) => debug!("Pruned empty cache directory {}", dir.display()),
            Err(e) => debug!("Keeping {}: {}", dir.display(), e),
        }
    }

    /// Delete every cached ID, returning how many were removed
    pub async fn clear(&self) -> Result<u64> {
        let mut removed = 0;
        for entry in self.scan().await? {
            match self.remove(&entry.id).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to clear {}: {}", entry.id, e),
            }
        }
        Ok(removed)
    }
}
