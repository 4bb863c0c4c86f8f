// Value types shared by the catalog, the resolver and the gateway

use serde::{Deserialize, Serialize};

/// Service tag reported for every video
pub const SERVICE_YOUTUBE: &str = "youtube";

/// Display metadata for one video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub url: String,
    pub thumbnail: String,
    pub service: String,
}

impl VideoInfo {
    pub fn new(id: impl Into<String>, title: impl Into<String>, thumbnail: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            url: watch_url(&id),
            id,
            title: title.into(),
            thumbnail: thumbnail.into(),
            service: SERVICE_YOUTUBE.to_string(),
        }
    }
}

/// Canonical watch URL for a video ID
pub fn watch_url(id: &str) -> String {
    format!("https://youtube.com/watch?v={}", id)
}

/// Audio codec family, ordered from least to most preferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    /// No audio track
    None,
    /// Audio present but in a codec we do not rank
    Other,
    Mp3,
    Vorbis,
    Aac,
    Opus,
}

impl AudioEncoding {
    /// Classify a codec string as reported by the extraction backend
    /// (e.g. "opus", "mp4a.40.2", "none")
    pub fn from_codec(codec: Option<&str>) -> Self {
        let codec = match codec {
            Some(c) => c.trim().to_ascii_lowercase(),
            None => return Self::None,
        };

        match codec.as_str() {
            "" | "none" => Self::None,
            c if c.starts_with("opus") => Self::Opus,
            c if c.starts_with("mp4a") || c.starts_with("aac") => Self::Aac,
            c if c.starts_with("vorbis") => Self::Vorbis,
            c if c.starts_with("mp3") => Self::Mp3,
            _ => Self::Other,
        }
    }
}

/// One downloadable variant of a video's media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encoding {
    /// Backend handle used to stream this variant
    pub format_id: String,
    /// Container extension (mp4, webm, m4a, ...)
    pub extension: String,
    /// Vertical resolution in pixels, 0 for audio-only variants
    pub resolution: u32,
    /// Audio bitrate in kbps, 0 when there is no audio
    pub audio_bitrate: u32,
    pub audio_encoding: AudioEncoding,
}

impl Encoding {
    pub fn has_video(&self) -> bool {
        self.resolution > 0
    }

    pub fn has_audio(&self) -> bool {
        self.audio_encoding != AudioEncoding::None
    }
}
