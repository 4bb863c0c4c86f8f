// Format resolver
//
// Picks the best video and audio encodings for a video ID. Every selection is
// a stable descending sort over the backend's list by a single key, so ties
// keep backend order and the same input always yields the same element.

use std::cmp::Reverse;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, JayeError};
use crate::extractor::Extractor;
use crate::models::Encoding;

/// Ranking key for an encoding selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankKey {
    /// Highest vertical resolution, for the video track
    Resolution,
    /// Highest audio bitrate, for the audio track muxed into a video
    AudioBitrate,
    /// Best audio codec, for standalone audio
    AudioEncoding,
}

/// Sort a copy of `encodings` by `key`, best first, keeping backend order on ties
pub fn rank(encodings: &[Encoding], key: RankKey) -> Vec<Encoding> {
    let mut ranked = encodings.to_vec();
    // sort_by_key is stable
    match key {
        RankKey::Resolution => ranked.sort_by_key(|e| Reverse(e.resolution)),
        RankKey::AudioBitrate => ranked.sort_by_key(|e| Reverse(e.audio_bitrate)),
        RankKey::AudioEncoding => ranked.sort_by_key(|e| Reverse(e.audio_encoding)),
    }
    ranked
}

/// First element of the ranking, or `NotFound` for an empty list
pub fn select(id: &str, encodings: &[Encoding], key: RankKey) -> Result<Encoding> {
    rank(encodings, key)
        .into_iter()
        .next()
        .ok_or_else(|| JayeError::NotFound(format!("no encodings available for {}", id)))
}

/// Best video track
pub fn best_video(id: &str, encodings: &[Encoding]) -> Result<Encoding> {
    select(id, encodings, RankKey::Resolution)
}

/// Best audio track for muxing into a combined container
pub fn best_audio(id: &str, encodings: &[Encoding]) -> Result<Encoding> {
    select(id, encodings, RankKey::AudioBitrate)
}

/// Best audio track for a standalone audio artifact
pub fn best_audio_only(id: &str, encodings: &[Encoding]) -> Result<Encoding> {
    select(id, encodings, RankKey::AudioEncoding)
}

/// Resolver bound to an extraction backend
pub struct FormatResolver {
    extractor: Arc<dyn Extractor>,
}

impl FormatResolver {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self { extractor }
    }

    /// Fetch the full encoding list for `id`
    pub async fn encodings(&self, id: &str, cancel: &CancellationToken) -> Result<Vec<Encoding>> {
        debug!("Resolving formats for {} via {}", id, self.extractor.name());
        self.extractor.encodings(id, cancel).await
    }

    pub async fn resolve_best_video(&self, id: &str, cancel: &CancellationToken) -> Result<Encoding> {
        best_video(id, &self.encodings(id, cancel).await?)
    }

    pub async fn resolve_best_audio(&self, id: &str, cancel: &CancellationToken) -> Result<Encoding> {
        best_audio(id, &self.encodings(id, cancel).await?)
    }

    pub async fn resolve_best_audio_only(&self, id: &str, cancel: &CancellationToken) -> Result<Encoding> {
        best_audio_only(id, &self.encodings(id, cancel).await?)
    }

    /// Best video and best audio from a single backend round trip
    pub async fn resolve_video_pair(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<(Encoding, Encoding)> {
        let encodings = self.encodings(id, cancel).await?;
        Ok((best_video(id, &encodings)?, best_audio(id, &encodings)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AudioEncoding;

    fn enc(id: &str, resolution: u32, audio_bitrate: u32, audio_encoding: AudioEncoding) -> Encoding {
        Encoding {
            format_id: id.to_string(),
            extension: "webm".to_string(),
            resolution,
            audio_bitrate,
            audio_encoding,
        }
    }

    fn sample() -> Vec<Encoding> {
        vec![
            enc("a", 720, 0, AudioEncoding::None),
            enc("b", 1080, 0, AudioEncoding::None),
            enc("c", 1080, 0, AudioEncoding::None),
            enc("d", 0, 128, AudioEncoding::Opus),
            enc("e", 0, 160, AudioEncoding::Aac),
            enc("f", 360, 96, AudioEncoding::Aac),
        ]
    }

    #[test]
    fn test_best_video_is_highest_resolution_first_on_tie() {
        let best = best_video("x", &sample()).unwrap();
        assert_eq!(best.format_id, "b");
    }

    #[test]
    fn test_ranking_is_stable() {
        let ranked = rank(&sample(), RankKey::Resolution);
        let ids: Vec<&str> = ranked.iter().map(|e| e.format_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a", "f", "d", "e"]);

        // Same input, same answer
        for _ in 0..10 {
            assert_eq!(best_video("x", &sample()).unwrap().format_id, "b");
        }
    }

    #[test]
    fn test_best_audio_by_bitrate() {
        assert_eq!(best_audio("x", &sample()).unwrap().format_id, "e");
    }

    #[test]
    fn test_best_audio_only_by_codec() {
        assert_eq!(best_audio_only("x", &sample()).unwrap().format_id, "d");
    }

    #[test]
    fn test_combined_source_serves_both() {
        let only = vec![enc("18", 360, 96, AudioEncoding::Aac)];
        assert_eq!(best_video("x", &only).unwrap(), best_audio("x", &only).unwrap());
    }

    #[test]
    fn test_empty_list_is_not_found() {
        assert!(matches!(best_video("x", &[]), Err(JayeError::NotFound(_))));
        assert!(matches!(best_audio("x", &[]), Err(JayeError::NotFound(_))));
        assert!(matches!(best_audio_only("x", &[]), Err(JayeError::NotFound(_))));
    }
}
