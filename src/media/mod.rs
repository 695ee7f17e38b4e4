/*!
 * External media collaborators.
 *
 * Demuxing and speech-activity detection are black boxes behind the
 * `MediaTool` trait. The production implementation drives ffmpeg/ffprobe
 * as subprocesses with hard timeouts; tests substitute a scripted mock.
 *
 * - `ffmpeg`: `FfmpegTool`, the subprocess-backed implementation
 * - `cache`: `ArtifactCache`, bounded on-disk cache for decoded audio
 */

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::MediaError;
use crate::language_utils;
use crate::subtitle_processor::cue::TimeWindow;

pub mod cache;
pub mod ffmpeg;

pub use cache::ArtifactCache;
pub use ffmpeg::FfmpegTool;

// @struct: Subtitle stream as reported by the prober
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleStream {
    // @field: Absolute stream index in the container
    pub index: usize,

    pub codec_name: String,

    pub language: Option<String>,

    pub title: Option<String>,
}

impl SubtitleStream {
    /// Image-based codecs cannot be converted to text
    pub fn is_bitmap(&self) -> bool {
        matches!(
            self.codec_name.as_str(),
            "hdmv_pgs_subtitle" | "dvd_subtitle" | "dvb_subtitle" | "xsub"
        )
    }
}

/// Which subtitle stream to extract
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSelector {
    Index(usize),
    /// Best text stream for a language, falling back to English, then the first one
    Language(String),
}

/// Pick the best text stream for `preferred_language`.
///
/// Language tag first, then a language name or code in the title, then
/// English, then the first text stream.
pub fn select_subtitle_stream(streams: &[SubtitleStream], preferred_language: &str) -> Option<usize> {
    let text_streams: Vec<&SubtitleStream> = streams.iter().filter(|s| !s.is_bitmap()).collect();
    let preferred_name = language_utils::get_language_name(preferred_language)
        .ok()
        .map(|n| n.to_lowercase());

    let matches_language = |stream: &SubtitleStream, code: &str, name: Option<&str>| {
        if stream
            .language
            .as_deref()
            .is_some_and(|lang| language_utils::language_codes_match(lang, code))
        {
            return true;
        }
        stream.title.as_deref().is_some_and(|title| {
            let title = title.to_lowercase();
            name.is_some_and(|n| title.contains(n))
                || title
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|word| word == code.to_lowercase())
        })
    };

    text_streams
        .iter()
        .find(|s| matches_language(s, preferred_language, preferred_name.as_deref()))
        .or_else(|| text_streams.iter().find(|s| matches_language(s, "en", Some("english"))))
        .or_else(|| text_streams.first())
        .map(|s| s.index)
}

/// Demux and speech-activity collaborator
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Startup precondition: the underlying tools can be executed at all
    async fn check_available(&self) -> Result<(), MediaError>;

    async fn list_subtitle_streams(&self, media: &Path) -> Result<Vec<SubtitleStream>, MediaError>;

    /// Raw SRT bytes of one subtitle stream
    async fn extract_subtitle_stream(&self, media: &Path, selector: &StreamSelector) -> Result<Vec<u8>, MediaError>;

    /// Intervals with speech, sorted by start
    async fn speech_activity(&self, media: &Path) -> Result<Vec<TimeWindow>, MediaError>;
}
