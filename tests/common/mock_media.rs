/*!
 * Mock media tool
 *
 * Scripted stand-in for ffmpeg/ffprobe: fixed availability, one subtitle
 * stream and a fixed list of speech windows.
 */

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use cueforge::errors::MediaError;
use cueforge::media::{MediaTool, StreamSelector, SubtitleStream};
use cueforge::subtitle_processor::TimeWindow;

#[derive(Debug, Default)]
pub struct MockMedia {
    pub available: bool,
    /// SRT bytes returned by extraction; empty means no usable stream
    pub subtitle: Vec<u8>,
    pub speech: Vec<TimeWindow>,
    pub speech_calls: AtomicUsize,
    pub extract_calls: AtomicUsize,
}

impl MockMedia {
    pub fn available() -> Self {
        Self {
            available: true,
            ..Self::default()
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn with_subtitle(mut self, srt: &str) -> Self {
        self.subtitle = srt.as_bytes().to_vec();
        self
    }

    pub fn with_speech(mut self, speech: Vec<TimeWindow>) -> Self {
        self.speech = speech;
        self
    }

    pub fn speech_calls(&self) -> usize {
        self.speech_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaTool for MockMedia {
    async fn check_available(&self) -> Result<(), MediaError> {
        if self.available {
            Ok(())
        } else {
            Err(MediaError::ToolUnavailable {
                tool: "ffmpeg".to_string(),
                reason: "not installed".to_string(),
            })
        }
    }

    async fn list_subtitle_streams(&self, _media: &Path) -> Result<Vec<SubtitleStream>, MediaError> {
        Ok(vec![SubtitleStream {
            index: 2,
            codec_name: "subrip".to_string(),
            language: Some("eng".to_string()),
            title: None,
        }])
    }

    async fn extract_subtitle_stream(&self, media: &Path, _selector: &StreamSelector) -> Result<Vec<u8>, MediaError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        if self.subtitle.is_empty() {
            return Err(MediaError::NoSubtitleStream(media.display().to_string()));
        }
        Ok(self.subtitle.clone())
    }

    async fn speech_activity(&self, media: &Path) -> Result<Vec<TimeWindow>, MediaError> {
        self.speech_calls.fetch_add(1, Ordering::SeqCst);
        if !media.exists() {
            return Err(MediaError::MissingInput(media.display().to_string()));
        }
        Ok(self.speech.clone())
    }
}
