/*!
 * ffmpeg/ffprobe subprocess driver.
 *
 * Every invocation runs under a hard timeout; the child is killed when the
 * timeout wins the race. Speech activity is derived from ffmpeg's
 * `silencedetect` filter as the complement of the detected silences.
 */

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::errors::MediaError;
use crate::subtitle_processor::cue::TimeWindow;

use super::cache::ArtifactCache;
use super::{select_subtitle_stream, MediaTool, StreamSelector, SubtitleStream};

static SILENCE_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"silence_start:\s*(-?\d+(?:\.\d+)?)").unwrap());
static SILENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"silence_end:\s*(-?\d+(?:\.\d+)?)").unwrap());
static DURATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").unwrap());

// @struct: Per-operation time budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolTimeouts {
    pub probe: Duration,
    pub extract: Duration,
    pub audio: Duration,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(60),
            extract: Duration::from_secs(120),
            audio: Duration::from_secs(600),
        }
    }
}

// @struct: silencedetect parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilenceSettings {
    pub noise_db: f64,
    pub min_silence_ms: u64,
}

impl Default for SilenceSettings {
    fn default() -> Self {
        Self {
            noise_db: -30.0,
            min_silence_ms: 300,
        }
    }
}

// @struct: MediaTool backed by ffmpeg and ffprobe binaries
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    timeouts: ToolTimeouts,
    silence: SilenceSettings,
    // @field: Decoded audio cache; without it audio is decoded to a temp file per call
    cache: Option<Arc<ArtifactCache>>,
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegTool {
    pub fn new<P1: Into<PathBuf>, P2: Into<PathBuf>>(ffmpeg: P1, ffprobe: P2) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            timeouts: ToolTimeouts::default(),
            silence: SilenceSettings::default(),
            cache: None,
        }
    }

    pub fn with_timeouts(mut self, timeouts: ToolTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_silence(mut self, silence: SilenceSettings) -> Self {
        self.silence = silence;
        self
    }

    pub fn with_cache(mut self, cache: Arc<ArtifactCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn tool_name(program: &Path) -> String {
        program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| program.to_string_lossy().to_string())
    }

    /// Run `program` to completion or kill it when `timeout` elapses
    async fn run(program: &Path, args: &[&str], timeout: Duration) -> Result<Output, MediaError> {
        let tool = Self::tool_name(program);
        debug!("Running {} {}", tool, args.join(" "));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        tokio::select! {
            result = child => result.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MediaError::ToolUnavailable { tool: tool.clone(), reason: e.to_string() }
                } else {
                    MediaError::Failed { tool: tool.clone(), message: e.to_string() }
                }
            }),
            _ = tokio::time::sleep(timeout) => {
                error!("{} timed out after {}s", tool, timeout.as_secs());
                Err(MediaError::Timeout { tool, secs: timeout.as_secs() })
            }
        }
    }

    fn require_success(program: &Path, output: &Output) -> Result<(), MediaError> {
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(MediaError::Failed {
            tool: Self::tool_name(program),
            message: filter_ffmpeg_stderr(&stderr),
        })
    }

    fn require_input(media: &Path) -> Result<(), MediaError> {
        if media.is_file() {
            Ok(())
        } else {
            Err(MediaError::MissingInput(media.display().to_string()))
        }
    }

    async fn resolve_selector(&self, media: &Path, selector: &StreamSelector) -> Result<SubtitleStream, MediaError> {
        let streams = self.list_subtitle_streams(media).await?;
        let index = match selector {
            StreamSelector::Index(index) => Some(*index),
            StreamSelector::Language(language) => select_subtitle_stream(&streams, language),
        };
        let stream = index
            .and_then(|i| streams.iter().find(|s| s.index == i))
            .cloned()
            .ok_or_else(|| MediaError::NoSubtitleStream(media.display().to_string()))?;

        if stream.is_bitmap() {
            warn!("Stream {} is image-based ({}), cannot extract text", stream.index, stream.codec_name);
            return Err(MediaError::NoSubtitleStream(format!(
                "{} (stream {} is {})",
                media.display(),
                stream.index,
                stream.codec_name
            )));
        }
        Ok(stream)
    }

    async fn decode_audio(&self, media: &Path, target: &Path) -> Result<(), MediaError> {
        let input = media.to_string_lossy();
        let output = target.to_string_lossy();
        let result = Self::run(
            &self.ffmpeg,
            &["-y", "-hide_banner", "-i", &input, "-vn", "-ac", "1", "-ar", "16000", "-f", "wav", &output],
            self.timeouts.audio,
        )
        .await?;
        Self::require_success(&self.ffmpeg, &result)
    }

    fn scratch_wav(&self) -> Result<NamedTempFile, MediaError> {
        let scratch = match &self.cache {
            Some(cache) => cache.scratch("wav").map_err(|e| MediaError::Io(std::io::Error::other(e.to_string())))?,
            None => tempfile::Builder::new().suffix(".wav").tempfile()?,
        };
        Ok(scratch)
    }

    async fn detect_silence(&self, audio: &Path) -> Result<String, MediaError> {
        let input = audio.to_string_lossy();
        let filter = format!(
            "silencedetect=noise={}dB:d={}",
            self.silence.noise_db,
            self.silence.min_silence_ms as f64 / 1000.0
        );
        let result = Self::run(
            &self.ffmpeg,
            &["-hide_banner", "-nostats", "-i", &input, "-af", &filter, "-f", "null", "-"],
            self.timeouts.audio,
        )
        .await?;
        Self::require_success(&self.ffmpeg, &result)?;
        Ok(String::from_utf8_lossy(&result.stderr).into_owned())
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn check_available(&self) -> Result<(), MediaError> {
        for program in [&self.ffmpeg, &self.ffprobe] {
            let output = Self::run(program, &["-version"], Duration::from_secs(10))
                .await
                .map_err(|e| MediaError::ToolUnavailable {
                    tool: Self::tool_name(program),
                    reason: e.to_string(),
                })?;
            if !output.status.success() {
                return Err(MediaError::ToolUnavailable {
                    tool: Self::tool_name(program),
                    reason: format!("-version exited with {}", output.status),
                });
            }
        }
        Ok(())
    }

    async fn list_subtitle_streams(&self, media: &Path) -> Result<Vec<SubtitleStream>, MediaError> {
        Self::require_input(media)?;
        let input = media.to_string_lossy();
        let output = Self::run(
            &self.ffprobe,
            &["-v", "quiet", "-print_format", "json", "-show_streams", "-select_streams", "s", &input],
            self.timeouts.probe,
        )
        .await?;
        Self::require_success(&self.ffprobe, &output)?;

        let streams = parse_ffprobe_streams(&String::from_utf8_lossy(&output.stdout)).map_err(|message| {
            MediaError::Failed {
                tool: Self::tool_name(&self.ffprobe),
                message,
            }
        })?;
        debug!("Found {} subtitle streams in {:?}", streams.len(), media);
        Ok(streams)
    }

    async fn extract_subtitle_stream(&self, media: &Path, selector: &StreamSelector) -> Result<Vec<u8>, MediaError> {
        Self::require_input(media)?;
        let stream = self.resolve_selector(media, selector).await?;
        info!(
            "Extracting subtitle stream {} ({}) from {:?}",
            stream.index,
            stream.language.as_deref().unwrap_or("und"),
            media
        );

        let input = media.to_string_lossy();
        let map = format!("0:{}", stream.index);
        let output = Self::run(
            &self.ffmpeg,
            &["-hide_banner", "-i", &input, "-map", &map, "-c:s", "srt", "-f", "srt", "pipe:1"],
            self.timeouts.extract,
        )
        .await?;
        Self::require_success(&self.ffmpeg, &output)?;

        if output.stdout.is_empty() {
            return Err(MediaError::NoSubtitleStream(format!(
                "{} (stream {} produced no text)",
                media.display(),
                stream.index
            )));
        }
        Ok(output.stdout)
    }

    async fn speech_activity(&self, media: &Path) -> Result<Vec<TimeWindow>, MediaError> {
        Self::require_input(media)?;

        let cached = match &self.cache {
            Some(cache) => cache.lookup(media, "wav").unwrap_or_else(|e| {
                warn!("Audio cache lookup failed: {}", e);
                None
            }),
            None => None,
        };

        let stderr = match cached {
            Some(audio) => self.detect_silence(&audio).await?,
            None => {
                let scratch = self.scratch_wav()?;
                self.decode_audio(media, scratch.path()).await?;
                match &self.cache {
                    Some(cache) => {
                        let audio = cache
                            .commit(media, "wav", scratch)
                            .map_err(|e| MediaError::Io(std::io::Error::other(e.to_string())))?;
                        self.detect_silence(&audio).await?
                    }
                    None => self.detect_silence(scratch.path()).await?,
                }
            }
        };

        let detection = parse_silencedetect(&stderr);
        if detection.duration_ms.is_none() {
            warn!("No duration reported for {:?}; trailing speech is dropped", media);
        }
        let speech = speech_from_silences(&detection.silences, detection.duration_ms);
        info!("Detected {} speech segments in {:?}", speech.len(), media);
        Ok(speech)
    }
}

/// Turn ffprobe `-show_streams` JSON into stream descriptions
pub fn parse_ffprobe_streams(json: &str) -> Result<Vec<SubtitleStream>, String> {
    let value: Value = serde_json::from_str(json).map_err(|e| format!("Invalid ffprobe output: {}", e))?;
    let Some(streams) = value["streams"].as_array() else {
        return Ok(Vec::new());
    };

    Ok(streams
        .iter()
        .filter_map(|stream| {
            let index = stream["index"].as_u64()? as usize;
            let tag = |name: &str| stream["tags"][name].as_str().map(str::to_string);
            Some(SubtitleStream {
                index,
                codec_name: stream["codec_name"].as_str().unwrap_or("unknown").to_string(),
                language: tag("language"),
                title: tag("title"),
            })
        })
        .collect())
}

// @struct: Raw silencedetect result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SilenceDetection {
    pub silences: Vec<TimeWindow>,
    pub duration_ms: Option<u64>,
}

fn seconds_to_ms(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

/// Parse ffmpeg's stderr from a `silencedetect` run.
///
/// An unterminated trailing silence runs to the end of the input.
pub fn parse_silencedetect(stderr: &str) -> SilenceDetection {
    let duration_ms = DURATION.captures(stderr).and_then(|caps| {
        let hours: u64 = caps[1].parse().ok()?;
        let minutes: u64 = caps[2].parse().ok()?;
        let seconds: f64 = caps[3].parse().ok()?;
        Some(hours * 3_600_000 + minutes * 60_000 + seconds_to_ms(seconds))
    });

    let mut silences = Vec::new();
    let mut open: Option<u64> = None;
    for line in stderr.lines() {
        if let Some(caps) = SILENCE_START.captures(line) {
            open = caps[1].parse::<f64>().ok().map(seconds_to_ms);
        }
        if let Some(caps) = SILENCE_END.captures(line) {
            if let (Some(start), Ok(end)) = (open.take(), caps[1].parse::<f64>()) {
                let end = seconds_to_ms(end);
                if end > start {
                    silences.push(TimeWindow::new(start, end));
                }
            }
        }
    }
    if let (Some(start), Some(end)) = (open, duration_ms) {
        if end > start {
            silences.push(TimeWindow::new(start, end));
        }
    }

    SilenceDetection { silences, duration_ms }
}

/// Speech is everything between silences, bounded by the input duration
pub fn speech_from_silences(silences: &[TimeWindow], duration_ms: Option<u64>) -> Vec<TimeWindow> {
    let mut sorted = silences.to_vec();
    sorted.sort_by_key(|w| w.start_ms);

    let mut speech = Vec::new();
    let mut cursor = 0;
    for silence in &sorted {
        if silence.start_ms > cursor {
            speech.push(TimeWindow::new(cursor, silence.start_ms));
        }
        cursor = cursor.max(silence.end_ms);
    }
    if let Some(end) = duration_ms {
        if end > cursor {
            speech.push(TimeWindow::new(cursor, end));
        }
    }
    speech
}

/// Keep only the lines of ffmpeg stderr that say something about the failure
pub fn filter_ffmpeg_stderr(stderr: &str) -> String {
    const BANNER_PREFIXES: &[&str] = &[
        "ffmpeg version",
        "ffprobe version",
        "built with",
        "configuration:",
        "lib",
        "Input #",
        "Metadata:",
        "Duration:",
        "Chapter",
        "Stream #",
        "title",
        "BPS",
        "DURATION",
        "NUMBER_OF",
        "_STATISTICS",
        "Output #",
        "Stream mapping:",
        "Press [q]",
    ];

    let meaningful: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !BANNER_PREFIXES.iter().any(|p| line.starts_with(p)))
        .collect();

    if meaningful.is_empty() {
        "unknown error (no diagnostic output)".to_string()
    } else {
        meaningful.join("\n")
    }
}
