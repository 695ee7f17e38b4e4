use std::cmp::Ordering;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};

use super::timecode::ms_to_timecode;

// @module: Canonical cue type shared by every pipeline stage

// @const: Inline markup that is never displayed (<i>, </font>, {\an8})
static MARKUP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"</?[a-zA-Z][^>]*>|\{\\[^}]*\}").unwrap()
});

/// Merge hint set by the translation step.
///
/// Travels through files as a `[SC]` / `[NM]` text prefix and is lifted into
/// this field by the codec. Only the merge engine looks at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerMarker {
    #[default]
    SameSpeaker,
    SpeakerChange,
    NoMerge,
}

impl SpeakerMarker {
    /// Text prefix carrying this marker, if any
    pub fn tag(self) -> Option<&'static str> {
        match self {
            Self::SameSpeaker => None,
            Self::SpeakerChange => Some("[SC]"),
            Self::NoMerge => Some("[NM]"),
        }
    }

    /// Split a leading marker tag and the one space after it off `text`.
    /// Further whitespace belongs to the text, so a serialized cue parses back unchanged.
    pub fn extract(text: &str) -> (Self, String) {
        let trimmed = text.trim_start();
        for marker in [Self::SpeakerChange, Self::NoMerge] {
            if let Some(tag) = marker.tag() {
                if let Some(rest) = trimmed.strip_prefix(tag) {
                    return (marker, rest.strip_prefix(' ').unwrap_or(rest).to_string());
                }
            }
        }
        (Self::SameSpeaker, text.to_string())
    }
}

/// Characters per second, with an explicit state for zero-length cues
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cps {
    Finite(f64),
    /// Duration is zero, any text is unreadable
    Unbounded,
}

impl Cps {
    pub fn from_counts(chars: usize, duration_ms: u64) -> Self {
        if duration_ms == 0 {
            return Cps::Unbounded;
        }
        Cps::Finite(chars as f64 * 1000.0 / duration_ms as f64)
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Cps::Finite(v) => Some(v),
            Cps::Unbounded => None,
        }
    }

    pub fn is_unbounded(self) -> bool {
        matches!(self, Cps::Unbounded)
    }

    /// True when reading speed is strictly above `limit`
    pub fn exceeds(self, limit: f64) -> bool {
        match self {
            Cps::Finite(v) => v > limit,
            Cps::Unbounded => true,
        }
    }
}

impl PartialOrd for Cps {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Cps::Unbounded, Cps::Unbounded) => Some(Ordering::Equal),
            (Cps::Unbounded, _) => Some(Ordering::Greater),
            (_, Cps::Unbounded) => Some(Ordering::Less),
            (Cps::Finite(a), Cps::Finite(b)) => a.partial_cmp(b),
        }
    }
}

impl fmt::Display for Cps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cps::Finite(v) => write!(f, "{:.1}", v),
            Cps::Unbounded => write!(f, "inf"),
        }
    }
}

impl Serialize for Cps {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cps::Finite(v) => serializer.serialize_f64((v * 10.0).round() / 10.0),
            Cps::Unbounded => serializer.serialize_none(),
        }
    }
}

/// Half-open time interval in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_ms: u64,
    pub end_ms: u64,
}

impl TimeWindow {
    pub fn new(start_ms: u64, end_ms: u64) -> Self {
        Self { start_ms, end_ms }
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    pub fn intersects(&self, other: &TimeWindow) -> bool {
        self.start_ms < other.end_ms && other.start_ms < self.end_ms
    }

    /// Length of the shared part of two windows
    pub fn overlap_ms(&self, other: &TimeWindow) -> u64 {
        let start = self.start_ms.max(other.start_ms);
        let end = self.end_ms.min(other.end_ms);
        end.saturating_sub(start)
    }

    /// Widen on both sides by `tolerance_ms`
    pub fn expand(&self, tolerance_ms: u64) -> TimeWindow {
        TimeWindow {
            start_ms: self.start_ms.saturating_sub(tolerance_ms),
            end_ms: self.end_ms.saturating_add(tolerance_ms),
        }
    }

    /// Smallest window covering every window in `windows`
    pub fn span<'a, I: IntoIterator<Item = &'a TimeWindow>>(windows: I) -> Option<TimeWindow> {
        windows.into_iter().fold(None, |acc, w| match acc {
            None => Some(*w),
            Some(a) => Some(TimeWindow::new(a.start_ms.min(w.start_ms), a.end_ms.max(w.end_ms))),
        })
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --> {}", ms_to_timecode(self.start_ms), ms_to_timecode(self.end_ms))
    }
}

/// Width of one rendered line: markup tags do not count
pub fn display_width(line: &str) -> usize {
    MARKUP_REGEX.replace_all(line, "").chars().count()
}

/// Characters a viewer has to read, newlines excluded and any
/// ellipsis (`...` or `…`) counted once
pub fn reading_chars(text: &str) -> usize {
    text.split('\n')
        .map(|line| {
            let stripped = MARKUP_REGEX.replace_all(line, "");
            stripped.replace("...", "\u{2026}").chars().count()
        })
        .sum()
}

// @struct: Single timed display unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    // @field: Ordinal, only meaningful right after renumbering
    pub index: usize,

    pub start_ms: u64,

    pub end_ms: u64,

    // @field: Display text, lines separated by '\n'
    pub text: String,

    #[serde(default)]
    pub speaker_marker: SpeakerMarker,
}

impl Cue {
    pub fn new(index: usize, start_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        Self {
            index,
            start_ms,
            end_ms,
            text: text.into(),
            speaker_marker: SpeakerMarker::SameSpeaker,
        }
    }

    pub fn with_marker(mut self, marker: SpeakerMarker) -> Self {
        self.speaker_marker = marker;
        self
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    pub fn char_count(&self) -> usize {
        reading_chars(&self.text)
    }

    pub fn cps(&self) -> Cps {
        Cps::from_counts(self.char_count(), self.duration_ms())
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n')
    }

    pub fn line_count(&self) -> usize {
        self.lines().count()
    }

    pub fn line_widths(&self) -> Vec<usize> {
        self.lines().map(display_width).collect()
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_ms, self.end_ms)
    }

    /// Two lines where the second opens with a speaker dash
    pub fn is_dual_speaker(&self) -> bool {
        is_dual_speaker_text(&self.text)
    }

    pub fn format_timing(&self) -> String {
        format!("{} --> {}", ms_to_timecode(self.start_ms), ms_to_timecode(self.end_ms))
    }
}

pub fn is_dual_speaker_text(text: &str) -> bool {
    let lines: Vec<&str> = text.split('\n').collect();
    lines.len() == 2 && lines[1].trim_start().starts_with('-')
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.index)?;
        writeln!(f, "{}", self.format_timing())?;
        write!(f, "{}", self.text)
    }
}
