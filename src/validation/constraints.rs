/*!
 * Constraint table and pure cue evaluation.
 *
 * Every threshold the pipeline uses (reading speed, line geometry, duration
 * and gap) lives in one `ConstraintTable`, selected by frame rate and
 * optionally overridden from configuration. Merge, re-timing and the
 * structural validator all ask this module instead of keeping their own
 * copies of the numbers.
 */

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::subtitle_processor::cue::{display_width, Cps, Cue};

/// Source frame rate; selects the frame-aligned gap and duration minimums
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrameRate {
    #[serde(rename = "24")]
    Fps24,
    #[default]
    #[serde(rename = "25")]
    Fps25,
}

impl FrameRate {
    /// Nearest supported rate for a measured fps (23.976 counts as 24)
    pub fn from_fps(fps: f64) -> Self {
        if fps < 24.5 { FrameRate::Fps24 } else { FrameRate::Fps25 }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameRate::Fps24 => write!(f, "24fps"),
            FrameRate::Fps25 => write!(f, "25fps"),
        }
    }
}

/// Thresholds a cue sequence is checked against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstraintTable {
    pub cps_optimal: f64,
    pub cps_hard_limit: f64,
    pub cps_emergency_max: f64,
    pub max_chars_per_line: usize,
    pub max_lines: usize,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
    pub min_gap_ms: u64,
}

impl ConstraintTable {
    pub fn for_frame_rate(frame_rate: FrameRate) -> Self {
        match frame_rate {
            FrameRate::Fps24 => Self {
                cps_optimal: 12.0,
                cps_hard_limit: 17.0,
                cps_emergency_max: 20.0,
                max_chars_per_line: 42,
                max_lines: 2,
                // 20 frames
                min_duration_ms: 834,
                max_duration_ms: 8000,
                // 3 frames
                min_gap_ms: 125,
            },
            FrameRate::Fps25 => Self {
                cps_optimal: 12.0,
                cps_hard_limit: 17.0,
                cps_emergency_max: 20.0,
                max_chars_per_line: 42,
                max_lines: 2,
                min_duration_ms: 830,
                max_duration_ms: 8000,
                min_gap_ms: 120,
            },
        }
    }

    /// Evaluate one cue against every constraint
    pub fn evaluate(&self, cue: &Cue) -> Evaluation {
        let cps = cue.cps();
        let line_lengths = cue.line_widths();
        let duration_ms = cue.duration_ms();
        let mut violations = Vec::new();

        if cue.text.trim().is_empty() {
            violations.push(Violation::new(ConstraintKind::EmptyText, 0.0, 1.0));
        }

        let cps_value = cps.value().unwrap_or(f64::INFINITY);
        if cps.exceeds(self.cps_emergency_max) {
            violations.push(Violation::new(ConstraintKind::CpsEmergency, cps_value, self.cps_emergency_max));
        } else if cps.exceeds(self.cps_hard_limit) {
            violations.push(Violation::new(ConstraintKind::CpsHardLimit, cps_value, self.cps_hard_limit));
        }

        if line_lengths.len() > self.max_lines {
            violations.push(Violation::new(
                ConstraintKind::LineCount,
                line_lengths.len() as f64,
                self.max_lines as f64,
            ));
        }
        for (i, &len) in line_lengths.iter().enumerate() {
            if len > self.max_chars_per_line {
                let mut v = Violation::new(ConstraintKind::LineLength, len as f64, self.max_chars_per_line as f64);
                v.line = Some(i + 1);
                violations.push(v);
            }
        }

        if duration_ms < self.min_duration_ms {
            violations.push(Violation::new(ConstraintKind::MinDuration, duration_ms as f64, self.min_duration_ms as f64));
        }
        if duration_ms > self.max_duration_ms {
            violations.push(Violation::new(ConstraintKind::MaxDuration, duration_ms as f64, self.max_duration_ms as f64));
        }

        Evaluation {
            cps,
            line_lengths,
            duration_ms,
            violations,
        }
    }

    pub fn fits_single_line(&self, text: &str) -> bool {
        !text.contains('\n') && display_width(text.trim()) <= self.max_chars_per_line
    }

    /// Line count and every line width within limits
    pub fn fits_lines(&self, text: &str) -> bool {
        let lines: Vec<&str> = text.split('\n').collect();
        lines.len() <= self.max_lines && lines.iter().all(|l| display_width(l) <= self.max_chars_per_line)
    }

    /// `prev` ends early enough before `next` starts
    pub fn gap_ok(&self, prev: &Cue, next: &Cue) -> bool {
        prev.end_ms + self.min_gap_ms <= next.start_ms
    }

    /// Latest end a cue may have when followed by a cue starting at `next_start_ms`
    pub fn latest_end_before(&self, next_start_ms: u64) -> u64 {
        next_start_ms.saturating_sub(self.min_gap_ms)
    }
}

impl Default for ConstraintTable {
    fn default() -> Self {
        Self::for_frame_rate(FrameRate::default())
    }
}

/// Per-field overrides read from configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cps_optimal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cps_hard_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cps_emergency_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chars_per_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_lines: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_gap_ms: Option<u64>,
}

impl ConstraintOverrides {
    pub fn apply(&self, mut table: ConstraintTable) -> ConstraintTable {
        if let Some(v) = self.cps_optimal { table.cps_optimal = v; }
        if let Some(v) = self.cps_hard_limit { table.cps_hard_limit = v; }
        if let Some(v) = self.cps_emergency_max { table.cps_emergency_max = v; }
        if let Some(v) = self.max_chars_per_line { table.max_chars_per_line = v; }
        if let Some(v) = self.max_lines { table.max_lines = v; }
        if let Some(v) = self.min_duration_ms { table.min_duration_ms = v; }
        if let Some(v) = self.max_duration_ms { table.max_duration_ms = v; }
        if let Some(v) = self.min_gap_ms { table.min_gap_ms = v; }
        table
    }
}

/// Constraint that a cue can break
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    CpsHardLimit,
    CpsEmergency,
    LineLength,
    LineCount,
    MinDuration,
    MaxDuration,
    EmptyText,
}

/// One broken constraint with the numbers behind it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub constraint: ConstraintKind,
    pub actual: f64,
    pub limit: f64,
    /// 1-based line for line-length violations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Violation {
    fn new(constraint: ConstraintKind, actual: f64, limit: f64) -> Self {
        Self { constraint, actual, limit, line: None }
    }

    /// How far past the limit the cue is
    pub fn margin(&self) -> f64 {
        (self.actual - self.limit).abs()
    }
}

fn number(v: f64) -> String {
    if v.is_infinite() {
        "inf".to_string()
    } else if v.fract() == 0.0 {
        format!("{:.0}", v)
    } else {
        format!("{:.1}", v)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.constraint {
            ConstraintKind::CpsHardLimit => {
                write!(f, "CPS {:.1} exceeds hard limit {}", self.actual, number(self.limit))
            }
            ConstraintKind::CpsEmergency => {
                write!(f, "CPS {:.1} exceeds emergency maximum {}", self.actual, number(self.limit))
            }
            ConstraintKind::LineLength => write!(
                f,
                "Line {} has {} characters, limit {}",
                self.line.unwrap_or(0),
                number(self.actual),
                number(self.limit)
            ),
            ConstraintKind::LineCount => {
                write!(f, "{} lines exceeds limit {}", number(self.actual), number(self.limit))
            }
            ConstraintKind::MinDuration => write!(
                f,
                "Duration {}ms is below minimum {}ms",
                number(self.actual),
                number(self.limit)
            ),
            ConstraintKind::MaxDuration => write!(
                f,
                "Duration {}ms exceeds maximum {}ms",
                number(self.actual),
                number(self.limit)
            ),
            ConstraintKind::EmptyText => write!(f, "Cue has no text"),
        }
    }
}

/// Everything `evaluate` knows about a cue
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub cps: Cps,
    pub line_lengths: Vec<usize>,
    pub duration_ms: u64,
    pub violations: Vec<Violation>,
}

impl Evaluation {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn has(&self, kind: ConstraintKind) -> bool {
        self.violations.iter().any(|v| v.constraint == kind)
    }
}

/// Free-function form of [`ConstraintTable::evaluate`]
pub fn evaluate(cue: &Cue, table: &ConstraintTable) -> Evaluation {
    table.evaluate(cue)
}

/// Free-function form of [`ConstraintTable::fits_single_line`]
pub fn fits_single_line(text: &str, table: &ConstraintTable) -> bool {
    table.fits_single_line(text)
}
