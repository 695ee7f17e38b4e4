use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::cue::Cue;

// @module: Closing credit cue appended after the last subtitle

pub const DEFAULT_CREDIT_GAP_MS: u64 = 3000;
pub const DEFAULT_CREDIT_DURATION_MS: u64 = 3000;

// @struct: How long the credit stays on screen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditDuration {
    Fixed(u64),
    // @field: Characters per second; line breaks do not count
    ReadingSpeed(f64),
}

impl CreditDuration {
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Fixed(0) => Err(anyhow!("Credit duration must be positive")),
            Self::ReadingSpeed(cps) if !cps.is_finite() || *cps <= 0.0 => {
                Err(anyhow!("Credit CPS {} must be a positive number", cps))
            }
            _ => Ok(()),
        }
    }

    /// Display time for `text`, truncated to whole milliseconds
    pub fn for_text(&self, text: &str) -> u64 {
        match *self {
            Self::Fixed(ms) => ms,
            Self::ReadingSpeed(cps) => {
                let chars = text.chars().filter(|&c| c != '\n').count();
                (chars as f64 / cps * 1000.0) as u64
            }
        }
    }
}

impl Default for CreditDuration {
    fn default() -> Self {
        Self::Fixed(DEFAULT_CREDIT_DURATION_MS)
    }
}

// @struct: Credit text and where it goes
#[derive(Debug, Clone, PartialEq)]
pub struct Credit {
    pub text: String,
    // @field: Distance from the end of the last cue
    pub gap_ms: u64,
    pub duration: CreditDuration,
}

impl Credit {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            gap_ms: DEFAULT_CREDIT_GAP_MS,
            duration: CreditDuration::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(anyhow!("Credit text must not be empty"));
        }
        self.duration.validate()
    }

    /// Whether `cue` already carries this credit (case-insensitive)
    pub fn is_in(&self, cue: &Cue) -> bool {
        cue.text.to_lowercase().contains(&self.text.to_lowercase())
    }
}

/// What `append_credit` did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CreditPlacement {
    Added { index: usize, start_ms: u64, end_ms: u64 },
    AlreadyPresent,
    NoCues,
}

/// Append the credit after the last cue, unless that cue already has it.
/// An empty list is left alone: there is no end to place the credit after.
pub fn append_credit(cues: &mut Vec<Cue>, credit: &Credit) -> CreditPlacement {
    let Some(last) = cues.last() else {
        return CreditPlacement::NoCues;
    };
    if credit.is_in(last) {
        return CreditPlacement::AlreadyPresent;
    }

    let start_ms = last.end_ms.saturating_add(credit.gap_ms);
    let end_ms = start_ms.saturating_add(credit.duration.for_text(&credit.text).max(1));
    let index = cues.len() + 1;
    cues.push(Cue::new(index, start_ms, end_ms, credit.text.clone()));
    CreditPlacement::Added { index, start_ms, end_ms }
}
