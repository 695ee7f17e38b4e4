/*!
 * End-time adjustment.
 *
 * Every operation here moves `end_ms` later and nothing else. Start times
 * are the join key the cross-mapping relies on and are never touched. All
 * operations keep `end + min_gap <= next.start` and never grow a cue past
 * the maximum duration; an adjustment that cannot satisfy both is skipped,
 * not clamped into something else.
 */

use log::debug;
use serde::{Deserialize, Serialize};

use crate::subtitle_processor::cue::{Cps, Cue, TimeWindow};
use crate::validation::constraints::ConstraintTable;

/// Padding added after detected speech end
const SPEECH_END_PADDING_MS: u64 = 100;

/// Extensions shorter than this are not worth a change
const MIN_SPEECH_EXTENSION_MS: u64 = 50;

/// When a cue is slow enough to be left alone, and how slow to make it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpsTarget {
    /// Cues at or below this CPS are not extended
    pub trigger_cps: f64,
    /// CPS an extension aims for
    pub target_cps: f64,
}

impl Default for CpsTarget {
    fn default() -> Self {
        Self {
            trigger_cps: 13.0,
            target_cps: 12.5,
        }
    }
}

/// One end-time change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extension {
    pub start_ms: u64,
    pub old_end_ms: u64,
    pub new_end_ms: u64,
    pub cps_before: Cps,
    pub cps_after: Cps,
}

impl Extension {
    fn apply(cue: &mut Cue, new_end_ms: u64) -> Self {
        let cps_before = cue.cps();
        let old_end_ms = cue.end_ms;
        cue.end_ms = new_end_ms;
        Self {
            start_ms: cue.start_ms,
            old_end_ms,
            new_end_ms,
            cps_before,
            cps_after: cue.cps(),
        }
    }

    pub fn extension_ms(&self) -> u64 {
        self.new_end_ms - self.old_end_ms
    }
}

/// A cue that timing alone cannot bring under the hard CPS limit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CondensationNeeded {
    pub index: usize,
    pub start_ms: u64,
    pub cps: Cps,
    pub chars: usize,
    pub duration_ms: u64,
    // @field: Character budget that would meet the hard limit at this duration
    pub max_chars: usize,
    // @field: Above the emergency maximum
    pub emergency: bool,
}

/// Latest end `cues[i]` may take given the cue after it
fn end_limit(cues: &[Cue], i: usize, min_gap_ms: u64, max_duration_ms: u64) -> u64 {
    let duration_limit = cues[i].start_ms.saturating_add(max_duration_ms);
    match cues.get(i + 1) {
        Some(next) => duration_limit.min(next.start_ms.saturating_sub(min_gap_ms)),
        None => duration_limit,
    }
}

/// Close gaps below `gap_threshold_ms` by pulling the end up to `next.start - min_gap`.
///
/// Skipped when that is not later than the current end or would exceed
/// `max_duration_ms`.
pub fn close_small_gaps(
    cues: &mut [Cue],
    gap_threshold_ms: u64,
    min_gap_ms: u64,
    max_duration_ms: u64,
) -> Vec<Extension> {
    let mut changes = Vec::new();
    for i in 0..cues.len().saturating_sub(1) {
        let next_start = cues[i + 1].start_ms;
        let cue = &cues[i];
        if next_start <= cue.end_ms || next_start - cue.end_ms >= gap_threshold_ms {
            continue;
        }
        let new_end = next_start.saturating_sub(min_gap_ms);
        if new_end > cue.end_ms && new_end - cue.start_ms <= max_duration_ms {
            changes.push(Extension::apply(&mut cues[i], new_end));
        }
    }
    if !changes.is_empty() {
        debug!("Closed {} gaps below {}ms", changes.len(), gap_threshold_ms);
    }
    changes
}

/// Lengthen fast cues toward `target.target_cps` using the following gap.
///
/// For cues above `target.trigger_cps` the end moves to
/// `min(start + needed, next.start - min_gap, start + max_duration)` where
/// `needed = ceil(chars / target * 1000)`. CPS never increases.
pub fn extend_for_cps(
    cues: &mut [Cue],
    target: CpsTarget,
    min_gap_ms: u64,
    max_duration_ms: u64,
) -> Vec<Extension> {
    let mut changes = Vec::new();
    if target.target_cps <= 0.0 {
        return changes;
    }

    for i in 0..cues.len() {
        let cue = &cues[i];
        if !cue.cps().exceeds(target.trigger_cps) {
            continue;
        }
        let needed_ms = (cue.char_count() as f64 * 1000.0 / target.target_cps).ceil() as u64;
        let new_end = cue.start_ms.saturating_add(needed_ms).min(end_limit(cues, i, min_gap_ms, max_duration_ms));
        if new_end > cue.end_ms {
            changes.push(Extension::apply(&mut cues[i], new_end));
        }
    }
    if !changes.is_empty() {
        debug!("Extended {} cues for reading speed", changes.len());
    }
    changes
}

/// Extend cues whose speech runs past their end.
///
/// `speech` is a sorted list of speech-activity intervals. A cue is
/// extended to the end of the last interval it overlaps (plus a small
/// padding), bounded by `max_extension_ms` and the usual gap/duration limits.
pub fn extend_to_speech(
    cues: &mut [Cue],
    speech: &[TimeWindow],
    min_gap_ms: u64,
    max_duration_ms: u64,
    max_extension_ms: u64,
) -> Vec<Extension> {
    let mut changes = Vec::new();
    for i in 0..cues.len() {
        let cue = &cues[i];
        let window = cue.window();
        let Some(speech_end) = speech
            .iter()
            .filter(|s| s.intersects(&window))
            .map(|s| s.end_ms)
            .max()
        else {
            continue;
        };
        if speech_end <= cue.end_ms {
            continue;
        }

        let limit = end_limit(cues, i, min_gap_ms, max_duration_ms).min(cue.end_ms.saturating_add(max_extension_ms));
        let new_end = (speech_end + SPEECH_END_PADDING_MS).min(limit);
        if new_end > cue.end_ms + MIN_SPEECH_EXTENSION_MS {
            changes.push(Extension::apply(&mut cues[i], new_end));
        }
    }
    if !changes.is_empty() {
        debug!("Extended {} cues to speech end", changes.len());
    }
    changes
}

/// Cues still above the hard limit after re-timing
pub fn condensation_needed(cues: &[Cue], table: &ConstraintTable) -> Vec<CondensationNeeded> {
    cues.iter()
        .filter(|c| c.cps().exceeds(table.cps_hard_limit))
        .map(|c| CondensationNeeded {
            index: c.index,
            start_ms: c.start_ms,
            cps: c.cps(),
            chars: c.char_count(),
            duration_ms: c.duration_ms(),
            max_chars: (table.cps_hard_limit * c.duration_ms() as f64 / 1000.0).floor() as usize,
            emergency: c.cps().exceeds(table.cps_emergency_max),
        })
        .collect()
}

/// Settings for a full re-timing pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetimingPlan {
    pub close_gaps: bool,
    pub gap_threshold_ms: u64,
    pub target: CpsTarget,
    pub max_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetimeOutcome {
    #[serde(skip)]
    pub cues: Vec<Cue>,
    pub gaps_closed: Vec<Extension>,
    pub extended: Vec<Extension>,
    pub condensation_needed: Vec<CondensationNeeded>,
}

impl RetimeOutcome {
    pub fn emergency_count(&self) -> usize {
        self.condensation_needed.iter().filter(|c| c.emergency).count()
    }
}

/// Gap closing, then CPS extension, then the condensation report
pub fn retime(cues: &[Cue], plan: &RetimingPlan, table: &ConstraintTable) -> RetimeOutcome {
    let mut cues = cues.to_vec();
    let gaps_closed = if plan.close_gaps {
        close_small_gaps(&mut cues, plan.gap_threshold_ms, table.min_gap_ms, plan.max_duration_ms)
    } else {
        Vec::new()
    };
    let extended = extend_for_cps(&mut cues, plan.target, table.min_gap_ms, plan.max_duration_ms);
    let condensation_needed = condensation_needed(&cues, table);

    RetimeOutcome {
        cues,
        gaps_closed,
        extended,
        condensation_needed,
    }
}
