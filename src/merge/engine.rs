use log::{debug, trace};

use crate::subtitle_processor::cue::{is_dual_speaker_text, Cue, SpeakerMarker};
use crate::validation::constraints::ConstraintTable;
use crate::validation::line_breaking::{collapse_whitespace, has_midline_sentence_end, LineBreaker};

use super::record::{MergeParameters, MergeRecord, MergeReport};

/// Merged cue sequence plus one provenance record per output cue
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub cues: Vec<Cue>,
    pub records: Vec<MergeRecord>,
}

impl MergePlan {
    pub fn report(&self, source_cues: usize, parameters: MergeParameters) -> MergeReport {
        MergeReport::new(source_cues, parameters, self.records.clone())
    }
}

/// Decides which adjacent cues become one display unit
pub struct MergeEngine {
    table: ConstraintTable,
    breaker: LineBreaker,
}

impl MergeEngine {
    pub fn new(table: &ConstraintTable) -> Self {
        Self {
            table: *table,
            breaker: LineBreaker::new(table),
        }
    }

    pub fn parameters(&self, gap_threshold_ms: u64, max_duration_ms: u64) -> MergeParameters {
        MergeParameters {
            gap_threshold_ms,
            max_duration_ms,
            max_lines: self.table.max_lines,
            max_chars: self.table.max_chars_per_line,
        }
    }

    /// Scan left to right and grow each group while the next cue
    ///
    /// - follows within `0..=gap_threshold_ms`
    /// - keeps the group within `max_duration_ms`
    /// - carries no no-merge marker
    /// - still reflows into the line limits together with the group
    ///
    /// A speaker change may only join as the second cue and closes the group.
    /// Input is expected sorted by start time.
    pub fn plan_merges(&self, cues: &[Cue], gap_threshold_ms: u64, max_duration_ms: u64) -> MergePlan {
        let mut merged = Vec::with_capacity(cues.len());
        let mut records = Vec::with_capacity(cues.len());

        let mut i = 0;
        while i < cues.len() {
            let head = &cues[i];
            let mut text = head.text.clone();
            let mut j = i + 1;

            if head.speaker_marker != SpeakerMarker::NoMerge {
                while j < cues.len() {
                    let prev = &cues[j - 1];
                    let next = &cues[j];
                    if next.start_ms < prev.end_ms || next.start_ms - prev.end_ms > gap_threshold_ms {
                        break;
                    }
                    if next.end_ms.saturating_sub(head.start_ms) > max_duration_ms {
                        break;
                    }
                    let speaker_change = match next.speaker_marker {
                        SpeakerMarker::NoMerge => break,
                        SpeakerMarker::SpeakerChange if j - i > 1 => break,
                        SpeakerMarker::SpeakerChange => true,
                        SpeakerMarker::SameSpeaker => false,
                    };
                    let Some(combined) = self.combine(&text, &next.text, speaker_change) else {
                        trace!("Cue at {}ms does not fit with group at {}ms", next.start_ms, head.start_ms);
                        break;
                    };
                    text = combined;
                    j += 1;
                    if speaker_change {
                        break;
                    }
                }
            }

            let group = &cues[i..j];
            let last = &group[group.len() - 1];
            let output = Cue {
                index: merged.len() + 1,
                start_ms: head.start_ms,
                end_ms: last.end_ms,
                text,
                speaker_marker: head.speaker_marker,
            };
            let record = if group.len() == 1 {
                MergeRecord::singleton(output.window(), &output.text)
            } else {
                debug!(
                    "Merged {} cues into {} ({} chars)",
                    group.len(),
                    output.format_timing(),
                    output.char_count()
                );
                MergeRecord::from_sources(group.iter().map(Cue::window).collect(), &output.text)
            };

            merged.push(output);
            records.push(record);
            i = j;
        }

        MergePlan {
            cues: merged,
            records,
        }
    }

    /// Combined text of the group so far and the next cue, if it fits
    fn combine(&self, current: &str, next: &str, speaker_change: bool) -> Option<String> {
        if is_dual_speaker_text(current) || is_dual_speaker_text(next) {
            return None;
        }

        if speaker_change {
            let first = collapse_whitespace(current);
            let second = collapse_whitespace(next.trim_start().trim_start_matches('-'));
            return self.breaker.reflow(&format!("{}\n-{}", first, second));
        }

        let mut first = collapse_whitespace(current);
        let mut second = collapse_whitespace(next);
        if let Some(stripped) = first.strip_suffix("...") {
            first = stripped.trim_end().to_string();
        }
        if let Some(stripped) = second.strip_prefix("...") {
            second = stripped.trim_start().to_string();
        }

        let reflowed = self.breaker.reflow(&format!("{} {}", first, second))?;
        if has_midline_sentence_end(&reflowed) {
            return None;
        }
        Some(reflowed)
    }
}
