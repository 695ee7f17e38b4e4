/*!
 * Structural validation and repair of a cue sequence.
 *
 * Checks ordering, overlaps, minimum gaps and line geometry, and repairs
 * what can be repaired without inventing or dropping content:
 *
 * - overlaps and short gaps are resolved by pulling the earlier cue's end
 *   back to `next.start - min_gap`; when that would leave a zero or negative
 *   duration the cue is left alone and reported as unfixable
 * - over-long lines and cues with too many lines are re-broken, never
 *   truncated
 * - speaker dashes and ellipses are normalised
 *
 * CPS is not this module's concern; see `retiming`.
 */

use log::debug;
use serde::Serialize;

use crate::subtitle_processor::cue::{is_dual_speaker_text, Cue};
use super::constraints::{ConstraintKind, ConstraintTable, Violation};
use super::line_breaking::LineBreaker;

/// Earlier cue still on screen when the next one starts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlapIssue {
    pub position: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub next_start_ms: u64,
    pub overlap_ms: u64,
}

/// Cues that do not overlap but sit closer than the minimum gap
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapIssue {
    pub position: usize,
    pub start_ms: u64,
    pub gap_ms: u64,
    pub min_gap_ms: u64,
}

/// Line count or line length breach
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineIssue {
    pub position: usize,
    pub start_ms: u64,
    pub violation: Violation,
}

/// Cue that starts before its predecessor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderIssue {
    pub position: usize,
    pub start_ms: u64,
    pub previous_start_ms: u64,
}

/// Everything `validate` found, keyed by position and start time
#[derive(Debug, Clone, Default, Serialize)]
pub struct StructuralReport {
    pub overlaps: Vec<OverlapIssue>,
    pub gap_violations: Vec<GapIssue>,
    pub line_violations: Vec<LineIssue>,
    pub order_violations: Vec<OrderIssue>,
    /// Start times of cues whose end is not after their start
    pub invalid_ranges: Vec<u64>,
}

impl StructuralReport {
    pub fn is_clean(&self) -> bool {
        self.issue_count() == 0
    }

    pub fn issue_count(&self) -> usize {
        self.overlaps.len()
            + self.gap_violations.len()
            + self.line_violations.len()
            + self.order_violations.len()
            + self.invalid_ranges.len()
    }
}

/// A change `fix` made
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructuralFix {
    Reordered { moved: usize },
    EndTrimmed { start_ms: u64, old_end_ms: u64, new_end_ms: u64 },
    Reflowed { start_ms: u64, lines_before: usize, lines_after: usize },
    SpeakerDash { start_ms: u64 },
    Typography { start_ms: u64 },
}

/// A problem `fix` refused to paper over
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Unfixable {
    /// Resolving the overlap would need `end_ms <= start_ms`
    WouldTruncate { start_ms: u64, end_ms: u64, next_start_ms: u64 },
    /// No legal two-line break keeps the text within limits
    LineBreak { start_ms: u64, text: String },
}

impl std::fmt::Display for Unfixable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unfixable::WouldTruncate { start_ms, end_ms, next_start_ms } => write!(
                f,
                "Cue at {}ms (ends {}ms) overlaps next cue at {}ms and cannot be shortened",
                start_ms, end_ms, next_start_ms
            ),
            Unfixable::LineBreak { start_ms, .. } => {
                write!(f, "Cue at {}ms cannot be broken into valid lines", start_ms)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FixOutcome {
    pub cues: Vec<Cue>,
    pub fixes: Vec<StructuralFix>,
    pub unfixable: Vec<Unfixable>,
}

/// Text normalisation switched on from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypographyRules {
    /// `…` becomes `...`
    pub normalize_ellipsis: bool,
    /// `!` and `;` become `.`
    pub replace_forbidden_punctuation: bool,
}

impl Default for TypographyRules {
    fn default() -> Self {
        Self {
            normalize_ellipsis: true,
            replace_forbidden_punctuation: false,
        }
    }
}

/// Validator/repairer bound to one constraint table
pub struct StructuralValidator {
    table: ConstraintTable,
    breaker: LineBreaker,
    typography: TypographyRules,
}

impl StructuralValidator {
    pub fn new(table: ConstraintTable) -> Self {
        Self {
            breaker: LineBreaker::new(&table),
            table,
            typography: TypographyRules::default(),
        }
    }

    pub fn with_typography(mut self, typography: TypographyRules) -> Self {
        self.typography = typography;
        self
    }

    /// Report structural problems without changing anything
    pub fn validate(&self, cues: &[Cue]) -> StructuralReport {
        let mut report = StructuralReport::default();

        for (position, cue) in cues.iter().enumerate() {
            if cue.end_ms <= cue.start_ms {
                report.invalid_ranges.push(cue.start_ms);
            }
            let eval = self.table.evaluate(cue);
            for violation in eval.violations {
                if matches!(violation.constraint, ConstraintKind::LineCount | ConstraintKind::LineLength) {
                    report.line_violations.push(LineIssue {
                        position,
                        start_ms: cue.start_ms,
                        violation,
                    });
                }
            }
        }

        for (position, pair) in cues.windows(2).enumerate() {
            let (cur, next) = (&pair[0], &pair[1]);
            if next.start_ms < cur.start_ms {
                report.order_violations.push(OrderIssue {
                    position: position + 1,
                    start_ms: next.start_ms,
                    previous_start_ms: cur.start_ms,
                });
                continue;
            }
            if cur.end_ms > next.start_ms {
                report.overlaps.push(OverlapIssue {
                    position,
                    start_ms: cur.start_ms,
                    end_ms: cur.end_ms,
                    next_start_ms: next.start_ms,
                    overlap_ms: cur.end_ms - next.start_ms,
                });
            } else if !self.table.gap_ok(cur, next) {
                report.gap_violations.push(GapIssue {
                    position,
                    start_ms: cur.start_ms,
                    gap_ms: next.start_ms - cur.end_ms,
                    min_gap_ms: self.table.min_gap_ms,
                });
            }
        }

        debug!(
            "Structural validation: {} cues, {} overlaps, {} gap, {} line, {} order issues",
            cues.len(),
            report.overlaps.len(),
            report.gap_violations.len(),
            report.line_violations.len(),
            report.order_violations.len()
        );
        report
    }

    /// Repair what can be repaired safely. Running it twice changes nothing
    /// the second time.
    pub fn fix(&self, cues: &[Cue]) -> FixOutcome {
        let mut fixed = cues.to_vec();
        let mut fixes = Vec::new();
        let mut unfixable = Vec::new();

        fixed.sort_by_key(|c| (c.start_ms, c.end_ms));
        let moved = fixed.iter().zip(cues).filter(|(a, b)| a != b).count();
        if moved > 0 {
            fixes.push(StructuralFix::Reordered { moved });
        }

        for cue in fixed.iter_mut() {
            self.fix_text(cue, &mut fixes, &mut unfixable);
        }

        for i in 0..fixed.len().saturating_sub(1) {
            let next_start = fixed[i + 1].start_ms;
            let cue = &mut fixed[i];
            if cue.end_ms + self.table.min_gap_ms <= next_start {
                continue;
            }
            let new_end = self.table.latest_end_before(next_start);
            if new_end > cue.start_ms {
                fixes.push(StructuralFix::EndTrimmed {
                    start_ms: cue.start_ms,
                    old_end_ms: cue.end_ms,
                    new_end_ms: new_end,
                });
                cue.end_ms = new_end;
            } else {
                unfixable.push(Unfixable::WouldTruncate {
                    start_ms: cue.start_ms,
                    end_ms: cue.end_ms,
                    next_start_ms: next_start,
                });
            }
        }

        if !fixes.is_empty() || !unfixable.is_empty() {
            debug!("Structural fix: {} changes, {} unfixable", fixes.len(), unfixable.len());
        }
        FixOutcome {
            cues: fixed,
            fixes,
            unfixable,
        }
    }

    fn fix_text(&self, cue: &mut Cue, fixes: &mut Vec<StructuralFix>, unfixable: &mut Vec<Unfixable>) {
        let typographic = self.apply_typography(&cue.text);
        if typographic != cue.text {
            cue.text = typographic;
            fixes.push(StructuralFix::Typography { start_ms: cue.start_ms });
        }

        if is_dual_speaker_text(&cue.text) {
            let normalised = normalize_speaker_dashes(&cue.text);
            if normalised != cue.text {
                cue.text = normalised;
                fixes.push(StructuralFix::SpeakerDash { start_ms: cue.start_ms });
            }
        }

        if self.table.fits_lines(&cue.text) {
            return;
        }
        let lines_before = cue.line_count();
        match self.breaker.reflow(&cue.text) {
            Some(reflowed) => {
                cue.text = reflowed;
                fixes.push(StructuralFix::Reflowed {
                    start_ms: cue.start_ms,
                    lines_before,
                    lines_after: cue.line_count(),
                });
            }
            None => unfixable.push(Unfixable::LineBreak {
                start_ms: cue.start_ms,
                text: cue.text.clone(),
            }),
        }
    }

    fn apply_typography(&self, text: &str) -> String {
        let mut result = text.to_string();
        if self.typography.normalize_ellipsis {
            result = result.replace('\u{2026}', "...");
        }
        if self.typography.replace_forbidden_punctuation {
            result = result.replace(['!', ';'], ".");
        }
        result
    }
}

/// First line without a dash, second line `-Text` with no space after the dash
pub fn normalize_speaker_dashes(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() != 2 {
        return text.to_string();
    }
    let first = lines[0].trim_start().trim_start_matches('-').trim_start();
    let second = lines[1].trim_start().trim_start_matches('-').trim_start();
    format!("{}\n-{}", first, second)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> StructuralValidator {
        StructuralValidator::new(ConstraintTable::default())
    }

    #[test]
    fn test_validate_withOverlapAndShortGap_shouldReportBoth() {
        let cues = vec![
            Cue::new(1, 0, 2_100, "Een"),
            Cue::new(2, 2_000, 3_000, "Twee"),
            Cue::new(3, 3_050, 4_000, "Drie"),
        ];
        let report = validator().validate(&cues);
        assert_eq!(report.overlaps.len(), 1);
        assert_eq!(report.overlaps[0].overlap_ms, 100);
        assert_eq!(report.gap_violations.len(), 1);
        assert_eq!(report.gap_violations[0].gap_ms, 50);
    }

    #[test]
    fn test_fix_withOverlap_shouldPullEndBack() {
        let cues = vec![Cue::new(1, 0, 2_500, "Een"), Cue::new(2, 2_000, 3_000, "Twee")];
        let outcome = validator().fix(&cues);
        assert_eq!(outcome.cues[0].end_ms, 1_880);
        assert!(outcome.unfixable.is_empty());
        assert!(validator().validate(&outcome.cues).overlaps.is_empty());
    }

    #[test]
    fn test_fix_withImpossibleOverlap_shouldFlagAndLeaveCue() {
        let cues = vec![Cue::new(1, 1_000, 3_000, "Een"), Cue::new(2, 1_050, 4_000, "Twee")];
        let outcome = validator().fix(&cues);
        assert_eq!(outcome.cues[0].end_ms, 3_000);
        assert!(matches!(outcome.unfixable[0], Unfixable::WouldTruncate { start_ms: 1_000, .. }));
    }

    #[test]
    fn test_fix_withThreeLines_shouldRebreakWithoutLosingText() {
        let cues = vec![Cue::new(1, 0, 5_000, "Ik weet\nniet wat\nje bedoelt.")];
        let outcome = validator().fix(&cues);
        assert_eq!(outcome.cues[0].text, "Ik weet niet wat je bedoelt.");
    }

    #[test]
    fn test_fix_withUnsortedInput_shouldSort() {
        let cues = vec![Cue::new(1, 5_000, 6_000, "B"), Cue::new(2, 1_000, 2_000, "A")];
        let outcome = validator().fix(&cues);
        assert_eq!(outcome.cues[0].text, "A");
        assert!(matches!(outcome.fixes[0], StructuralFix::Reordered { moved: 2 }));
    }

    #[test]
    fn test_fix_withSpeakerDashes_shouldNormalise() {
        let cues = vec![Cue::new(1, 0, 3_000, "- Waar ga je heen?\n- Naar huis.")];
        let outcome = validator().fix(&cues);
        assert_eq!(outcome.cues[0].text, "Waar ga je heen?\n-Naar huis.");
    }

    #[test]
    fn test_fix_calledTwice_shouldBeIdempotent() {
        let cues = vec![
            Cue::new(1, 0, 2_500, "Een heel lange regel die echt niet op een enkele regel past"),
            Cue::new(2, 2_000, 3_000, "Wacht\u{2026}"),
            Cue::new(3, 2_950, 3_500, "Drie"),
        ];
        let first = validator().fix(&cues);
        let second = validator().fix(&first.cues);
        assert_eq!(first.cues, second.cues);
        assert!(second.fixes.is_empty());
    }
}
