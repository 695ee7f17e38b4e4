/*!
 * Read-only diagnostics over a cue sequence: reading-speed statistics and
 * line-balance checks for two-line cues.
 */

use serde::Serialize;

use crate::subtitle_processor::cue::{display_width, Cps, Cue};
use super::constraints::ConstraintTable;
use super::line_breaking::{binds_forward, collapse_whitespace, LineBreaker};

const PREVIEW_CHARS: usize = 50;
const ORPHAN_MIN_CHARS: usize = 8;
const ORPHAN_MAX_WORDS: usize = 2;
const TOP_HEAVY_RATIO: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        format!("{}...", text.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CueCps {
    pub index: usize,
    pub start_ms: u64,
    pub cps: Cps,
    pub chars: usize,
    pub duration_ms: u64,
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpsStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub p90: f64,
    pub p95: f64,
    pub above_soft_ceiling: usize,
    pub above_hard_limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CpsViolation {
    pub index: usize,
    pub start_ms: u64,
    pub cps: Cps,
    pub limit: f64,
    pub severity: Severity,
    pub text: String,
}

/// Reading speed of every cue plus distribution statistics.
///
/// The soft ceiling is the table's hard limit (a warning), the hard limit is
/// its emergency maximum (an error). Zero-length cues count as violations but
/// are left out of the statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CpsReport {
    pub total_cues: usize,
    pub soft_ceiling: f64,
    pub hard_limit: f64,
    pub stats: Option<CpsStats>,
    pub violations: Vec<CpsViolation>,
    pub cues: Vec<CueCps>,
}

impl CpsReport {
    pub fn analyze(cues: &[Cue], table: &ConstraintTable) -> Self {
        let soft_ceiling = table.cps_hard_limit;
        let hard_limit = table.cps_emergency_max;
        let mut values = Vec::with_capacity(cues.len());
        let mut violations = Vec::new();
        let mut per_cue = Vec::with_capacity(cues.len());

        for cue in cues {
            let cps = cue.cps();
            if let Some(v) = cps.value() {
                values.push(v);
            }

            let violation = if cps.exceeds(hard_limit) {
                Some((hard_limit, Severity::High))
            } else if cps.exceeds(soft_ceiling) {
                Some((soft_ceiling, Severity::Medium))
            } else {
                None
            };
            if let Some((limit, severity)) = violation {
                violations.push(CpsViolation {
                    index: cue.index,
                    start_ms: cue.start_ms,
                    cps,
                    limit,
                    severity,
                    text: cue.text.clone(),
                });
            }

            per_cue.push(CueCps {
                index: cue.index,
                start_ms: cue.start_ms,
                cps,
                chars: cue.char_count(),
                duration_ms: cue.duration_ms(),
                preview: preview(&cue.text),
            });
        }

        Self {
            total_cues: cues.len(),
            soft_ceiling,
            hard_limit,
            stats: Self::stats(&values, soft_ceiling, hard_limit),
            violations,
            cues: per_cue,
        }
    }

    fn stats(values: &[f64], soft_ceiling: f64, hard_limit: f64) -> Option<CpsStats> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let at = |fraction: f64| {
            let idx = ((sorted.len() as f64 * fraction) as usize).min(sorted.len() - 1);
            round1(sorted[idx])
        };

        Some(CpsStats {
            avg: round1(values.iter().sum::<f64>() / values.len() as f64),
            min: round1(sorted[0]),
            max: round1(sorted[sorted.len() - 1]),
            median: at(0.5),
            p90: at(0.9),
            p95: at(0.95),
            above_soft_ceiling: values.iter().filter(|&&v| v > soft_ceiling).count(),
            above_hard_limit: values.iter().filter(|&&v| v > hard_limit).count(),
        })
    }

    pub fn errors(&self) -> impl Iterator<Item = &CpsViolation> {
        self.violations.iter().filter(|v| v.severity == Severity::High)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceIssueKind {
    /// Both lines fit on one
    Unbreak,
    OrphanTop,
    OrphanBottom,
    TopHeavy,
    /// Top line ends on an article, possessive or negation
    BadBreak,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceIssue {
    pub kind: BalanceIssueKind,
    pub severity: Severity,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceEntry {
    pub index: usize,
    pub start_ms: u64,
    pub current: Vec<String>,
    pub issues: Vec<BalanceIssue>,
    /// Better layout, when one exists
    pub suggestion: Option<String>,
}

impl BalanceEntry {
    pub fn severity(&self) -> Severity {
        self.issues.iter().map(|i| i.severity).max().unwrap_or(Severity::Low)
    }
}

/// Two-line cues with a poor break, each with a suggested re-break
#[derive(Debug, Clone, Serialize)]
pub struct LineBalanceReport {
    pub checked: usize,
    pub total_cues: usize,
    pub entries: Vec<BalanceEntry>,
}

/// Counts from `LineBalanceReport::apply`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BalanceFixSummary {
    pub rebalanced: usize,
    pub unbroken: usize,
    pub skipped_cps: usize,
    pub unfixable: usize,
}

impl LineBalanceReport {
    pub fn analyze(cues: &[Cue], table: &ConstraintTable) -> Self {
        let breaker = LineBreaker::new(table);
        let mut checked = 0;
        let mut entries = Vec::new();

        for cue in cues {
            let lines: Vec<&str> = cue.lines().map(str::trim_end).collect();
            if lines.len() != 2 || cue.is_dual_speaker() {
                continue;
            }
            checked += 1;

            let mut issues = check_balance(lines[0], lines[1]);
            let full = collapse_whitespace(&cue.text);
            if table.fits_single_line(&full) {
                issues.insert(
                    0,
                    BalanceIssue {
                        kind: BalanceIssueKind::Unbreak,
                        severity: Severity::Medium,
                        detail: format!(
                            "Fits on one line ({} chars <= {})",
                            display_width(&full),
                            table.max_chars_per_line
                        ),
                    },
                );
            }
            if issues.is_empty() {
                continue;
            }

            let current = lines.join("\n");
            let suggestion = breaker.reflow(&cue.text).filter(|s| *s != current);
            entries.push(BalanceEntry {
                index: cue.index,
                start_ms: cue.start_ms,
                current: lines.iter().map(|l| l.to_string()).collect(),
                issues,
                suggestion,
            });
        }

        Self {
            checked,
            total_cues: cues.len(),
            entries,
        }
    }

    /// Apply suggestions in place, skipping any that would push CPS over the hard limit
    pub fn apply(&self, cues: &mut [Cue], table: &ConstraintTable) -> BalanceFixSummary {
        let mut summary = BalanceFixSummary::default();
        for entry in &self.entries {
            let Some(cue) = cues.iter_mut().find(|c| c.start_ms == entry.start_ms) else {
                continue;
            };
            let Some(suggestion) = &entry.suggestion else {
                summary.unfixable += 1;
                continue;
            };

            let candidate = Cue::new(cue.index, cue.start_ms, cue.end_ms, suggestion.clone());
            if candidate.cps().exceeds(table.cps_hard_limit) && !cue.cps().exceeds(table.cps_hard_limit) {
                summary.skipped_cps += 1;
                continue;
            }
            if candidate.line_count() == 1 {
                summary.unbroken += 1;
            } else {
                summary.rebalanced += 1;
            }
            cue.text = suggestion.clone();
        }
        summary
    }
}

fn check_balance(top: &str, bottom: &str) -> Vec<BalanceIssue> {
    let top_len = display_width(top);
    let bottom_len = display_width(bottom);
    let top_words: Vec<&str> = top.split_whitespace().collect();
    let bottom_words: Vec<&str> = bottom.split_whitespace().collect();
    let mut issues = Vec::new();

    for (kind, words, len, other_len, label) in [
        (BalanceIssueKind::OrphanTop, &top_words, top_len, bottom_len, "top"),
        (BalanceIssueKind::OrphanBottom, &bottom_words, bottom_len, top_len, "bottom"),
    ] {
        let line = words.join(" ");
        if words.len() == 1 && len < ORPHAN_MIN_CHARS {
            issues.push(BalanceIssue {
                kind,
                severity: Severity::High,
                detail: format!("Single short word on {} line: \"{}\" ({} chars)", label, line, len),
            });
        } else if words.len() <= ORPHAN_MAX_WORDS && len < ORPHAN_MIN_CHARS && other_len > 25 {
            issues.push(BalanceIssue {
                kind,
                severity: Severity::Medium,
                detail: format!("Very short {} line: \"{}\" ({} chars vs {})", label, line, len, other_len),
            });
        }
    }

    if top_len > 0 && bottom_len > 0 {
        let ratio = top_len as f64 / bottom_len as f64;
        if ratio > TOP_HEAVY_RATIO && top_len - bottom_len > 10 {
            issues.push(BalanceIssue {
                kind: BalanceIssueKind::TopHeavy,
                severity: if ratio > 2.0 { Severity::High } else { Severity::Medium },
                detail: format!("Top-heavy: {}/{} chars (ratio {:.1})", top_len, bottom_len, ratio),
            });
        }
    }

    if let Some(last) = top_words.last() {
        if binds_forward(last) {
            issues.push(BalanceIssue {
                kind: BalanceIssueKind::BadBreak,
                severity: Severity::High,
                detail: format!("Line break after \"{}\" splits grammatical unit", last),
            });
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpsReport_withMixedCues_shouldComputeStatsAndSeverities() {
        let cues = vec![
            Cue::new(1, 0, 2_000, "Twintig tekens hier."),
            Cue::new(2, 3_000, 4_000, "Achttien tekens..."),
            Cue::new(3, 5_000, 5_500, "Dit is echt veel te snel"),
            Cue::new(4, 6_000, 6_000, "Nul"),
        ];
        let report = CpsReport::analyze(&cues, &ConstraintTable::default());

        let stats = report.stats.as_ref().unwrap();
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 48.0);
        assert_eq!(report.violations.len(), 2);
        assert_eq!(report.errors().count(), 2);
        assert!(report.violations.iter().any(|v| v.cps.is_unbounded()));
    }

    #[test]
    fn test_cpsReport_withNoCues_shouldHaveNoStats() {
        let report = CpsReport::analyze(&[], &ConstraintTable::default());
        assert!(report.stats.is_none());
        assert_eq!(report.total_cues, 0);
    }

    #[test]
    fn test_lineBalance_withShortTwoLineCue_shouldSuggestUnbreak() {
        let cues = vec![Cue::new(1, 0, 3_000, "Kom je\nmee?")];
        let report = LineBalanceReport::analyze(&cues, &ConstraintTable::default());
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].issues[0].kind, BalanceIssueKind::Unbreak);
        assert_eq!(report.entries[0].suggestion.as_deref(), Some("Kom je mee?"));
    }

    #[test]
    fn test_lineBalance_withArticleAtLineEnd_shouldFlagBadBreak() {
        let text = "Gisteren zag ik in de verte een heel groot huis met de\nrode deur en de witte ramen";
        let cues = vec![Cue::new(1, 0, 6_000, text)];
        let report = LineBalanceReport::analyze(&cues, &ConstraintTable::default());
        let entry = &report.entries[0];
        assert!(entry.issues.iter().any(|i| i.kind == BalanceIssueKind::BadBreak));
        assert_eq!(entry.severity(), Severity::High);
    }

    #[test]
    fn test_lineBalance_withDualSpeaker_shouldSkip() {
        let cues = vec![Cue::new(1, 0, 3_000, "Ja?\n-Nee.")];
        let report = LineBalanceReport::analyze(&cues, &ConstraintTable::default());
        assert_eq!(report.checked, 0);
        assert!(report.entries.is_empty());
    }

    #[test]
    fn test_apply_withUnbreakSuggestion_shouldJoinLines() {
        let table = ConstraintTable::default();
        let mut cues = vec![Cue::new(1, 0, 3_000, "Kom je\nmee?")];
        let report = LineBalanceReport::analyze(&cues, &table);
        let summary = report.apply(&mut cues, &table);
        assert_eq!(summary.unbroken, 1);
        assert_eq!(cues[0].text, "Kom je mee?");
    }
}
