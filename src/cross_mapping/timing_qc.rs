/*!
 * Timing QC against speech activity.
 *
 * Heuristic only: findings are reported, timing is never changed here.
 * A cue whose source window cannot be resolved is reported as
 * `Unresolved` and the rest of the file is still checked.
 */

use log::{info, warn};
use serde::Serialize;

use crate::subtitle_processor::cue::{Cue, TimeWindow};
use crate::validation::report::Severity;

use super::resolver::{resolve_source_window, DraftIndex, MergeIndex, Resolution, ResolutionPath};

/// A next cue starting this close counts as picking up the speech
const HANDOVER_MS: u64 = 200;

/// Start deltas in `1..=IDEAL_ANTICIPATION_MS` are ideal anticipation
const IDEAL_ANTICIPATION_MS: i64 = 200;

/// Subtitle up this long before speech is worth a low note
const EARLY_START_MS: i64 = 1_500;

/// Final and source boundaries this close mean the timing came from the source
const INHERITED_MS: u64 = 200;

// @struct: Resolved source window that no speech interval touches
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MisalignmentFlag {
    pub start_ms: u64,
    pub end_ms: u64,
    pub resolved: TimeWindow,
    pub tolerance_ms: u64,
    // @field: Closest speech interval, if any speech was detected at all
    pub nearest_speech: Option<TimeWindow>,
}

/// Flag `final_cue` when no speech interval intersects `resolved` widened by `tolerance_ms`
pub fn flag_misalignment(
    final_cue: &Cue,
    resolved: &TimeWindow,
    speech: &[TimeWindow],
    tolerance_ms: u64,
) -> Option<MisalignmentFlag> {
    let widened = resolved.expand(tolerance_ms);
    if speech.iter().any(|s| s.intersects(&widened)) {
        return None;
    }
    let nearest_speech = speech
        .iter()
        .min_by_key(|s| distance(s, resolved))
        .copied();
    Some(MisalignmentFlag {
        start_ms: final_cue.start_ms,
        end_ms: final_cue.end_ms,
        resolved: *resolved,
        tolerance_ms,
        nearest_speech,
    })
}

fn distance(a: &TimeWindow, b: &TimeWindow) -> u64 {
    if a.end_ms <= b.start_ms {
        b.start_ms - a.end_ms
    } else if b.end_ms <= a.start_ms {
        a.start_ms - b.end_ms
    } else {
        0
    }
}

/// Speech boundary nearest to `target_ms` within `search_range_ms`
fn find_nearest(boundaries: &[u64], target_ms: u64, search_range_ms: u64) -> Option<u64> {
    let idx = boundaries.partition_point(|&b| b < target_ms);
    [idx.checked_sub(1), Some(idx)]
        .into_iter()
        .flatten()
        .filter_map(|i| boundaries.get(i).copied())
        .filter(|b| b.abs_diff(target_ms) <= search_range_ms)
        .min_by_key(|b| b.abs_diff(target_ms))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryIssueKind {
    CutsOffDuringSpeech,
    LingersAfterSpeech,
    LateStart,
    EarlyStart,
    MissingAnticipation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryIssue {
    pub kind: BoundaryIssueKind,
    pub severity: Severity,
    pub delta_ms: i64,
    // @field: Same boundary as the source cue, so not introduced here
    pub inherited: bool,
}

/// One finding for one final cue
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QcFinding {
    Misaligned {
        index: usize,
        flag: MisalignmentFlag,
        via: ResolutionPath,
    },
    Boundary {
        index: usize,
        start_ms: u64,
        end_ms: u64,
        issues: Vec<BoundaryIssue>,
    },
    /// No source window could be resolved: no signal, not an error
    Unresolved { index: usize, start_ms: u64 },
}

impl QcFinding {
    pub fn severity(&self) -> Severity {
        match self {
            QcFinding::Misaligned { .. } => Severity::High,
            QcFinding::Boundary { issues, .. } => {
                issues.iter().map(|i| i.severity).max().unwrap_or(Severity::Low)
            }
            QcFinding::Unresolved { .. } => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QcSummary {
    pub cues_analyzed: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub misaligned: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub anticipation_ideal: usize,
    pub anticipation_missing: usize,
    pub end_delta_avg_ms: Option<i64>,
    pub start_delta_avg_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QcReport {
    pub summary: QcSummary,
    pub findings: Vec<QcFinding>,
}

impl QcReport {
    pub fn high_severity(&self) -> impl Iterator<Item = &QcFinding> {
        self.findings.iter().filter(|f| f.severity() == Severity::High)
    }
}

/// Thresholds for a QC run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QcSettings {
    /// Widening of the resolved window before looking for speech
    pub speech_tolerance_ms: u64,
    /// Smallest boundary delta reported
    pub boundary_threshold_ms: u64,
    /// How far from a cue boundary to look for a speech boundary
    pub search_range_ms: u64,
}

impl Default for QcSettings {
    fn default() -> Self {
        Self {
            speech_tolerance_ms: 250,
            boundary_threshold_ms: 500,
            search_range_ms: 2_000,
        }
    }
}

/// Whole-file timing QC over final cues, provenance and speech activity
pub struct TimingQc<'a> {
    merges: &'a MergeIndex,
    drafts: &'a DraftIndex,
    speech: Vec<TimeWindow>,
    speech_starts: Vec<u64>,
    speech_ends: Vec<u64>,
    settings: QcSettings,
}

impl<'a> TimingQc<'a> {
    pub fn new(merges: &'a MergeIndex, drafts: &'a DraftIndex, speech: &[TimeWindow], settings: QcSettings) -> Self {
        let mut speech = speech.to_vec();
        speech.sort_by_key(|w| w.start_ms);
        let speech_starts = speech.iter().map(|w| w.start_ms).collect();
        let mut speech_ends: Vec<u64> = speech.iter().map(|w| w.end_ms).collect();
        speech_ends.sort_unstable();

        Self {
            merges,
            drafts,
            speech,
            speech_starts,
            speech_ends,
            settings,
        }
    }

    pub fn run(&self, cues: &[Cue]) -> QcReport {
        let mut findings = Vec::new();
        let mut summary = QcSummary {
            cues_analyzed: cues.len(),
            ..QcSummary::default()
        };
        let mut end_deltas = Vec::new();
        let mut start_deltas = Vec::new();
        if self.speech.is_empty() {
            warn!("No speech activity available, misalignment checks skipped");
        }

        for (i, cue) in cues.iter().enumerate() {
            let resolution = resolve_source_window(cue, self.merges, self.drafts);
            match &resolution {
                Some(resolved) => {
                    summary.resolved += 1;
                    if let Some(span) = resolved.span().filter(|_| !self.speech.is_empty()) {
                        if let Some(flag) =
                            flag_misalignment(cue, &span, &self.speech, self.settings.speech_tolerance_ms)
                        {
                            summary.misaligned += 1;
                            findings.push(QcFinding::Misaligned {
                                index: cue.index,
                                flag,
                                via: resolved.via,
                            });
                        }
                    }
                }
                None => {
                    summary.unresolved += 1;
                    findings.push(QcFinding::Unresolved {
                        index: cue.index,
                        start_ms: cue.start_ms,
                    });
                }
            }

            let prev = i.checked_sub(1).map(|p| &cues[p]);
            let next = cues.get(i + 1);
            let (issues, start_delta, end_delta) = self.classify(cue, prev, next, resolution.as_ref());
            if let Some(d) = start_delta {
                start_deltas.push(d);
                if (1..=IDEAL_ANTICIPATION_MS).contains(&d) {
                    summary.anticipation_ideal += 1;
                } else if d <= 0 {
                    summary.anticipation_missing += 1;
                }
            }
            if let Some(d) = end_delta {
                end_deltas.push(d);
            }
            if !issues.is_empty() {
                findings.push(QcFinding::Boundary {
                    index: cue.index,
                    start_ms: cue.start_ms,
                    end_ms: cue.end_ms,
                    issues,
                });
            }
        }

        for finding in &findings {
            match finding.severity() {
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
            }
        }
        summary.end_delta_avg_ms = average(&end_deltas);
        summary.start_delta_avg_ms = average(&start_deltas);

        info!(
            "Timing QC: {} cues, {} unresolved, {} misaligned, {} high",
            summary.cues_analyzed, summary.unresolved, summary.misaligned, summary.high
        );
        QcReport { summary, findings }
    }

    /// Compare cue boundaries with the nearest speech boundaries.
    ///
    /// Deltas are speech minus cue: a positive end delta means speech goes on
    /// after the cue is gone, a negative start delta means the cue is late.
    fn classify(
        &self,
        cue: &Cue,
        prev: Option<&Cue>,
        next: Option<&Cue>,
        resolution: Option<&Resolution>,
    ) -> (Vec<BoundaryIssue>, Option<i64>, Option<i64>) {
        let threshold = self.settings.boundary_threshold_ms as i64;
        let source = resolution.and_then(Resolution::span);
        let nearest_end = find_nearest(&self.speech_ends, cue.end_ms, self.settings.search_range_ms);
        let nearest_start = find_nearest(&self.speech_starts, cue.start_ms, self.settings.search_range_ms);
        let end_delta = nearest_end.map(|e| e as i64 - cue.end_ms as i64);
        let start_delta = nearest_start.map(|s| s as i64 - cue.start_ms as i64);
        let end_inherited = source.is_some_and(|s| s.end_ms.abs_diff(cue.end_ms) <= INHERITED_MS);
        let start_inherited = source.is_some_and(|s| s.start_ms.abs_diff(cue.start_ms) <= INHERITED_MS);
        let prev_covers = prev.is_some_and(|p| p.end_ms + HANDOVER_MS >= cue.start_ms);

        let mut issues = Vec::new();
        let mut push = |kind, severity, delta_ms, inherited: bool| {
            issues.push(BoundaryIssue {
                kind,
                severity: if inherited { Severity::Low } else { severity },
                delta_ms,
                inherited,
            });
        };

        if let (Some(ed), Some(speech_end)) = (end_delta, nearest_end) {
            if ed > threshold {
                let picked_up = next.is_some_and(|n| {
                    n.start_ms <= speech_end || n.start_ms.saturating_sub(cue.end_ms) <= HANDOVER_MS
                });
                if !picked_up {
                    let severity = if ed > 1_000 { Severity::High } else { Severity::Medium };
                    push(BoundaryIssueKind::CutsOffDuringSpeech, severity, ed, end_inherited);
                }
            } else if ed < -threshold {
                let severity = if ed < -1_500 { Severity::High } else { Severity::Medium };
                push(BoundaryIssueKind::LingersAfterSpeech, severity, ed, end_inherited);
            }
        }

        if let Some(sd) = start_delta {
            if sd < -threshold {
                if !prev_covers {
                    let severity = if sd < -1_000 { Severity::High } else { Severity::Medium };
                    push(BoundaryIssueKind::LateStart, severity, sd, start_inherited);
                }
            } else if sd > EARLY_START_MS {
                push(BoundaryIssueKind::EarlyStart, Severity::Low, sd, false);
            } else if sd <= 0 && !prev_covers {
                push(BoundaryIssueKind::MissingAnticipation, Severity::Medium, sd, start_inherited);
            }
        }

        (issues, start_delta, end_delta)
    }
}

fn average(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    Some((values.iter().sum::<i64>() as f64 / values.len() as f64).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cross_mapping::draft_map::build_draft_mapping;
    use crate::merge::record::MergeRecord;

    #[test]
    fn test_flagMisalignment_withSpeechNearby_shouldNotFlag() {
        let cue = Cue::new(1, 1_000, 2_000, "x");
        let speech = vec![TimeWindow::new(2_200, 3_000)];
        assert!(flag_misalignment(&cue, &TimeWindow::new(1_000, 2_000), &speech, 250).is_none());
    }

    #[test]
    fn test_flagMisalignment_withSpeechFarAway_shouldFlag() {
        let cue = Cue::new(1, 1_000, 2_000, "x");
        let speech = vec![TimeWindow::new(5_000, 6_000)];
        let flag = flag_misalignment(&cue, &TimeWindow::new(1_000, 2_000), &speech, 250).unwrap();
        assert_eq!(flag.nearest_speech, Some(TimeWindow::new(5_000, 6_000)));
    }

    #[test]
    fn test_findNearest_shouldRespectSearchRange() {
        let ends = vec![1_000, 4_000, 9_000];
        assert_eq!(find_nearest(&ends, 3_500, 2_000), Some(4_000));
        assert_eq!(find_nearest(&ends, 6_500, 2_000), None);
    }

    #[test]
    fn test_run_withUnresolvableCue_shouldReportNoSignal() {
        let merges = MergeIndex::default();
        let drafts = DraftIndex::default();
        let qc = TimingQc::new(&merges, &drafts, &[], QcSettings::default());
        let report = qc.run(&[Cue::new(1, 1_000, 2_000, "x")]);
        assert_eq!(report.summary.unresolved, 1);
        assert!(matches!(report.findings[0], QcFinding::Unresolved { index: 1, .. }));
    }

    #[test]
    fn test_run_withCutOffSpeech_shouldClassifyHigh() {
        let source = vec![Cue::new(1, 1_000, 2_000, "Hello")];
        let mapping = build_draft_mapping(&source, &source, 500, 1_000);
        let drafts = DraftIndex::from_mapping(&mapping, 50);
        let merges = MergeIndex::from_records(&[MergeRecord::singleton(TimeWindow::new(1_000, 2_000), "Hallo")], 50);
        let speech = vec![TimeWindow::new(950, 3_000)];
        let qc = TimingQc::new(&merges, &drafts, &speech, QcSettings::default());

        let report = qc.run(&[Cue::new(1, 1_000, 1_200, "Hallo")]);
        let boundary = report
            .findings
            .iter()
            .find_map(|f| match f {
                QcFinding::Boundary { issues, .. } => Some(issues.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(boundary[0].kind, BoundaryIssueKind::CutsOffDuringSpeech);
        assert_eq!(boundary[0].severity, Severity::High);
    }
}
