/*!
 * The per-file cue chain.
 *
 * Given the source cues and the translator's draft, `CuePipeline::run`
 * produces the final cues and every side artifact:
 *
 * 1. draft-to-source mapping (before anything moves)
 * 2. structural fix
 * 3. merge, with provenance records
 * 4. re-timing (gap closing, CPS extension, optional speech extension)
 * 5. structural fix again
 * 6. merge hints stripped, renumbered
 * 7. timing QC
 * 8. closing credit, when configured
 * 9. audit: structure, CPS, line balance
 *
 * Nothing here performs I/O; the controller decides what gets written.
 */

use log::{debug, info};
use serde::Serialize;

use crate::app_config::Config;
use crate::cross_mapping::{build_draft_mapping, DraftIndex, DraftMapping, MergeIndex, QcReport, QcSettings, TimingQc};
use crate::errors::ExitReason;
use crate::merge::{MergeEngine, MergeRecord, MergeReport};
use crate::retiming::{condensation_needed, extend_to_speech, retime, Extension, RetimeOutcome, RetimingPlan};
use crate::subtitle_processor::codec::renumber;
use crate::subtitle_processor::codec::SourceDiagnostics;
use crate::subtitle_processor::credit::{append_credit, Credit, CreditPlacement};
use crate::subtitle_processor::cue::{Cue, SpeakerMarker, TimeWindow};
use crate::validation::report::BalanceFixSummary;
use crate::validation::structure::StructuralFix;
use crate::validation::{ConstraintTable, CpsReport, LineBalanceReport, StructuralReport, StructuralValidator, TypographyRules, Unfixable};

// @struct: Everything the chain needs to know, resolved from configuration
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub table: ConstraintTable,
    pub typography: TypographyRules,
    pub merge_enabled: bool,
    pub merge_gap_threshold_ms: u64,
    pub merge_max_duration_ms: u64,
    pub retiming: RetimingPlan,
    // @field: Maximum speech extension; `None` disables the step
    pub speech_extension_ms: Option<u64>,
    pub mapping_tolerance_ms: u64,
    pub mapping_fallback_ms: u64,
    pub join_tolerance_ms: u64,
    // @field: `None` skips timing QC
    pub qc: Option<QcSettings>,
    pub rebalance_lines: bool,
    // @field: Appended after QC, so it never shows up as unresolved
    pub credit: Option<Credit>,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            table: config.constraint_table(),
            typography: config.typography_rules(),
            merge_enabled: config.merge.enabled,
            merge_gap_threshold_ms: config.merge.gap_threshold_ms,
            merge_max_duration_ms: config.merge.max_duration_ms,
            retiming: config.retiming_plan(),
            speech_extension_ms: config
                .retiming
                .extend_to_speech
                .then_some(config.retiming.max_speech_extension_ms),
            mapping_tolerance_ms: config.mapping.tolerance_ms,
            mapping_fallback_ms: config.mapping.fallback_ms,
            join_tolerance_ms: config.mapping.join_tolerance_ms,
            qc: config.qc.enabled.then(|| config.qc_settings()),
            rebalance_lines: true,
            credit: config.credit.enabled.then(|| config.credit.credit()),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

// @struct: Counters and diagnostics of one run, written as `<stem>.<lang>.report.json`
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    // @field: Encoding and parse problems of the source file
    pub source: SourceDiagnostics,
    pub source_cues: usize,
    pub draft_cues: usize,
    pub final_cues: usize,
    pub fixes_before_merge: Vec<StructuralFix>,
    pub fixes_after_retiming: Vec<StructuralFix>,
    // @field: Left by the fix on the raw draft
    pub unfixable_before_merge: Vec<Unfixable>,
    // @field: Left by the fix after merging and re-timing
    pub unfixable: Vec<Unfixable>,
    pub retiming: RetimeOutcome,
    pub speech_extensions: Vec<Extension>,
    pub line_balance: BalanceFixSummary,
    pub structure: StructuralReport,
    pub cps: CpsReport,
    pub balance: LineBalanceReport,
    // @field: `None` when no credit is configured
    pub credit: Option<CreditPlacement>,
}

impl PipelineReport {
    /// Emergency-CPS cues left after every repair
    pub fn emergency_count(&self) -> usize {
        self.retiming.emergency_count()
    }

    /// Unfixable issues of both fix passes
    pub fn unfixable_count(&self) -> usize {
        self.unfixable_before_merge.len() + self.unfixable.len()
    }

    /// `ValidationFailed` when anything could not be repaired or the source
    /// lost content while being read
    pub fn exit_reason(&self) -> ExitReason {
        if self.unfixable_count() > 0
            || !self.structure.is_clean()
            || self.emergency_count() > 0
            || !self.source.is_clean()
        {
            ExitReason::ValidationFailed
        } else {
            ExitReason::Success
        }
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub cues: Vec<Cue>,
    pub draft_mapping: DraftMapping,
    pub merge_report: MergeReport,
    pub report: PipelineReport,
    pub qc: Option<QcReport>,
}

impl PipelineOutput {
    /// Attach what parsing the source reported
    pub fn with_source(mut self, source: SourceDiagnostics) -> Self {
        self.report.source = source;
        self
    }
}

pub struct CuePipeline {
    settings: PipelineSettings,
    validator: StructuralValidator,
    merger: MergeEngine,
}

impl CuePipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            validator: StructuralValidator::new(settings.table).with_typography(settings.typography),
            merger: MergeEngine::new(&settings.table),
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the full chain on one file.
    ///
    /// `speech` is the media's speech activity when available; without it
    /// the speech extension is skipped and QC only resolves provenance.
    pub fn run(&self, source: &[Cue], draft: &[Cue], speech: Option<&[TimeWindow]>) -> PipelineOutput {
        let settings = &self.settings;
        let draft_mapping = build_draft_mapping(
            draft,
            source,
            settings.mapping_tolerance_ms,
            settings.mapping_fallback_ms,
        );

        let first_fix = self.validator.fix(draft);
        debug!("Fix before merge: {} fixes", first_fix.fixes.len());

        let (merged, records) = self.merge(&first_fix.cues);
        let merge_report = MergeReport::new(
            first_fix.cues.len(),
            self.merger.parameters(settings.merge_gap_threshold_ms, settings.merge_max_duration_ms),
            records,
        );

        let mut retimed = retime(&merged, &settings.retiming, &settings.table);
        let speech_extensions = match (speech, settings.speech_extension_ms) {
            (Some(windows), Some(max_extension)) => extend_to_speech(
                &mut retimed.cues,
                windows,
                settings.table.min_gap_ms,
                settings.retiming.max_duration_ms,
                max_extension,
            ),
            _ => Vec::new(),
        };

        let retimed_cues = std::mem::take(&mut retimed.cues);
        let second_fix = self.validator.fix(&retimed_cues);
        let mut cues = second_fix.cues;

        let line_balance = if settings.rebalance_lines {
            LineBalanceReport::analyze(&cues, &settings.table).apply(&mut cues, &settings.table)
        } else {
            BalanceFixSummary::default()
        };
        finalize(&mut cues);

        retimed.condensation_needed = condensation_needed(&cues, &settings.table);

        let qc = settings.qc.map(|qc_settings| {
            let merge_index = MergeIndex::from_records(&merge_report.merges, settings.join_tolerance_ms);
            let draft_index = DraftIndex::from_mapping(&draft_mapping, settings.join_tolerance_ms);
            TimingQc::new(&merge_index, &draft_index, speech.unwrap_or(&[]), qc_settings).run(&cues)
        });

        let credit = settings.credit.as_ref().map(|credit| append_credit(&mut cues, credit));
        if let Some(placement) = &credit {
            debug!("Credit: {:?}", placement);
        }

        let report = PipelineReport {
            source: SourceDiagnostics::default(),
            source_cues: source.len(),
            draft_cues: draft.len(),
            final_cues: cues.len(),
            fixes_before_merge: first_fix.fixes,
            fixes_after_retiming: second_fix.fixes,
            unfixable_before_merge: first_fix.unfixable,
            unfixable: second_fix.unfixable,
            retiming: retimed,
            speech_extensions,
            line_balance,
            structure: self.validator.validate(&cues),
            cps: CpsReport::analyze(&cues, &settings.table),
            balance: LineBalanceReport::analyze(&cues, &settings.table),
            credit,
        };
        info!(
            "Pipeline: {} source -> {} draft -> {} final cues, {} merges, {} unfixable",
            report.source_cues,
            report.draft_cues,
            report.final_cues,
            merge_report.statistics.merges_performed,
            report.unfixable_count()
        );

        PipelineOutput {
            cues,
            draft_mapping,
            merge_report,
            report,
            qc,
        }
    }

    /// Merge or, when merging is off, record every cue as its own group
    fn merge(&self, cues: &[Cue]) -> (Vec<Cue>, Vec<MergeRecord>) {
        if !self.settings.merge_enabled {
            let records = cues.iter().map(|c| MergeRecord::singleton(c.window(), &c.text)).collect();
            return (cues.to_vec(), records);
        }
        let plan = self.merger.plan_merges(
            cues,
            self.settings.merge_gap_threshold_ms,
            self.settings.merge_max_duration_ms,
        );
        (plan.cues, plan.records)
    }
}

/// Drop merge hints and renumber from 1
pub fn finalize(cues: &mut [Cue]) {
    for cue in cues.iter_mut() {
        cue.speaker_marker = SpeakerMarker::SameSpeaker;
    }
    renumber(cues);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cross_mapping::QcFinding;

    fn source() -> Vec<Cue> {
        vec![
            Cue::new(1, 300_000, 302_500, "I knew it"),
            Cue::new(2, 303_000, 305_000, "because you told me."),
            Cue::new(3, 320_000, 322_000, "Later."),
        ]
    }

    fn draft() -> Vec<Cue> {
        vec![
            Cue::new(1, 300_000, 302_500, "Ik wist het al"),
            Cue::new(2, 303_000, 305_000, "want je zei het."),
            Cue::new(3, 320_000, 322_000, "Straks."),
        ]
    }

    #[test]
    fn test_run_shouldMergeRenumberAndResolveProvenance() {
        let pipeline = CuePipeline::new(PipelineSettings::default());
        let output = pipeline.run(&source(), &draft(), None);

        assert_eq!(output.cues.len(), 2);
        assert_eq!(output.cues[0].index, 1);
        assert_eq!(output.cues[0].start_ms, 300_000);
        assert_eq!(output.cues[1].index, 2);
        assert_eq!(output.merge_report.statistics.merges_performed, 1);

        let qc = output.qc.unwrap();
        assert_eq!(qc.summary.resolved, 2);
        assert!(!qc.findings.iter().any(|f| matches!(f, QcFinding::Unresolved { .. })));
    }

    #[test]
    fn test_run_shouldStripMarkersFromFinalCues() {
        let mut marked = draft();
        marked[1].speaker_marker = SpeakerMarker::NoMerge;
        let output = CuePipeline::new(PipelineSettings::default()).run(&source(), &marked, None);
        assert_eq!(output.cues.len(), 3);
        assert!(output.cues.iter().all(|c| c.speaker_marker == SpeakerMarker::SameSpeaker));
    }

    #[test]
    fn test_run_withMergeDisabled_shouldRecordSingletons() {
        let mut settings = PipelineSettings::default();
        settings.merge_enabled = false;
        let output = CuePipeline::new(settings).run(&source(), &draft(), None);
        assert_eq!(output.cues.len(), 3);
        assert_eq!(output.merge_report.merges.len(), 3);
        assert_eq!(output.merge_report.statistics.merges_performed, 0);
    }

    #[test]
    fn test_run_withUnbreakableDraftLine_shouldReportFirstPassUnfixable() {
        let mut marked = draft();
        marked.push(Cue::new(4, 330_000, 334_000, "Kindercarnavalsoptochtvoorbereidingswerkzaamhedenverslag"));
        let output = CuePipeline::new(PipelineSettings::default()).run(&source(), &marked, None);

        assert!(output
            .report
            .unfixable_before_merge
            .iter()
            .any(|u| matches!(u, Unfixable::LineBreak { start_ms: 330_000, .. })));
        assert!(output.report.unfixable_count() >= 1);
        assert_eq!(output.report.exit_reason(), ExitReason::ValidationFailed);
    }

    #[test]
    fn test_withSource_withSkippedBlocks_shouldFailValidation() {
        let (_, diagnostics) = crate::subtitle_processor::parse(b"1\n00:00:01,000 --> 00:00:00,500\nBackwards\n").into_parts();
        let output = CuePipeline::new(PipelineSettings::default())
            .run(&source(), &draft(), None)
            .with_source(diagnostics);

        assert_eq!(output.report.source.parse_errors.len(), 1);
        assert_eq!(output.report.exit_reason(), ExitReason::ValidationFailed);
    }

    #[test]
    fn test_run_withCleanInput_shouldSucceed() {
        let output = CuePipeline::new(PipelineSettings::default()).run(&source(), &draft(), None);
        assert_eq!(output.report.exit_reason(), ExitReason::Success);
    }

    #[test]
    fn test_run_withCredit_shouldAppendAfterQc() {
        let mut settings = PipelineSettings::default();
        settings.credit = Some(Credit::new("Ondertiteling: cueforge"));
        let output = CuePipeline::new(settings).run(&source(), &draft(), None);

        let last = output.cues.last().unwrap();
        assert_eq!(last.text, "Ondertiteling: cueforge");
        assert_eq!(last.index, output.cues.len());
        assert_eq!(last.start_ms, output.cues[output.cues.len() - 2].end_ms + 3000);
        assert!(matches!(output.report.credit, Some(CreditPlacement::Added { .. })));
        assert_eq!(output.qc.unwrap().summary.cues_analyzed, output.cues.len() - 1);
        assert_eq!(output.report.final_cues, output.cues.len());
    }
}
