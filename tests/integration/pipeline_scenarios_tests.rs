/*!
 * End-to-end behaviour of the cue chain on small, hand-checked inputs
 */

use cueforge::cross_mapping::{resolve_source_window, DraftIndex, MergeIndex};
use cueforge::errors::ParseErrorKind;
use cueforge::merge::MergeEngine;
use cueforge::retiming::{extend_for_cps, retime, CpsTarget, RetimingPlan};
use cueforge::subtitle_processor::{parse_str, Cue, TimeWindow};
use cueforge::validation::{ConstraintTable, StructuralValidator};
use cueforge::{CuePipeline, PipelineSettings};

use crate::common::{init_logging, numbered_cues};

#[test]
fn test_planMerges_withSplitSentence_shouldJoinIntoTwoLines() {
    init_logging();
    let cues = vec![
        Cue::new(1, 1_000, 3_000, "We should leave before the sun"),
        Cue::new(2, 3_400, 6_000, "goes down behind those hills."),
    ];

    let plan = MergeEngine::new(&ConstraintTable::default()).plan_merges(&cues, 800, 7_000);

    assert_eq!(plan.cues.len(), 1);
    let merged = &plan.cues[0];
    assert_eq!((merged.start_ms, merged.end_ms), (1_000, 6_000));
    assert_eq!(merged.line_count(), 2);
    assert_eq!(
        merged.text.replace('\n', " "),
        "We should leave before the sun goes down behind those hills."
    );
    assert_eq!(plan.records[0].source_timecodes.len(), 2);
    assert_eq!(plan.records[0].source_timecodes[1], TimeWindow::new(3_400, 6_000));
}

#[test]
fn test_extendForCps_withFastCueAndFreeGap_shouldReachTargetBeforeNextCue() {
    let mut cues = vec![
        Cue::new(1, 10_000, 10_500, "Twintig tekens hier."),
        Cue::new(2, 13_000, 15_000, "Daarna."),
    ];

    extend_for_cps(&mut cues, CpsTarget::default(), 120, 8_000);

    assert_eq!(cues[0].end_ms, 11_600);
    assert!(cues[0].end_ms <= 13_000 - 120);
    assert!(cues[0].cps().value().unwrap() <= 12.5);
    assert_eq!(cues[1].start_ms, 13_000);
}

#[test]
fn test_parse_withOutOfRangeMinutes_shouldReportBlockAndKeepTheRest() {
    let text = "1\n00:00:01,000 --> 00:00:02,000\nFirst\n\n2\n00:99:10,000 --> 00:00:15,000\nBroken\n\n3\n00:00:20,000 --> 00:00:21,000\nThird\n";

    let (cues, errors) = parse_str(text);

    assert_eq!(cues.len(), 2);
    assert!(cues.iter().all(|c| c.start_ms < 60_000));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].block, 2);
    assert!(matches!(errors[0].kind, ParseErrorKind::MalformedTimecode { .. }));
}

#[test]
fn test_resolveSourceWindow_afterMergeRetimeAndRenumber_shouldCoverBothSources() {
    init_logging();
    let source = vec![
        Cue::new(1, 300_000, 302_500, "I knew it all along"),
        Cue::new(2, 303_000, 305_000, "because you told me."),
        Cue::new(3, 320_000, 322_000, "See you later."),
    ];
    let draft = vec![
        Cue::new(1, 300_000, 302_500, "Ik wist het al die tijd"),
        Cue::new(2, 303_000, 305_000, "omdat jij het me vertelde."),
        Cue::new(3, 320_000, 322_000, "Tot straks."),
    ];
    let settings = PipelineSettings::default();
    let join_tolerance = settings.join_tolerance_ms;

    let output = CuePipeline::new(settings).run(&source, &draft, None);
    let mut last = output.cues[0].clone();
    last.index = 7;
    last.end_ms += 400;

    let merges = MergeIndex::from_records(&output.merge_report.merges, join_tolerance);
    let drafts = DraftIndex::from_mapping(&output.draft_mapping, join_tolerance);
    let resolution = resolve_source_window(&last, &merges, &drafts).unwrap();

    assert_eq!(
        resolution.windows,
        vec![TimeWindow::new(300_000, 302_500), TimeWindow::new(303_000, 305_000)]
    );
    assert_eq!(resolution.span(), Some(TimeWindow::new(300_000, 305_000)));
}

#[test]
fn test_fix_shouldLeaveNoOverlapAndBeIdempotent() {
    let cues = vec![
        Cue::new(1, 1_000, 4_000, "First line"),
        Cue::new(2, 3_000, 5_000, "Second line overlaps"),
        Cue::new(3, 5_050, 7_000, "Third line is too close"),
        Cue::new(4, 9_000, 11_000, "Fourth"),
    ];
    let validator = StructuralValidator::new(ConstraintTable::default());

    let first = validator.fix(&cues);
    assert!(!first.fixes.is_empty());
    for pair in first.cues.windows(2) {
        assert!(pair[0].end_ms <= pair[1].start_ms, "{} overlaps {}", pair[0].format_timing(), pair[1].format_timing());
    }

    let second = validator.fix(&first.cues);
    assert!(second.fixes.is_empty());
    assert_eq!(second.cues, first.cues);
}

#[test]
fn test_retime_shouldNeverRaiseReadingSpeed() {
    let table = ConstraintTable::default();
    let mut cues = numbered_cues(12);
    cues[3].text = "A much longer line that is read far too quickly".to_string();
    cues[3].end_ms = cues[3].start_ms + 1_200;
    cues[7].text = "Short but fast".to_string();
    cues[7].end_ms = cues[7].start_ms + 600;
    let plan = RetimingPlan {
        close_gaps: true,
        gap_threshold_ms: 1_000,
        target: CpsTarget::default(),
        max_duration_ms: 7_000,
    };

    let outcome = retime(&cues, &plan, &table);

    assert_eq!(outcome.cues.len(), cues.len());
    for (before, after) in cues.iter().zip(&outcome.cues) {
        assert_eq!(before.start_ms, after.start_ms);
        assert!(after.end_ms >= before.end_ms);
        assert!(after.cps().value().unwrap() <= before.cps().value().unwrap() + f64::EPSILON);
    }
    assert!(!outcome.extended.is_empty());
}

#[test]
fn test_run_withNoMergeDraft_shouldKeepCueCountAndSucceed() {
    let source = numbered_cues(6);
    let draft: Vec<Cue> = source
        .iter()
        .map(|c| Cue::new(c.index, c.start_ms, c.end_ms, format!("Regel {}.", c.index)))
        .collect();
    let mut settings = PipelineSettings::default();
    settings.merge_enabled = false;

    let output = CuePipeline::new(settings).run(&source, &draft, None);

    assert_eq!(output.cues.len(), 6);
    assert_eq!(output.cues.iter().map(|c| c.index).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5, 6]);
    assert!(output.report.structure.is_clean());
}
