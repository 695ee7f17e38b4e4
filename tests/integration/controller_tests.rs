/*!
 * Per-file and batch runs through the controller with mock collaborators
 */

use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use cueforge::app_controller::Controller;
use cueforge::errors::{ExitReason, MediaError};
use cueforge::merge::MergeReport;
use cueforge::subtitle_processor::{SubtitleFile, TimeWindow};
use cueforge::Config;

use crate::common::mock_media::MockMedia;
use crate::common::mock_providers::EchoTranslator;
use crate::common::{create_source_subtitle, create_temp_dir, create_test_file, file_names, init_logging, SOURCE_SRT};

fn setup(media: MockMedia, translator: EchoTranslator) -> (Controller, Arc<MockMedia>) {
    let media = Arc::new(media);
    let controller = Controller::new(Config::default(), media.clone(), Arc::new(translator));
    (controller, media)
}

#[tokio::test]
async fn test_runFile_withSubtitleAndCompanionMedia_shouldWriteAllArtifacts() {
    init_logging();
    let dir = create_temp_dir().unwrap();
    let input = create_source_subtitle(dir.path(), "movie.en.srt").unwrap();
    create_test_file(dir.path(), "movie.mkv", b"not really a movie").unwrap();
    let speech = vec![TimeWindow::new(300_000, 305_000), TimeWindow::new(320_000, 322_000)];
    let (controller, media) = setup(MockMedia::available().with_speech(speech), EchoTranslator::default());

    let outcome = controller.run_file(&input, None).await;

    assert_eq!(outcome.reason, ExitReason::Success, "{}", outcome.message);
    assert_eq!(outcome.output, Some(dir.path().join("movie.nl.srt")));
    assert_eq!(media.speech_calls(), 1);
    assert_eq!(
        file_names(dir.path()),
        vec![
            "movie.en.srt",
            "movie.mkv",
            "movie.nl.draft-map.json",
            "movie.nl.merges.json",
            "movie.nl.qc.json",
            "movie.nl.report.json",
            "movie.nl.srt",
        ]
    );

    let written = SubtitleFile::load(dir.path().join("movie.nl.srt")).unwrap();
    assert_eq!(written.cues().len(), 2);
    assert_eq!(written.cues()[0].start_ms, 300_000);
    let merges = MergeReport::load(dir.path().join("movie.nl.merges.json")).unwrap();
    assert_eq!(merges.statistics.merges_performed, 1);
}

#[tokio::test]
async fn test_runFile_withMissingInput_shouldExitWithCodeTwo() {
    let dir = create_temp_dir().unwrap();
    let (controller, _) = setup(MockMedia::available(), EchoTranslator::default());

    let outcome = controller.run_file(&dir.path().join("nothing.srt"), None).await;

    assert_eq!(outcome.reason, ExitReason::MissingInput);
    assert_eq!(outcome.reason.code(), 2);
    assert!(outcome.output.is_none());
}

#[tokio::test]
async fn test_runFile_withTranslatorFailure_shouldWriteNothing() {
    let dir = create_temp_dir().unwrap();
    let input = create_source_subtitle(dir.path(), "movie.en.srt").unwrap();
    let (controller, _) = setup(MockMedia::available(), EchoTranslator::failing_on("knew"));

    let outcome = controller.run_file(&input, None).await;

    assert_eq!(outcome.reason, ExitReason::CollaboratorFailed);
    assert_eq!(outcome.reason.code(), 5);
    assert_eq!(file_names(dir.path()), vec!["movie.en.srt"]);
}

#[tokio::test]
async fn test_runFile_withUndecodableBytes_shouldCarryEncodingWarning() {
    let dir = create_temp_dir().unwrap();
    // 0x81 and 0x8D have no Windows-1252 mapping
    let input = create_test_file(
        dir.path(),
        "lossy.en.srt",
        b"1\r\n00:00:01,000 --> 00:00:03,000\r\nBad \x81\x8D bytes\r\n",
    )
    .unwrap();
    let (controller, _) = setup(MockMedia::available(), EchoTranslator::default());

    let outcome = controller.run_file(&input, None).await;

    let warning = outcome.encoding_warning.as_ref().expect("lossy decode should be reported");
    assert!(warning.lossy_fallback);
    assert!(outcome.parse_errors.is_empty());
    assert_eq!(outcome.reason, ExitReason::ValidationFailed);
    assert_eq!(outcome.output, Some(dir.path().join("lossy.nl.srt")));
    assert!(outcome.message.contains("source:"), "{}", outcome.message);

    let report = fs::read_to_string(dir.path().join("lossy.nl.report.json")).unwrap();
    assert!(report.contains("\"encoding_warning\""));
    assert!(report.contains("\"lossy_fallback\": true"));
}

#[tokio::test]
async fn test_runFile_withMalformedBlock_shouldListParseErrors() {
    let dir = create_temp_dir().unwrap();
    let input = create_test_file(
        dir.path(),
        "gappy.en.srt",
        b"1\n00:00:01,000 --> 00:00:03,000\nFine.\n\n2\nnot a timing line\nLost.\n\n3\n00:00:05,000 --> 00:00:07,000\nAlso fine.\n",
    )
    .unwrap();
    let (controller, _) = setup(MockMedia::available(), EchoTranslator::default());

    let outcome = controller.run_file(&input, None).await;

    assert_eq!(outcome.parse_errors.len(), 1);
    assert!(outcome.encoding_warning.is_none());
    assert_eq!(outcome.reason, ExitReason::ValidationFailed);
    assert!(dir.path().join("gappy.nl.srt").exists());
}

#[tokio::test]
async fn test_runBatch_withOneFailingFile_shouldFinishOthersAndReportWorst() {
    let dir = create_temp_dir().unwrap();
    let good = create_source_subtitle(dir.path(), "good.en.srt").unwrap();
    let bad = create_test_file(
        dir.path(),
        "bad.en.srt",
        b"1\n00:00:01,000 --> 00:00:03,000\nThis one is broken.\n",
    )
    .unwrap();
    let other = create_source_subtitle(dir.path(), "other.en.srt").unwrap();
    let (controller, _) = setup(MockMedia::available(), EchoTranslator::failing_on("broken"));

    let summary = controller.run_batch(vec![good, bad, other], None).await;

    assert_eq!(summary.outcomes.len(), 3);
    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.reason, ExitReason::CollaboratorFailed);
    assert!(dir.path().join("good.nl.srt").exists());
    assert!(dir.path().join("other.nl.srt").exists());
    assert!(!dir.path().join("bad.nl.srt").exists());
}

#[tokio::test]
async fn test_preflight_withUnavailableTool_shouldBeToolUnavailable() {
    let (controller, _) = setup(MockMedia::unavailable(), EchoTranslator::default());

    let error = controller.preflight().await.unwrap_err();

    assert!(matches!(error, MediaError::ToolUnavailable { .. }));
    assert_eq!(cueforge::AppError::from(error).exit_code(), 4);
}

#[tokio::test]
async fn test_runFile_withMediaInput_shouldExtractSourceStream() {
    let dir = create_temp_dir().unwrap();
    let input = create_test_file(dir.path(), "episode.mkv", b"container bytes").unwrap();
    let out_dir = dir.path().join("out");
    let (controller, media) = setup(MockMedia::available().with_subtitle(SOURCE_SRT), EchoTranslator::default());

    let outcome = controller.run_file(&input, Some(&out_dir)).await;

    assert_eq!(outcome.reason, ExitReason::Success, "{}", outcome.message);
    assert_eq!(media.extract_calls.load(Ordering::SeqCst), 1);
    assert_eq!(media.speech_calls(), 1);
    assert!(out_dir.join("episode.nl.srt").exists());
}

#[tokio::test]
async fn test_runFile_withMediaWithoutSubtitles_shouldFailAsCollaborator() {
    let dir = create_temp_dir().unwrap();
    let input = create_test_file(dir.path(), "episode.mkv", b"container bytes").unwrap();
    let (controller, _) = setup(MockMedia::available(), EchoTranslator::default());

    let outcome = controller.run_file(&input, None).await;

    assert_ne!(outcome.reason, ExitReason::Success);
    assert!(outcome.output.is_none());
}

#[tokio::test]
async fn test_runFile_withExistingOutput_shouldSkipUnlessForced() {
    let dir = create_temp_dir().unwrap();
    let input = create_source_subtitle(dir.path(), "movie.en.srt").unwrap();
    let existing = create_test_file(dir.path(), "movie.nl.srt", b"keep me").unwrap();

    let (controller, _) = setup(MockMedia::available(), EchoTranslator::default());
    let outcome = controller.run_file(&input, None).await;
    assert_eq!(outcome.reason, ExitReason::Success);
    assert_eq!(fs::read(&existing).unwrap(), b"keep me");

    let (controller, _) = setup(MockMedia::available(), EchoTranslator::default());
    let controller = controller.with_force_overwrite(true);
    let outcome = controller.run_file(&input, None).await;
    assert_eq!(outcome.reason, ExitReason::Success);
    assert_ne!(fs::read(&existing).unwrap(), b"keep me");
}

#[test]
fn test_collectInputs_withDirectory_shouldSkipTargetOutputs() {
    let dir = create_temp_dir().unwrap();
    create_source_subtitle(dir.path(), "a.en.srt").unwrap();
    create_source_subtitle(dir.path(), "a.nl.srt").unwrap();
    create_test_file(dir.path(), "b.mkv", b"container").unwrap();
    create_test_file(dir.path(), "notes.txt", b"ignored").unwrap();
    let (controller, _) = setup(MockMedia::available(), EchoTranslator::default());

    let mut inputs: Vec<String> = controller
        .collect_inputs(dir.path())
        .unwrap()
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect();
    inputs.sort();

    assert_eq!(inputs, vec!["a.en.srt", "b.mkv"]);
}

#[test]
fn test_collectInputs_withEmptyDirectory_shouldBeMissingInput() {
    let dir = create_temp_dir().unwrap();
    let (controller, _) = setup(MockMedia::available(), EchoTranslator::default());

    let error = controller.collect_inputs(dir.path()).unwrap_err();

    assert_eq!(cueforge::AppError::from(error).exit_reason(), ExitReason::MissingInput);
}
