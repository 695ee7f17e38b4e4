/*!
 * Tests for error types and exit codes
 */

use cueforge::errors::{AppError, ExitReason, MediaError, ProviderError, TranslationError};

#[test]
fn test_exitCode_shouldMatchDocumentedCodes() {
    let cases = vec![
        (AppError::Unknown("boom".into()), 1),
        (AppError::MissingInput("movie.srt".into()), 2),
        (AppError::Validation("2 unfixable cues".into()), 3),
        (
            AppError::Media(MediaError::ToolUnavailable {
                tool: "ffprobe".into(),
                reason: "not found".into(),
            }),
            4,
        ),
        (
            AppError::Media(MediaError::Timeout {
                tool: "ffmpeg".into(),
                secs: 600,
            }),
            5,
        ),
        (AppError::Provider(ProviderError::ConnectionError("refused".into())), 5),
        (AppError::Config("bad cps".into()), 6),
    ];
    for (error, code) in cases {
        assert_eq!(error.exit_code(), code, "{}", error);
    }
}

#[test]
fn test_fromAnyhow_withTranslationError_shouldBeCollaboratorFailure() {
    let error = anyhow::Error::new(TranslationError::InvalidResponse("no markers".into()));
    let app = AppError::from(error);
    assert_eq!(app.exit_reason(), ExitReason::CollaboratorFailed);
}

#[test]
fn test_fromAnyhow_withMissingMedia_shouldBeMissingInput() {
    let error = anyhow::Error::new(MediaError::MissingInput("movie.mkv".into()));
    assert_eq!(AppError::from(error).exit_code(), 2);
}

#[test]
fn test_worst_shouldFoldBatchOutcomes() {
    let folded = [ExitReason::Success, ExitReason::ValidationFailed, ExitReason::CollaboratorFailed]
        .into_iter()
        .fold(ExitReason::Success, ExitReason::worst);
    assert_eq!(folded, ExitReason::CollaboratorFailed);
    assert_eq!(folded.code(), 5);
}
