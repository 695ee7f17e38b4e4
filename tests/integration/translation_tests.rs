/*!
 * LLM translator against an in-process chat provider
 */

use std::sync::Arc;

use cueforge::translation::llm::BatchLimits;
use cueforge::translation::{LlmTranslator, TranslationStyle, Translator};

use crate::common::mock_providers::EchoProvider;
use crate::common::{init_logging, numbered_cues};

#[tokio::test]
async fn test_translateBatch_withMoreCuesThanOneRequest_shouldChunkAndKeepTimings() {
    init_logging();
    let cues = numbered_cues(95);
    let provider = Arc::new(EchoProvider::default());
    let limits = BatchLimits {
        max_entries: 40,
        ..BatchLimits::default()
    };
    let translator = LlmTranslator::new(provider.clone(), limits);

    let drafts = translator.translate_batch(&cues, &TranslationStyle::default()).await.unwrap();

    assert_eq!(provider.calls(), 3);
    assert_eq!(drafts.len(), cues.len());
    for (draft, source) in drafts.iter().zip(&cues) {
        assert_eq!((draft.start_ms, draft.end_ms), (source.start_ms, source.end_ms));
        assert_eq!(draft.text, source.text);
    }
}

#[tokio::test]
async fn test_translateBatch_withSkippedEntries_shouldRetryOnceAndFillTheGap() {
    let cues = numbered_cues(5);
    let provider = Arc::new(EchoProvider {
        skip_first_time: vec![2, 3],
        ..EchoProvider::default()
    });
    let translator = LlmTranslator::new(provider.clone(), BatchLimits::default());

    let drafts = translator.translate_batch(&cues, &TranslationStyle::default()).await.unwrap();

    assert_eq!(provider.calls(), 2);
    assert_eq!(drafts.iter().map(|c| c.index).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    assert_eq!(drafts[1].text, "Line number 2");
}

#[test]
fn test_translateBatch_withNoCues_shouldNotCallProvider() {
    let provider = Arc::new(EchoProvider::default());
    let translator = LlmTranslator::new(provider.clone(), BatchLimits::default());

    let drafts = tokio_test::block_on(translator.translate_batch(&[], &TranslationStyle::default())).unwrap();

    assert!(drafts.is_empty());
    assert_eq!(provider.calls(), 0);
}
