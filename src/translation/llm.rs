use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, info, warn};

use crate::errors::TranslationError;
use crate::providers::ChatProvider;
use crate::subtitle_processor::cue::Cue;

use super::batch::{answers_to_cues, chunk_cues, parse_entries};
use super::prompts::{system_prompt, user_prompt};
use super::{TranslationStyle, Translator};

// @struct: Request shaping for the LLM translator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_entries: usize,
    pub max_chars: usize,
    // @field: Already-translated source lines shown before each request
    pub context_lines: usize,
    pub max_concurrent: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_entries: 40,
            max_chars: 4000,
            context_lines: 3,
            max_concurrent: 2,
        }
    }
}

/// `Translator` that prompts a chat model with `<<ENTRY_N>>` blocks
#[derive(Debug, Clone)]
pub struct LlmTranslator {
    provider: Arc<dyn ChatProvider>,
    limits: BatchLimits,
}

impl LlmTranslator {
    pub fn new(provider: Arc<dyn ChatProvider>, limits: BatchLimits) -> Self {
        Self { provider, limits }
    }

    async fn request(&self, context: &[Cue], entries: &[Cue], style: &TranslationStyle) -> Result<(Vec<Cue>, Vec<usize>), TranslationError> {
        let system = system_prompt(style);
        let prompt = user_prompt(context, entries, style);
        let response = self.provider.complete(&system, &prompt).await?;
        let answers = parse_entries(&response);
        if answers.is_empty() {
            let preview: String = response.chars().take(200).collect();
            return Err(TranslationError::InvalidResponse(format!("no entry markers in answer: {}", preview)));
        }
        Ok(answers_to_cues(entries, &answers))
    }

    /// Translate one chunk; unanswered entries get one more request per contiguous run
    async fn translate_chunk(&self, cues: &[Cue], range: Range<usize>, style: &TranslationStyle) -> Result<Vec<Cue>, TranslationError> {
        let context = &cues[range.start.saturating_sub(self.limits.context_lines)..range.start];
        let entries = &cues[range.clone()];
        let (mut drafts, missing) = self.request(context, entries, style).await?;

        for run in contiguous_runs(&missing) {
            let retry_range = range.start + run.start..range.start + run.end;
            warn!(
                "{} left entries {}-{} unanswered, asking again",
                self.provider.name(),
                retry_range.start + 1,
                retry_range.end
            );
            let retry_context = &cues[retry_range.start.saturating_sub(self.limits.context_lines)..retry_range.start];
            let (retried, still_missing) = self.request(retry_context, &cues[retry_range.clone()], style).await?;
            if let Some(first) = still_missing.first() {
                let cue = &cues[retry_range.start + first];
                return Err(TranslationError::InvalidResponse(format!(
                    "no translation for cue {} at {}",
                    cue.index,
                    cue.format_timing()
                )));
            }
            drafts.extend(retried);
        }

        debug!("Chunk {}..{} -> {} draft cues", range.start, range.end, drafts.len());
        Ok(drafts)
    }
}

/// Group sorted positions into runs of consecutive values
fn contiguous_runs(positions: &[usize]) -> Vec<Range<usize>> {
    let mut runs: Vec<Range<usize>> = Vec::new();
    for &p in positions {
        match runs.last_mut() {
            Some(run) if run.end == p => run.end = p + 1,
            _ => runs.push(p..p + 1),
        }
    }
    runs
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate_batch(&self, cues: &[Cue], style: &TranslationStyle) -> Result<Vec<Cue>, TranslationError> {
        if cues.is_empty() {
            return Ok(Vec::new());
        }
        let chunks = chunk_cues(cues, self.limits.max_entries, self.limits.max_chars);
        info!(
            "Translating {} cues {} -> {} in {} requests via {}",
            cues.len(),
            style.source_language,
            style.target_language,
            chunks.len(),
            self.provider.name()
        );

        let translated: Vec<Vec<Cue>> = stream::iter(chunks)
            .map(|range| self.translate_chunk(cues, range, style))
            .buffered(self.limits.max_concurrent.max(1))
            .try_collect()
            .await?;

        let mut drafts: Vec<Cue> = translated.into_iter().flatten().collect();
        drafts.sort_by_key(|c| c.start_ms);
        Ok(drafts)
    }
}
