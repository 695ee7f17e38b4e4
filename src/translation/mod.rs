/*!
 * Translation collaborator.
 *
 * The pipeline only sees the `Translator` trait: a batch of source cues
 * in, a draft batch out. A draft cue always carries the timings of the
 * source cue(s) it translates, may cover several consecutive source cues,
 * and may carry a `[SC]` / `[NM]` merge hint.
 *
 * - `prompts`: system and user prompt construction
 * - `batch`: chunking and `<<ENTRY_N>>` response parsing
 * - `llm`: `LlmTranslator`, the `ChatProvider`-backed implementation
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::TranslationError;
use crate::subtitle_processor::cue::Cue;

pub mod batch;
pub mod llm;
pub mod prompts;

pub use batch::{chunk_cues, parse_entries, EntryAnswer};
pub use llm::LlmTranslator;

// @struct: What the translated text has to fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationStyle {
    pub source_language: String,

    pub target_language: String,

    pub max_chars_per_line: usize,

    pub max_lines: usize,

    // @field: Reading speed the wording should aim for
    pub target_cps: f64,

    // @field: Free-form extra instructions (register, names, glossary)
    #[serde(default)]
    pub notes: Option<String>,
}

impl Default for TranslationStyle {
    fn default() -> Self {
        Self {
            source_language: "en".to_string(),
            target_language: "nl".to_string(),
            max_chars_per_line: 42,
            max_lines: 2,
            target_cps: 12.5,
            notes: None,
        }
    }
}

/// Source cues in, draft cues out
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `cues` in order.
    ///
    /// Returns at most `cues.len()` cues, sorted by start, each starting at
    /// the start of a source cue.
    async fn translate_batch(&self, cues: &[Cue], style: &TranslationStyle) -> Result<Vec<Cue>, TranslationError>;
}
