/*!
 * Mock translation collaborators
 *
 * - `EchoProvider`: a `ChatProvider` that answers every `<<ENTRY_N>>` block
 *   of the prompt with its own text, so `LlmTranslator` runs end to end
 *   without a network
 * - `EchoTranslator`: a `Translator` that returns the source cues, failing
 *   on request
 */

use async_trait::async_trait;
use std::fmt::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use cueforge::errors::{ProviderError, TranslationError};
use cueforge::providers::ChatProvider;
use cueforge::subtitle_processor::Cue;
use cueforge::translation::{parse_entries, TranslationStyle, Translator};

/// Answers every entry with its source text, optionally skipping some entry numbers once
#[derive(Debug, Default)]
pub struct EchoProvider {
    pub calls: AtomicUsize,
    /// Entry numbers left out of the first answer only
    pub skip_first_time: Vec<usize>,
}

impl EchoProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, _system: &str, prompt: &str) -> Result<String, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let mut answer = String::from("Here are the translations:\n");
        for entry in parse_entries(prompt) {
            if call == 0 && self.skip_first_time.contains(&entry.first) {
                continue;
            }
            let _ = writeln!(answer, "<<ENTRY_{}>>\n{}", entry.first, entry.text);
        }
        Ok(answer)
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Returns the source cues unchanged; fails when a cue contains `fail_on`
#[derive(Debug, Default)]
pub struct EchoTranslator {
    pub fail_on: Option<String>,
}

impl EchoTranslator {
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_on: Some(marker.to_string()),
        }
    }
}

#[async_trait]
impl Translator for EchoTranslator {
    async fn translate_batch(&self, cues: &[Cue], _style: &TranslationStyle) -> Result<Vec<Cue>, TranslationError> {
        if let Some(marker) = &self.fail_on {
            if cues.iter().any(|c| c.text.contains(marker.as_str())) {
                return Err(ProviderError::ConnectionError("connection refused".to_string()).into());
            }
        }
        Ok(cues.to_vec())
    }
}
