/*!
 * Draft-to-source mapping.
 *
 * Built once, right after translation and before any fix, merge or
 * renumber. Draft cues inherit their source cue's start time from the
 * translator, so start-time proximity is a reliable join at that moment.
 * Persisted as `<stem>.<lang>.draft-map.json`.
 */

use std::path::Path;

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::file_utils::FileManager;
use crate::subtitle_processor::cue::{Cue, TimeWindow};

use super::resolver::match_by_start_time;

// @struct: One draft cue and the source cues it was matched to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftMappingEntry {
    pub translated_start_ms: u64,

    pub translated_end_ms: u64,

    // @field: Source ordinals, informational only
    pub source_indices: Vec<usize>,

    pub source_timecodes: Vec<TimeWindow>,
}

impl DraftMappingEntry {
    pub fn is_matched(&self) -> bool {
        !self.source_timecodes.is_empty()
    }

    pub fn source_window(&self) -> Option<TimeWindow> {
        TimeWindow::span(&self.source_timecodes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftMappingParameters {
    pub tolerance_ms: u64,
    pub fallback_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftMappingStatistics {
    pub translated_cues: usize,
    pub source_cues: usize,
    pub matched: usize,
    pub unmatched: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftMapping {
    pub parameters: DraftMappingParameters,
    pub statistics: DraftMappingStatistics,
    pub mappings: Vec<DraftMappingEntry>,
}

impl DraftMapping {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize draft mapping")?;
        FileManager::write_atomic(path, json.as_bytes())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = FileManager::read_to_string(path)?;
        serde_json::from_str(&content).with_context(|| format!("Invalid draft mapping: {:?}", path))
    }
}

/// Match each draft cue to the source cues starting within `tolerance_ms`.
///
/// Without such a match, the single nearest source cue is taken when it is
/// within `fallback_ms`; otherwise the entry stays unmatched.
pub fn build_draft_mapping(draft: &[Cue], source: &[Cue], tolerance_ms: u64, fallback_ms: u64) -> DraftMapping {
    let mappings: Vec<DraftMappingEntry> = draft
        .iter()
        .map(|cue| {
            let mut matched = match_by_start_time(cue.start_ms, source, tolerance_ms);
            if matched.is_empty() {
                matched = match_by_start_time(cue.start_ms, source, fallback_ms);
                matched.truncate(1);
            }
            matched.sort_by_key(|c| c.start_ms);

            DraftMappingEntry {
                translated_start_ms: cue.start_ms,
                translated_end_ms: cue.end_ms,
                source_indices: matched.iter().map(|c| c.index).collect(),
                source_timecodes: matched.iter().map(|c| c.window()).collect(),
            }
        })
        .collect();

    let matched = mappings.iter().filter(|m| m.is_matched()).count();
    debug!("Draft mapping: {}/{} draft cues matched", matched, draft.len());

    DraftMapping {
        parameters: DraftMappingParameters { tolerance_ms, fallback_ms },
        statistics: DraftMappingStatistics {
            translated_cues: draft.len(),
            source_cues: source.len(),
            matched,
            unmatched: draft.len() - matched,
        },
        mappings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buildDraftMapping_withinTolerance_shouldMatchAll() {
        let source = vec![Cue::new(1, 1_000, 2_000, "a"), Cue::new(2, 1_300, 2_300, "b")];
        let draft = vec![Cue::new(1, 1_000, 2_300, "ab")];
        let mapping = build_draft_mapping(&draft, &source, 500, 1_000);
        assert_eq!(mapping.mappings[0].source_indices, vec![1, 2]);
        assert_eq!(mapping.mappings[0].source_window(), Some(TimeWindow::new(1_000, 2_300)));
    }

    #[test]
    fn test_buildDraftMapping_withFallback_shouldTakeNearestOnly() {
        let source = vec![Cue::new(1, 1_800, 2_500, "a"), Cue::new(2, 5_000, 6_000, "b")];
        let draft = vec![Cue::new(1, 1_000, 2_000, "x")];
        let mapping = build_draft_mapping(&draft, &source, 500, 1_000);
        assert_eq!(mapping.mappings[0].source_indices, vec![1]);
    }

    #[test]
    fn test_buildDraftMapping_beyondFallback_shouldStayUnmatched() {
        let source = vec![Cue::new(1, 5_000, 6_000, "a")];
        let draft = vec![Cue::new(1, 1_000, 2_000, "x")];
        let mapping = build_draft_mapping(&draft, &source, 500, 1_000);
        assert!(!mapping.mappings[0].is_matched());
        assert_eq!(mapping.statistics.unmatched, 1);
    }
}
