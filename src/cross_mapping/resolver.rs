use std::collections::BTreeMap;

use serde::Serialize;

use crate::merge::record::MergeRecord;
use crate::subtitle_processor::cue::{Cue, TimeWindow};

use super::draft_map::{DraftMapping, DraftMappingEntry};

/// Anything with a display window that can be joined on start time
pub trait Timed {
    fn start_ms(&self) -> u64;
    fn end_ms(&self) -> u64;

    fn time_window(&self) -> TimeWindow {
        TimeWindow::new(self.start_ms(), self.end_ms())
    }
}

impl Timed for Cue {
    fn start_ms(&self) -> u64 {
        self.start_ms
    }
    fn end_ms(&self) -> u64 {
        self.end_ms
    }
}

impl Timed for TimeWindow {
    fn start_ms(&self) -> u64 {
        self.start_ms
    }
    fn end_ms(&self) -> u64 {
        self.end_ms
    }
}

impl Timed for MergeRecord {
    fn start_ms(&self) -> u64 {
        self.output_start_ms
    }
    fn end_ms(&self) -> u64 {
        self.output_end_ms
    }
}

impl Timed for DraftMappingEntry {
    fn start_ms(&self) -> u64 {
        self.translated_start_ms
    }
    fn end_ms(&self) -> u64 {
        self.translated_end_ms
    }
}

/// Candidates whose start lies within `tolerance_ms` of `start_ms`, nearest first
pub fn match_by_start_time<T: Timed>(start_ms: u64, candidates: &[T], tolerance_ms: u64) -> Vec<&T> {
    let mut matched: Vec<&T> = candidates
        .iter()
        .filter(|c| c.start_ms().abs_diff(start_ms) <= tolerance_ms)
        .collect();
    matched.sort_by_key(|c| (c.start_ms().abs_diff(start_ms), c.start_ms()));
    matched
}

/// Start-keyed lookup with a tolerance, returning the nearest key's value
#[derive(Debug, Clone, Default)]
struct StartIndex {
    by_start: BTreeMap<u64, Vec<TimeWindow>>,
    tolerance_ms: u64,
}

impl StartIndex {
    fn lookup(&self, start_ms: u64) -> Option<&[TimeWindow]> {
        let low = start_ms.saturating_sub(self.tolerance_ms);
        let high = start_ms.saturating_add(self.tolerance_ms);
        self.by_start
            .range(low..=high)
            .min_by_key(|(key, _)| key.abs_diff(start_ms))
            .map(|(_, windows)| windows.as_slice())
    }

    fn len(&self) -> usize {
        self.by_start.len()
    }
}

/// Final cue start -> source timecodes of the merge that produced it
#[derive(Debug, Clone, Default)]
pub struct MergeIndex(StartIndex);

impl MergeIndex {
    pub fn from_records(records: &[MergeRecord], tolerance_ms: u64) -> Self {
        let by_start = records
            .iter()
            .map(|r| (r.output_start_ms, r.source_timecodes.clone()))
            .collect();
        Self(StartIndex { by_start, tolerance_ms })
    }

    pub fn lookup(&self, start_ms: u64) -> Option<&[TimeWindow]> {
        self.0.lookup(start_ms)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.len() == 0
    }
}

/// Draft cue start -> matched original-language windows
#[derive(Debug, Clone, Default)]
pub struct DraftIndex(StartIndex);

impl DraftIndex {
    pub fn from_mapping(mapping: &DraftMapping, tolerance_ms: u64) -> Self {
        let by_start = mapping
            .mappings
            .iter()
            .filter(|e| !e.source_timecodes.is_empty())
            .map(|e| (e.translated_start_ms, e.source_timecodes.clone()))
            .collect();
        Self(StartIndex { by_start, tolerance_ms })
    }

    pub fn lookup(&self, start_ms: u64) -> Option<&[TimeWindow]> {
        self.0.lookup(start_ms)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.len() == 0
    }
}

/// Which joins produced a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    /// Merge record, then draft mapping for every absorbed cue
    MergeAndDraft,
    /// Merge record only; some absorbed cues had no draft entry
    MergeOnly,
    /// Not merged, draft mapping directly
    Draft,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    // @field: Source windows, sorted and de-duplicated
    pub windows: Vec<TimeWindow>,
    pub via: ResolutionPath,
}

impl Resolution {
    /// One window covering every resolved source window
    pub fn span(&self) -> Option<TimeWindow> {
        TimeWindow::span(&self.windows)
    }
}

/// Recover the original-language window(s) a final cue translates.
///
/// Joins on start time only: the final cue's start is looked up among merge
/// outputs, each absorbed source start among draft entries. A cue that was
/// never merged goes straight to the draft index. `None` means no signal.
pub fn resolve_source_window(final_cue: &Cue, merges: &MergeIndex, drafts: &DraftIndex) -> Option<Resolution> {
    let (mut windows, via) = match merges.lookup(final_cue.start_ms) {
        Some(absorbed) => {
            let mut windows = Vec::new();
            let mut all_mapped = true;
            for source in absorbed {
                match drafts.lookup(source.start_ms) {
                    Some(mapped) => windows.extend_from_slice(mapped),
                    None => {
                        all_mapped = false;
                        windows.push(*source);
                    }
                }
            }
            let via = if all_mapped { ResolutionPath::MergeAndDraft } else { ResolutionPath::MergeOnly };
            (windows, via)
        }
        None => (drafts.lookup(final_cue.start_ms)?.to_vec(), ResolutionPath::Draft),
    };

    if windows.is_empty() {
        return None;
    }
    windows.sort_by_key(|w| (w.start_ms, w.end_ms));
    windows.dedup();
    Some(Resolution { windows, via })
}
