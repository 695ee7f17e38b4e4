/*!
 * Merge provenance.
 *
 * One `MergeRecord` per output cue, singletons included, so later stages
 * can map any final cue back to the source windows it absorbed without
 * re-deriving merge decisions. Persisted as `<stem>.<lang>.merges.json`.
 */

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::file_utils::FileManager;
use crate::subtitle_processor::cue::TimeWindow;

// @struct: Provenance of one output cue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRecord {
    pub output_start_ms: u64,

    pub output_end_ms: u64,

    // @field: Every absorbed source cue, in order
    pub source_timecodes: Vec<TimeWindow>,

    pub source_count: usize,

    // @field: Total gap time closed by the merge
    pub gap_ms: u64,

    pub combined_text: String,
}

impl MergeRecord {
    /// Record for a cue that was not merged with anything
    pub fn singleton(window: TimeWindow, text: &str) -> Self {
        Self {
            output_start_ms: window.start_ms,
            output_end_ms: window.end_ms,
            source_timecodes: vec![window],
            source_count: 1,
            gap_ms: 0,
            combined_text: text.to_string(),
        }
    }

    pub fn from_sources(sources: Vec<TimeWindow>, text: &str) -> Self {
        let gap_ms = sources
            .windows(2)
            .map(|pair| pair[1].start_ms.saturating_sub(pair[0].end_ms))
            .sum();
        let span = TimeWindow::span(&sources).unwrap_or(TimeWindow::new(0, 0));
        Self {
            output_start_ms: span.start_ms,
            output_end_ms: span.end_ms,
            source_count: sources.len(),
            source_timecodes: sources,
            gap_ms,
            combined_text: text.to_string(),
        }
    }

    pub fn output_window(&self) -> TimeWindow {
        TimeWindow::new(self.output_start_ms, self.output_end_ms)
    }

    pub fn is_merge(&self) -> bool {
        self.source_count > 1
    }

    /// Sources are ordered, non-overlapping and their bounds equal the output span
    pub fn is_consistent(&self) -> bool {
        let ordered = self
            .source_timecodes
            .windows(2)
            .all(|pair| pair[0].end_ms <= pair[1].start_ms);
        ordered
            && self.source_count == self.source_timecodes.len()
            && TimeWindow::span(&self.source_timecodes) == Some(self.output_window())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeParameters {
    pub gap_threshold_ms: u64,
    pub max_duration_ms: u64,
    pub max_lines: usize,
    pub max_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeStatistics {
    pub source_cues: usize,
    pub output_cues: usize,
    pub merges_performed: usize,
    pub cues_merged: usize,
    pub ratio_percent: f64,
    // @field: Output cue count by number of sources
    pub groups_by_size: BTreeMap<usize, usize>,
}

impl MergeStatistics {
    pub fn from_records(source_cues: usize, records: &[MergeRecord]) -> Self {
        let mut groups_by_size = BTreeMap::new();
        for record in records {
            *groups_by_size.entry(record.source_count).or_insert(0) += 1;
        }
        let merges: Vec<&MergeRecord> = records.iter().filter(|r| r.is_merge()).collect();
        let ratio = if source_cues > 0 {
            records.len() as f64 / source_cues as f64 * 100.0
        } else {
            100.0
        };

        Self {
            source_cues,
            output_cues: records.len(),
            merges_performed: merges.len(),
            cues_merged: merges.iter().map(|r| r.source_count).sum(),
            ratio_percent: (ratio * 10.0).round() / 10.0,
            groups_by_size,
        }
    }
}

/// The merge artifact written next to the output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub parameters: MergeParameters,
    pub statistics: MergeStatistics,
    pub merges: Vec<MergeRecord>,
}

impl MergeReport {
    pub fn new(source_cues: usize, parameters: MergeParameters, merges: Vec<MergeRecord>) -> Self {
        Self {
            statistics: MergeStatistics::from_records(source_cues, &merges),
            parameters,
            merges,
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize merge report")?;
        FileManager::write_atomic(path, json.as_bytes())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = FileManager::read_to_string(path)?;
        serde_json::from_str(&content).with_context(|| format!("Invalid merge report: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fromSources_shouldSpanAllSourcesAndSumGaps() {
        let record = MergeRecord::from_sources(
            vec![TimeWindow::new(1_000, 2_000), TimeWindow::new(2_300, 3_000), TimeWindow::new(3_100, 4_000)],
            "tekst",
        );
        assert_eq!(record.output_window(), TimeWindow::new(1_000, 4_000));
        assert_eq!(record.gap_ms, 400);
        assert_eq!(record.source_count, 3);
        assert!(record.is_consistent());
    }

    #[test]
    fn test_statistics_shouldCountGroups() {
        let records = vec![
            MergeRecord::singleton(TimeWindow::new(0, 1_000), "a"),
            MergeRecord::from_sources(vec![TimeWindow::new(2_000, 3_000), TimeWindow::new(3_200, 4_000)], "b c"),
        ];
        let stats = MergeStatistics::from_records(3, &records);
        assert_eq!(stats.output_cues, 2);
        assert_eq!(stats.merges_performed, 1);
        assert_eq!(stats.cues_merged, 2);
        assert_eq!(stats.groups_by_size.get(&1), Some(&1));
        assert_eq!(stats.groups_by_size.get(&2), Some(&1));
        assert_eq!(stats.ratio_percent, 66.7);
    }
}
