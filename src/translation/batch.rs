use std::ops::Range;

use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::subtitle_processor::cue::{Cue, SpeakerMarker};

// @const: Marker line, optionally a range, optionally followed by echoed hints
static ENTRY_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*<<ENTRY_(\d+)(?:-(\d+))?>>[^\n]*$").unwrap());

/// Split `cues` into consecutive ranges of at most `max_entries` cues and
/// roughly `max_chars` characters of text. An oversized cue gets its own range.
pub fn chunk_cues(cues: &[Cue], max_entries: usize, max_chars: usize) -> Vec<Range<usize>> {
    let max_entries = max_entries.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut size = 0;

    for (i, cue) in cues.iter().enumerate() {
        let len = cue.text.chars().count();
        let full = i - start >= max_entries || (size + len > max_chars && i > start);
        if full {
            chunks.push(start..i);
            start = i;
            size = 0;
        }
        size += len;
    }
    if start < cues.len() {
        chunks.push(start..cues.len());
    }
    chunks
}

// @struct: One answered block, entries `first..=last` (1-based)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryAnswer {
    pub first: usize,
    pub last: usize,
    pub text: String,
}

/// Cut a model answer into its `<<ENTRY_N>>` / `<<ENTRY_N-M>>` blocks.
///
/// Text before the first marker is ignored. Blank lines inside a block are
/// dropped and each line is trimmed.
pub fn parse_entries(response: &str) -> Vec<EntryAnswer> {
    let markers: Vec<(usize, usize, usize, usize)> = ENTRY_MARKER
        .captures_iter(response)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let first: usize = caps[1].parse().ok()?;
            let last: usize = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(first);
            Some((whole.start(), whole.end(), first, last))
        })
        .collect();

    markers
        .iter()
        .enumerate()
        .map(|(i, &(_, body_start, first, last))| {
            let body_end = markers.get(i + 1).map(|m| m.0).unwrap_or(response.len());
            let text = response[body_start..body_end]
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            EntryAnswer { first, last, text }
        })
        .collect()
}

/// Draft cues for the answered entries, plus the 0-based positions nobody answered.
///
/// Answers out of range, overlapping an earlier answer or without text are
/// dropped. A draft cue spans from its first entry's start to its last
/// entry's end.
pub fn answers_to_cues(entries: &[Cue], answers: &[EntryAnswer]) -> (Vec<Cue>, Vec<usize>) {
    let mut covered = vec![false; entries.len()];
    let mut drafts = Vec::new();

    let mut sorted: Vec<&EntryAnswer> = answers.iter().collect();
    sorted.sort_by_key(|a| (a.first, a.last));

    for answer in sorted {
        let valid = answer.first >= 1 && answer.first <= answer.last && answer.last <= entries.len();
        if !valid {
            warn!("Ignoring answer for entries {}-{} (batch has {})", answer.first, answer.last, entries.len());
            continue;
        }
        let span = answer.first - 1..answer.last;
        if covered[span.clone()].iter().any(|c| *c) {
            warn!("Ignoring overlapping answer for entries {}-{}", answer.first, answer.last);
            continue;
        }
        let (marker, text) = SpeakerMarker::extract(&answer.text);
        // Model output gets no round-trip guarantee
        let text = text.trim_start().to_string();
        if text.is_empty() {
            continue;
        }

        for flag in &mut covered[span.clone()] {
            *flag = true;
        }
        let head = &entries[span.start];
        let tail = &entries[span.end - 1];
        drafts.push(Cue::new(head.index, head.start_ms, tail.end_ms, text).with_marker(marker));
    }

    let missing = covered
        .iter()
        .enumerate()
        .filter(|(_, c)| !**c)
        .map(|(i, _)| i)
        .collect();
    (drafts, missing)
}
