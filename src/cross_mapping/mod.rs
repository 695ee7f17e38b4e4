/*!
 * Mapping final cues back to the source cues they translate.
 *
 * Ordinal indices change with every renumber, start times do not: the
 * merge engine keeps the first absorbed cue's start, re-timing only moves
 * ends. Every join in this module is therefore a start-time join with a
 * small tolerance.
 *
 * - `draft_map`: draft cue -> source cues, captured right after translation
 * - `resolver`: final cue -> merge record -> draft entry -> source windows
 * - `timing_qc`: resolved windows and cue boundaries against speech activity
 */

pub mod draft_map;
pub mod resolver;
pub mod timing_qc;

pub use draft_map::{build_draft_mapping, DraftMapping, DraftMappingEntry};
pub use resolver::{match_by_start_time, resolve_source_window, DraftIndex, MergeIndex, Resolution, Timed};
pub use timing_qc::{flag_misalignment, QcFinding, QcReport, QcSettings, TimingQc};
