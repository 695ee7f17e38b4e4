/*!
 * Merging of adjacent cues into longer display units.
 *
 * - `engine`: the grouping decision and text combination
 * - `record`: provenance records and the persisted merge report
 */

pub mod engine;
pub mod record;

pub use engine::{MergeEngine, MergePlan};
pub use record::{MergeParameters, MergeRecord, MergeReport, MergeStatistics};
