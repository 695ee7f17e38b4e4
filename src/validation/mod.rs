/*!
 * Constraint checking, line breaking and structural repair.
 *
 * # Architecture
 *
 * - `constraints`: frame-rate dependent thresholds and pure per-cue evaluation
 * - `line_breaking`: two-line break selection shared by repair and merge
 * - `structure`: ordering, overlap, gap and line checks with safe repair
 * - `report`: CPS statistics and line-balance diagnostics
 */

pub mod constraints;
pub mod line_breaking;
pub mod report;
pub mod structure;

// Re-export main types
pub use constraints::{ConstraintKind, ConstraintOverrides, ConstraintTable, Evaluation, FrameRate, Violation};
pub use line_breaking::LineBreaker;
pub use report::{CpsReport, LineBalanceReport};
pub use structure::{FixOutcome, StructuralReport, StructuralValidator, TypographyRules, Unfixable};
