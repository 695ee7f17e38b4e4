/*!
 * Cue model and SRT codec.
 *
 * Every stage of the pipeline reads and writes subtitles through this module:
 *
 * - `cue`: the canonical `Cue` type, speaker markers, CPS and time windows
 * - `timecode`: range-checked `HH:MM:SS,mmm` conversion
 * - `encoding`: input encoding detection with flagged lossy fallback
 * - `codec`: block parser, canonical serializer, renumbering
 * - `sdh`: removal of hearing-impaired annotations
 * - `credit`: closing credit cue
 */

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::errors::AppError;
use crate::file_utils::FileManager;

pub mod codec;
pub mod credit;
pub mod cue;
pub mod encoding;
pub mod sdh;
pub mod timecode;

pub use codec::{parse, parse_str, renumber, serialize, to_srt_string, ParseOutcome, SourceDiagnostics};
pub use cue::{Cps, Cue, SpeakerMarker, TimeWindow};
pub use encoding::TextEncoding;
pub use timecode::{ms_to_timecode, timecode_to_ms};

// @struct: Subtitle file loaded from disk
#[derive(Debug, Clone)]
pub struct SubtitleFile {
    // @field: Where the cues came from
    pub path: PathBuf,

    // @field: Parsed cues plus collected errors
    pub outcome: ParseOutcome,
}

impl SubtitleFile {
    /// Read and parse an SRT file. A missing file is an `AppError::MissingInput`;
    /// malformed blocks are not errors here, they are in `outcome.errors`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !FileManager::file_exists(path) {
            return Err(AppError::MissingInput(path.display().to_string()).into());
        }

        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read subtitle file: {:?}", path))?;
        let outcome = parse(&bytes);

        debug!(
            "Parsed {:?}: {} cues, {} errors, encoding {}",
            path,
            outcome.cues.len(),
            outcome.errors.len(),
            outcome.encoding
        );
        for error in &outcome.errors {
            warn!("{:?}: {}", path, error);
        }

        Ok(Self {
            path: path.to_path_buf(),
            outcome,
        })
    }

    pub fn cues(&self) -> &[Cue] {
        &self.outcome.cues
    }

    /// Cues plus what parsing reported about them
    pub fn into_parts(self) -> (Vec<Cue>, SourceDiagnostics) {
        self.outcome.into_parts()
    }
}

/// Write cues atomically in the canonical format
pub fn write_srt<P: AsRef<Path>>(path: P, cues: &[Cue]) -> Result<()> {
    FileManager::write_atomic(path, &serialize(cues))
}
