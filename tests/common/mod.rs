/*!
 * Common test utilities for the cueforge test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::TempDir;

use cueforge::subtitle_processor::Cue;

// Re-export the mock collaborators
pub mod mock_media;
pub mod mock_providers;

static INIT_LOGGER: Once = Once::new();

/// Route `log` output through env_logger (RUST_LOG) once per test binary
pub fn init_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &[u8]) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Source subtitle with a mergeable pair at 00:05:00 and 00:05:03
pub const SOURCE_SRT: &str = "1
00:05:00,000 --> 00:05:02,500
I knew it all along

2
00:05:03,000 --> 00:05:05,000
because you told me.

3
00:05:20,000 --> 00:05:22,000
See you later.
";

/// Creates the sample source subtitle
pub fn create_source_subtitle(dir: &Path, filename: &str) -> Result<PathBuf> {
    create_test_file(dir, filename, SOURCE_SRT.as_bytes())
}

/// `count` evenly spaced cues, 2.5s each with 0.5s gaps
pub fn numbered_cues(count: usize) -> Vec<Cue> {
    (0..count)
        .map(|i| {
            let start = i as u64 * 3_000;
            Cue::new(i + 1, start, start + 2_500, format!("Line number {}", i + 1))
        })
        .collect()
}

/// Names of the files in `dir`, sorted
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
