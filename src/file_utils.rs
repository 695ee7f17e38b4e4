use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::subtitle_processor::timecode::looks_like_timing_line;

// @module: File and directory utilities

/// Container extensions handed to the media tool
pub const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "ogv", "ts", "mts", "m2ts",
];

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.as_os_str().is_empty() && !path.exists() {
            fs::create_dir_all(path).with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    // @generates: `<output_dir>/<stem>.<language>.<suffix>`
    // @params: input_file, output_dir, language, suffix (e.g. "srt", "merge-report.json")
    pub fn generate_output_path<P1: AsRef<Path>, P2: AsRef<Path>>(
        input_file: P1,
        output_dir: P2,
        language: &str,
        suffix: &str,
    ) -> PathBuf {
        let stem = input_file.as_ref().file_stem().unwrap_or_default();

        let mut output_filename = stem.to_string_lossy().to_string();
        output_filename.push('.');
        output_filename.push_str(language);
        output_filename.push('.');
        output_filename.push_str(suffix.trim_start_matches('.'));

        output_dir.as_ref().join(output_filename)
    }

    /// Find files with any of `extensions` below `dir`, sorted by path
    pub fn find_files<P: AsRef<Path>>(dir: P, extensions: &[&str]) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();

        for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_file() {
                if let Some(ext) = path.extension() {
                    let ext = ext.to_string_lossy();
                    if extensions.iter().any(|e| ext.eq_ignore_ascii_case(e.trim_start_matches('.'))) {
                        result.push(path.to_path_buf());
                    }
                }
            }
        }

        result.sort();
        Ok(result)
    }

    /// Read a file to a string
    pub fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String> {
        fs::read_to_string(&path).with_context(|| format!("Failed to read file: {:?}", path.as_ref()))
    }

    /// Read a file to bytes
    pub fn read_bytes<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
        fs::read(&path).with_context(|| format!("Failed to read file: {:?}", path.as_ref()))
    }

    /// Write `content` to `path` so readers see either the old file or the new one.
    ///
    /// The data goes to a temp file in the same directory first and is
    /// renamed over the target once flushed.
    pub fn write_atomic<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, content: C) -> Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::ensure_dir(&parent)?;

        let mut temp = NamedTempFile::new_in(&parent)
            .with_context(|| format!("Failed to create temp file in {:?}", parent))?;
        temp.write_all(content.as_ref())
            .with_context(|| format!("Failed to write temp file for {:?}", path))?;
        temp.as_file()
            .sync_all()
            .with_context(|| format!("Failed to flush temp file for {:?}", path))?;
        temp.persist(path)
            .with_context(|| format!("Failed to move output into place: {:?}", path))?;
        Ok(())
    }

    /// Detect if a file is a subtitle file (SRT) or a media container
    pub fn detect_file_type<P: AsRef<Path>>(path: P) -> Result<FileType> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("File does not exist: {:?}", path));
        }

        if let Some(ext) = path.extension() {
            let ext = ext.to_string_lossy().to_lowercase();
            if ext == "srt" {
                return Ok(FileType::Subtitle);
            }
            if MEDIA_EXTENSIONS.contains(&ext.as_str()) {
                return Ok(FileType::Video);
            }
        }

        // Sniff the first few lines for an SRT timing line
        if let Ok(bytes) = fs::read(path) {
            let head = String::from_utf8_lossy(&bytes[..bytes.len().min(4096)]).to_string();
            if head.lines().take(10).any(looks_like_timing_line) {
                return Ok(FileType::Subtitle);
            }
        }

        Ok(FileType::Unknown)
    }
}

/// Enum representing different file types
#[derive(Debug, PartialEq, Eq)]
pub enum FileType {
    /// Subtitle file (SRT)
    Subtitle,
    /// Container handled by the media tool
    Video,
    /// Unknown file type
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generateOutputPath_shouldInsertLanguage() {
        let path = FileManager::generate_output_path("/in/movie.mkv", "/out", "nl", "merge-report.json");
        assert_eq!(path, PathBuf::from("/out/movie.nl.merge-report.json"));
    }

    #[test]
    fn test_writeAtomic_shouldReplaceExistingContent() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested").join("out.srt");
        FileManager::write_atomic(&target, "first").unwrap();
        FileManager::write_atomic(&target, b"second").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "second");
        let leftovers = fs::read_dir(target.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_detectFileType_withUnknownExtension_shouldSniffSrt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("subs.txt");
        fs::write(&path, "1\n00:00:01,000 --> 00:00:02,000\nHello\n").unwrap();
        assert_eq!(FileManager::detect_file_type(&path).unwrap(), FileType::Subtitle);
    }

    #[test]
    fn test_findFiles_shouldMatchExtensionsCaseInsensitively() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.SRT"), "").unwrap();
        fs::write(dir.path().join("b.mkv"), "").unwrap();
        fs::write(dir.path().join("c.txt"), "").unwrap();
        let found = FileManager::find_files(dir.path(), &["srt", "mkv"]).unwrap();
        assert_eq!(found.len(), 2);
    }
}
