/*!
 * Tests for file utility functions
 */

use anyhow::Result;
use std::fs;

use cueforge::file_utils::{FileManager, FileType};
use crate::common;

#[test]
fn test_writeAtomic_withExistingFile_shouldReplaceContent() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = common::create_test_file(dir.path(), "out.srt", b"old")?;

    FileManager::write_atomic(&path, b"new content")?;

    assert_eq!(fs::read_to_string(&path)?, "new content");
    assert_eq!(common::file_names(dir.path()), vec!["out.srt"]);
    Ok(())
}

#[test]
fn test_writeAtomic_withFailingRename_shouldLeaveNoPartialFile() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let blocked = dir.path().join("out.srt");
    fs::create_dir(&blocked)?;
    fs::write(blocked.join("keep.txt"), b"x")?;

    let result = FileManager::write_atomic(&blocked, b"never lands");

    assert!(result.is_err());
    assert_eq!(common::file_names(dir.path()), vec!["out.srt"]);
    Ok(())
}

#[test]
fn test_writeAtomic_withMissingParent_shouldCreateIt() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("nested").join("deeper").join("report.json");
    FileManager::write_atomic(&path, "{}")?;
    assert!(FileManager::file_exists(&path));
    Ok(())
}

#[test]
fn test_detectFileType_shouldUseExtensionThenContent() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let srt = common::create_source_subtitle(dir.path(), "movie.en.srt")?;
    let video = common::create_test_file(dir.path(), "movie.mkv", b"\x1a\x45\xdf\xa3")?;
    let sniffed = common::create_test_file(dir.path(), "subs.txt", common::SOURCE_SRT.as_bytes())?;
    let unknown = common::create_test_file(dir.path(), "notes.txt", b"nothing here")?;

    assert_eq!(FileManager::detect_file_type(&srt)?, FileType::Subtitle);
    assert_eq!(FileManager::detect_file_type(&video)?, FileType::Video);
    assert_eq!(FileManager::detect_file_type(&sniffed)?, FileType::Subtitle);
    assert_eq!(FileManager::detect_file_type(&unknown)?, FileType::Unknown);
    Ok(())
}

#[test]
fn test_findFiles_shouldRecurseAndSort() -> Result<()> {
    let dir = common::create_temp_dir()?;
    fs::create_dir(dir.path().join("season1"))?;
    common::create_test_file(&dir.path().join("season1"), "b.srt", b"")?;
    common::create_test_file(dir.path(), "a.SRT", b"")?;
    common::create_test_file(dir.path(), "c.txt", b"")?;

    let found = FileManager::find_files(dir.path(), &["srt"])?;
    let names: Vec<String> = found
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["a.SRT", "b.srt"]);
    Ok(())
}

#[test]
fn test_generateOutputPath_shouldAppendLanguageAndSuffix() {
    let path = FileManager::generate_output_path("/movies/film.mkv", "/out", "nl", "merges.json");
    assert_eq!(path, std::path::PathBuf::from("/out/film.nl.merges.json"));
}
