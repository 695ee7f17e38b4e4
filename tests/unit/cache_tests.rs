/*!
 * Tests for the artifact cache
 */

use anyhow::Result;
use std::fs;
use std::io::Write;
use std::time::{Duration, SystemTime};

use cueforge::media::ArtifactCache;
use crate::common;

fn store(cache: &ArtifactCache, source: &std::path::Path, bytes: usize) -> Result<std::path::PathBuf> {
    let mut scratch = cache.scratch("wav")?;
    scratch.write_all(&vec![0u8; bytes])?;
    cache.commit(source, "wav", scratch)
}

fn set_mtime(path: &std::path::Path, secs_ago: u64) -> Result<()> {
    let file = fs::File::options().write(true).open(path)?;
    file.set_modified(SystemTime::now() - Duration::from_secs(secs_ago))?;
    Ok(())
}

#[test]
fn test_lookup_withChangedSize_shouldMiss() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let cache = ArtifactCache::new(dir.path().join("cache"), 1024 * 1024)?;
    let source = common::create_test_file(dir.path(), "movie.mkv", b"first")?;

    store(&cache, &source, 16)?;
    assert!(cache.lookup(&source, "wav")?.is_some());

    fs::write(&source, b"first plus more bytes")?;
    assert!(cache.lookup(&source, "wav")?.is_none());
    Ok(())
}

#[test]
fn test_lookup_withChangedMtime_shouldMiss() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let cache = ArtifactCache::new(dir.path().join("cache"), 1024 * 1024)?;
    let source = common::create_test_file(dir.path(), "movie.mkv", b"same")?;

    store(&cache, &source, 16)?;
    set_mtime(&source, 3_600)?;
    assert!(cache.lookup(&source, "wav")?.is_none());
    Ok(())
}

#[test]
fn test_commit_overCap_shouldEvictLeastRecentlyUsed() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let cache = ArtifactCache::new(dir.path().join("cache"), 250)?;
    let a = common::create_test_file(dir.path(), "a.mkv", b"a")?;
    let b = common::create_test_file(dir.path(), "b.mkv", b"b")?;
    let c = common::create_test_file(dir.path(), "c.mkv", b"c")?;

    let entry_a = store(&cache, &a, 100)?;
    let entry_b = store(&cache, &b, 100)?;
    set_mtime(&entry_a, 200)?;
    set_mtime(&entry_b, 100)?;

    // A hit refreshes `a`, leaving `b` as the oldest entry
    assert!(cache.lookup(&a, "wav")?.is_some());
    store(&cache, &c, 100)?;

    assert!(cache.lookup(&a, "wav")?.is_some());
    assert!(cache.lookup(&b, "wav")?.is_none());
    assert!(cache.lookup(&c, "wav")?.is_some());
    assert!(cache.total_bytes()? <= 250);
    Ok(())
}

#[test]
fn test_scratch_shouldNotCountTowardsSize() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let cache = ArtifactCache::new(dir.path().join("cache"), 1024)?;
    let mut scratch = cache.scratch("wav")?;
    scratch.write_all(&[0u8; 512])?;
    assert_eq!(cache.total_bytes()?, 0);
    Ok(())
}
