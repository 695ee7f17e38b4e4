/*!
 * Bounded on-disk cache for expensive media artifacts.
 *
 * Entries are keyed by a SHA-256 of the source path, size and modification
 * time, so an edited source naturally misses. Total size is capped; the
 * least recently used entries (oldest mtime, touched on every hit) go first.
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use log::{debug, warn};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::file_utils::FileManager;

/// 2 GiB
pub const DEFAULT_MAX_BYTES: u64 = 2 * 1024 * 1024 * 1024;

// @struct: Size-capped artifact cache rooted in one directory
#[derive(Debug)]
pub struct ArtifactCache {
    dir: PathBuf,
    max_bytes: u64,
    // @field: Serializes commits and evictions across concurrent jobs
    lock: Mutex<()>,
}

impl ArtifactCache {
    pub fn new<P: AsRef<Path>>(dir: P, max_bytes: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        FileManager::ensure_dir(&dir).with_context(|| format!("Failed to create cache directory: {:?}", dir))?;
        Ok(Self {
            dir,
            max_bytes,
            lock: Mutex::new(()),
        })
    }

    /// `<user cache dir>/cueforge`, falling back to the system temp dir
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir().unwrap_or_else(std::env::temp_dir).join("cueforge")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stable key for the current state of `source`
    pub fn key_for(source: &Path) -> Result<String> {
        let metadata = fs::metadata(source).with_context(|| format!("Cannot stat {:?}", source))?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let canonical = fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());

        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string_lossy().as_bytes());
        hasher.update(metadata.len().to_le_bytes());
        hasher.update(modified.to_le_bytes());
        Ok(hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect())
    }

    fn entry_path(&self, source: &Path, extension: &str) -> Result<PathBuf> {
        Ok(self.dir.join(format!("{}.{}", Self::key_for(source)?, extension)))
    }

    /// Cached artifact for `source`, refreshed as most recently used
    pub fn lookup(&self, source: &Path, extension: &str) -> Result<Option<PathBuf>> {
        let path = self.entry_path(source, extension)?;
        if !FileManager::file_exists(&path) {
            return Ok(None);
        }
        if let Err(e) = touch(&path) {
            warn!("Could not refresh cache entry {:?}: {}", path, e);
        }
        debug!("Cache hit: {:?}", path);
        Ok(Some(path))
    }

    /// Scratch file inside the cache directory, so `commit` is a same-filesystem rename
    pub fn scratch(&self, extension: &str) -> Result<NamedTempFile> {
        tempfile::Builder::new()
            .prefix(".partial-")
            .suffix(&format!(".{}", extension))
            .tempfile_in(&self.dir)
            .context("Failed to create cache scratch file")
    }

    /// Move a finished scratch file into place and enforce the size cap
    pub fn commit(&self, source: &Path, extension: &str, produced: NamedTempFile) -> Result<PathBuf> {
        let path = self.entry_path(source, extension)?;
        let _guard = self.lock.lock();
        produced
            .persist(&path)
            .with_context(|| format!("Failed to store cache entry {:?}", path))?;
        self.evict_locked(Some(&path))?;
        Ok(path)
    }

    /// Total bytes held by committed entries
    pub fn total_bytes(&self) -> Result<u64> {
        Ok(self.entries()?.iter().map(|(_, size, _)| size).sum())
    }

    /// Drop least recently used entries until the cache fits its cap
    pub fn evict(&self) -> Result<usize> {
        let _guard = self.lock.lock();
        self.evict_locked(None)
    }

    fn evict_locked(&self, keep: Option<&Path>) -> Result<usize> {
        let mut entries = self.entries()?;
        let mut total: u64 = entries.iter().map(|(_, size, _)| size).sum();
        entries.sort_by_key(|(_, _, modified)| *modified);

        let mut removed = 0;
        for (path, size, _) in entries {
            if total <= self.max_bytes {
                break;
            }
            if keep == Some(path.as_path()) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    total = total.saturating_sub(size);
                    removed += 1;
                    debug!("Evicted cache entry {:?} ({} bytes)", path, size);
                }
                Err(e) => warn!("Failed to evict {:?}: {}", path, e),
            }
        }
        Ok(removed)
    }

    fn entries(&self) -> Result<Vec<(PathBuf, u64, SystemTime)>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir).with_context(|| format!("Cannot list {:?}", self.dir))? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(".partial-") {
                continue;
            }
            let metadata = entry.metadata()?;
            if metadata.is_file() {
                let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
                entries.push((entry.path(), metadata.len(), modified));
            }
        }
        Ok(entries)
    }
}

fn touch(path: &Path) -> std::io::Result<()> {
    let file = fs::File::options().write(true).open(path)?;
    file.set_modified(SystemTime::now())
}
