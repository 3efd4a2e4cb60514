//! Sidecar tag storage for an mbox.
//!
//! Tags live in `.<file>.tagview-tags.json` next to the mbox, as a JSON
//! object mapping message ids to tag lists. Only messages whose tags were
//! changed at least once appear in the file. Saves go through a temporary
//! file in the same directory and are renamed into place.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, TagviewError};

pub type TagMap = BTreeMap<String, BTreeSet<String>>;

/// Path of the tag store for an mbox.
pub fn tag_store_path_for(mbox_path: &Path) -> PathBuf {
    sidecar_path(mbox_path, "tagview-tags.json")
}

/// Path of the writer lock file for an mbox.
pub fn lock_path_for(mbox_path: &Path) -> PathBuf {
    sidecar_path(mbox_path, "tagview.lock")
}

fn sidecar_path(mbox_path: &Path, suffix: &str) -> PathBuf {
    let filename = mbox_path.file_name().unwrap_or_default().to_string_lossy();
    mbox_path.with_file_name(format!(".{filename}.{suffix}"))
}

#[derive(Debug, Clone)]
pub struct TagStore {
    path: PathBuf,
}

impl TagStore {
    pub fn for_mbox(mbox_path: &Path) -> Self {
        Self {
            path: tag_store_path_for(mbox_path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored tags. A missing file is an empty store.
    pub fn load(&self) -> Result<TagMap> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(TagMap::new()),
            Err(e) => return Err(TagviewError::io(&self.path, e)),
        };
        serde_json::from_slice(&data).map_err(|e| {
            TagviewError::TagStore(format!("{}: {e}", self.path.display()))
        })
    }

    /// Replace the stored tags atomically.
    pub fn save(&self, tags: &TagMap) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| TagviewError::io(dir, e))?;
        serde_json::to_writer_pretty(&mut tmp, tags)
            .map_err(|e| TagviewError::TagStore(e.to_string()))?;
        tmp.write_all(b"\n")
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| TagviewError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| TagviewError::io(&self.path, e.error))?;
        debug!(path = %self.path.display(), messages = tags.len(), "Tag store saved");
        Ok(())
    }
}

/// Cross-process writer lock: a file created exclusively, removed on drop.
#[derive(Debug)]
pub struct WriterLock {
    path: PathBuf,
}

impl WriterLock {
    /// Take the lock, or fail with [`TagviewError::IndexUnavailable`] if
    /// another writer holds it.
    ///
    /// The lock file holds the writer's pid. A lock left behind by a crashed
    /// process is never taken over; the error names the pid and the file so
    /// it can be removed by hand.
    pub fn acquire(mbox_path: &Path) -> Result<Self> {
        let path = lock_path_for(mbox_path);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", std::process::id()) {
                    warn!(path = %path.display(), error = %e, "Could not record pid in lock file");
                }
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = lock_holder(&path)
                    .map_or_else(|| "an unknown process".to_string(), |pid| format!("pid {pid}"));
                Err(TagviewError::IndexUnavailable(format!(
                    "tags are locked by {holder}; if it is no longer running, delete {}",
                    path.display()
                )))
            }
            Err(e) => Err(TagviewError::io(&path, e)),
        }
    }
}

/// Pid recorded in an existing lock file.
fn lock_holder(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Could not remove lock file");
        }
    }
}
