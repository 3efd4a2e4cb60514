//! Header index construction, validation and persistence.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::format::{IndexHeader, HASH_PREFIX_LEN, HEADER_SIZE, MAGIC, VERSION};
use super::header::{self, IndexEntry};
use super::scanner::MboxScanner;
use super::threading;
use crate::error::{Result, TagviewError};

/// Load the header index for an mbox, rebuilding it when it is missing,
/// stale or `force_rebuild` is set.
///
/// Entries come back in file order with thread ids assigned.
pub fn build_index(
    mbox_path: &Path,
    force_rebuild: bool,
    cache_dir: Option<&Path>,
    progress: Option<&dyn Fn(u64, u64)>,
) -> Result<Vec<IndexEntry>> {
    if !force_rebuild {
        if let Some(entries) = load_index(mbox_path, cache_dir) {
            debug!(
                path = %mbox_path.display(),
                count = entries.len(),
                "Loaded existing index"
            );
            return Ok(entries);
        }
    }

    info!(path = %mbox_path.display(), "Building index");

    let scanner = MboxScanner::new(mbox_path)?;
    let mut entries: Vec<IndexEntry> = Vec::new();
    scanner.scan_headers(
        &mut |offset, length, header_bytes| {
            let sequence = entries.len() as u64;
            entries.push(header::parse_entry(header_bytes, offset, length, sequence));
            true
        },
        progress,
    )?;
    threading::assign_threads(&mut entries);

    if let Err(e) = write_index(mbox_path, cache_dir, &entries) {
        warn!(
            error = %format!("{e:#}"),
            "Could not write index file; continuing without persistence"
        );
    }

    Ok(entries)
}

/// Load a valid index from next to the mbox or from the cache directory.
pub fn load_index(mbox_path: &Path, cache_dir: Option<&Path>) -> Option<Vec<IndexEntry>> {
    let candidates = [
        index_path_for(mbox_path),
        cache_index_path_for(mbox_path, cache_dir),
    ];
    candidates
        .iter()
        .filter(|path| path.exists())
        .find_map(|path| match load_index_from_file(path, mbox_path) {
            Ok(Some(entries)) => Some(entries),
            Ok(None) => None,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Ignoring unreadable index");
                None
            }
        })
}

/// `Ok(None)` when the file is a valid index for a different mbox state.
fn load_index_from_file(idx_path: &Path, mbox_path: &Path) -> Result<Option<Vec<IndexEntry>>> {
    let data = std::fs::read(idx_path).map_err(|e| TagviewError::io(idx_path, e))?;
    let invalid = |reason: String| TagviewError::InvalidIndex {
        path: idx_path.to_path_buf(),
        reason,
    };

    if data.len() < HEADER_SIZE {
        return Err(invalid("file shorter than header".into()));
    }

    let header: IndexHeader = bincode::deserialize(&data[..HEADER_SIZE])
        .map_err(|e| invalid(format!("header deserialization failed: {e}")))?;
    header.validate().map_err(invalid)?;

    let (size, mtime) = mbox_stamp(mbox_path)?;
    if header.mbox_file_size != size {
        debug!("Mbox size changed");
        return Ok(None);
    }
    if header.mbox_modified_time != mtime {
        debug!("Mbox modification time changed");
        return Ok(None);
    }
    if header.sha256_first_4kb != sha256_first_n(mbox_path, HASH_PREFIX_LEN)? {
        debug!("Mbox content hash changed");
        return Ok(None);
    }

    let entries: Vec<IndexEntry> = bincode::deserialize(&data[HEADER_SIZE..])
        .map_err(|e| invalid(format!("entry deserialization failed: {e}")))?;
    if entries.len() as u64 != header.message_count {
        return Err(invalid("message count mismatch".into()));
    }

    Ok(Some(entries))
}

fn write_index(
    mbox_path: &Path,
    cache_dir: Option<&Path>,
    entries: &[IndexEntry],
) -> anyhow::Result<()> {
    let (size, mtime) = mbox_stamp(mbox_path)?;
    let header = IndexHeader {
        magic: *MAGIC,
        version: VERSION,
        message_count: entries.len() as u64,
        mbox_file_size: size,
        mbox_modified_time: mtime,
        sha256_first_4kb: sha256_first_n(mbox_path, HASH_PREFIX_LEN)?,
    };
    let header_bytes = header.to_padded_bytes()?;
    let entries_bytes = bincode::serialize(entries)?;

    let idx_path = index_path_for(mbox_path);
    match write_index_to_file(&idx_path, &header_bytes, &entries_bytes) {
        Ok(()) => {
            info!(path = %idx_path.display(), "Index written");
            return Ok(());
        }
        Err(e) => debug!(error = %e, "Cannot write index next to mbox, trying cache dir"),
    }

    let cache_path = cache_index_path_for(mbox_path, cache_dir);
    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    write_index_to_file(&cache_path, &header_bytes, &entries_bytes)?;
    info!(path = %cache_path.display(), "Index written to cache");
    Ok(())
}

fn write_index_to_file(path: &Path, header: &[u8], entries: &[u8]) -> anyhow::Result<()> {
    let mut file = File::create(path).map_err(|e| TagviewError::io(path, e))?;
    file.write_all(header)
        .and_then(|()| file.write_all(entries))
        .and_then(|()| file.flush())
        .map_err(|e| TagviewError::io(path, e))?;
    Ok(())
}

/// Size and modification time (Unix seconds) of the mbox.
fn mbox_stamp(mbox_path: &Path) -> Result<(u64, i64)> {
    let meta = std::fs::metadata(mbox_path).map_err(|e| TagviewError::io(mbox_path, e))?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok((meta.len(), mtime))
}

fn sha256_first_n(path: &Path, n: usize) -> Result<[u8; 32]> {
    let file = File::open(path).map_err(|e| TagviewError::io(path, e))?;
    let mut buf = Vec::with_capacity(n);
    file.take(n as u64)
        .read_to_end(&mut buf)
        .map_err(|e| TagviewError::io(path, e))?;
    Ok(Sha256::digest(&buf).into())
}

/// Hidden file next to the mbox: `/data/mail.mbox` → `/data/.mail.mbox.tagview.idx`.
pub fn index_path_for(mbox_path: &Path) -> PathBuf {
    let filename = mbox_path.file_name().unwrap_or_default().to_string_lossy();
    mbox_path.with_file_name(format!(".{filename}.tagview.idx"))
}

/// Fallback location: `<cache_dir>/<sha256 of the mbox path>.idx`.
pub fn cache_index_path_for(mbox_path: &Path, cache_dir: Option<&Path>) -> PathBuf {
    let dir = cache_dir.map(Path::to_path_buf).unwrap_or_else(|| {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("tagview")
    });
    let hash = format!("{:x}", Sha256::digest(mbox_path.to_string_lossy().as_bytes()));
    dir.join(format!("{hash}.idx"))
}
