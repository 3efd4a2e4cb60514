//! Mail index over a single mbox file.
//!
//! Opening an `MboxIndex` loads (or builds) the persisted header index,
//! threads the messages and sorts them oldest to newest. Message bodies are
//! only read when a handle's parts are requested. Tags are kept in a JSON
//! sidecar file; write sessions stage changes in memory and rewrite the file
//! atomically on commit.

pub mod builder;
pub mod format;
pub mod header;
pub mod mime;
pub mod scanner;
pub mod tagstore;
pub mod threading;

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use self::header::IndexEntry;
use self::tagstore::{TagMap, TagStore, WriterLock};
use crate::error::{Result, TagviewError};
use crate::index::query::{parse_query, strip_angle_brackets};
use crate::index::{MailIndex, MessageHandle, ReadSession, WriteSession};
use crate::model::part::MimePart;

/// Options for [`MboxIndex::open_with`].
#[derive(Debug, Clone)]
pub struct MboxOptions {
    /// Tags given to messages that have never been tagged.
    pub new_tags: Vec<String>,
    /// Ignore any persisted header index.
    pub rebuild: bool,
    /// Fallback directory for the header index.
    pub cache_dir: Option<PathBuf>,
}

impl Default for MboxOptions {
    fn default() -> Self {
        Self {
            new_tags: vec!["inbox".to_string(), "unread".to_string()],
            rebuild: false,
            cache_dir: None,
        }
    }
}

/// Immutable message catalog shared by every session and handle.
#[derive(Debug)]
struct Catalog {
    path: PathBuf,
    /// Entries in query order: oldest first, file order on ties.
    entries: Vec<IndexEntry>,
    by_id: HashMap<String, usize>,
    new_tags: Vec<String>,
}

impl Catalog {
    fn new(path: PathBuf, mut entries: Vec<IndexEntry>, new_tags: Vec<String>) -> Self {
        entries.sort_by(|a, b| a.date.cmp(&b.date).then(a.sequence.cmp(&b.sequence)));
        let mut by_id = HashMap::with_capacity(entries.len());
        for (pos, entry) in entries.iter().enumerate() {
            by_id.entry(entry.message_id.clone()).or_insert(pos);
        }
        Self {
            path,
            entries,
            by_id,
            new_tags,
        }
    }

    /// Tags of a message that is absent from the tag store.
    fn initial_tags(&self, entry: &IndexEntry) -> BTreeSet<String> {
        entry
            .labels
            .iter()
            .map(|label| label.to_lowercase())
            .chain(self.new_tags.iter().cloned())
            .collect()
    }

    fn tags(&self, stored: &TagMap, entry: &IndexEntry) -> BTreeSet<String> {
        stored
            .get(&entry.message_id)
            .cloned()
            .unwrap_or_else(|| self.initial_tags(entry))
    }
}

/// Mail index backed by one mbox file.
#[derive(Debug)]
pub struct MboxIndex {
    catalog: Arc<Catalog>,
    store: TagStore,
    writer: Mutex<()>,
}

impl MboxIndex {
    /// Open with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &MboxOptions::default(), None)
    }

    /// Open, building the header index if needed. `progress` receives
    /// `(bytes_scanned, total_bytes)` while the file is scanned.
    pub fn open_with(
        path: impl AsRef<Path>,
        options: &MboxOptions,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let entries = builder::build_index(
            path,
            options.rebuild,
            options.cache_dir.as_deref(),
            progress,
        )?;
        info!(path = %path.display(), messages = entries.len(), "Opened mbox index");
        Ok(Self {
            catalog: Arc::new(Catalog::new(
                path.to_path_buf(),
                entries,
                options.new_tags.clone(),
            )),
            store: TagStore::for_mbox(path),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.catalog.path
    }

    /// Number of messages in the mbox.
    pub fn len(&self) -> usize {
        self.catalog.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.entries.is_empty()
    }
}

impl MailIndex for MboxIndex {
    type Read<'a>
        = MboxReadSession
    where
        Self: 'a;
    type Write<'a>
        = MboxWriteSession<'a>
    where
        Self: 'a;

    fn open_read(&self) -> Result<MboxReadSession> {
        Ok(MboxReadSession {
            catalog: Arc::clone(&self.catalog),
            stored: self.store.load()?,
        })
    }

    fn open_write(&self) -> Result<MboxWriteSession<'_>> {
        let guard = self
            .writer
            .lock()
            .map_err(|_| TagviewError::IndexUnavailable("index lock poisoned".into()))?;
        let lock = WriterLock::acquire(&self.catalog.path)?;
        let stored = self.store.load()?;
        debug!(path = %self.catalog.path.display(), "Opened mbox write session");
        Ok(MboxWriteSession {
            catalog: Arc::clone(&self.catalog),
            store: &self.store,
            stored,
            staged: HashMap::new(),
            _lock: lock,
            _writer: guard,
        })
    }
}

/// Handle to one message of the catalog.
#[derive(Debug, Clone)]
pub struct MboxHandle {
    catalog: Arc<Catalog>,
    pos: usize,
    tags: BTreeSet<String>,
}

impl MboxHandle {
    fn entry(&self) -> &IndexEntry {
        &self.catalog.entries[self.pos]
    }
}

impl MessageHandle for MboxHandle {
    fn id(&self) -> &str {
        &self.entry().message_id
    }

    fn thread_id(&self) -> &str {
        &self.entry().thread_id
    }

    fn header(&self, name: &str) -> Option<String> {
        self.entry().header(name)
    }

    fn tags(&self) -> BTreeSet<String> {
        self.tags.clone()
    }

    fn parts(&self) -> Result<Vec<MimePart>> {
        let entry = self.entry();
        let raw = scanner::read_message_at(&self.catalog.path, entry.offset, entry.length)?;
        Ok(mime::extract_parts(&raw))
    }
}

fn run_query(
    catalog: &Arc<Catalog>,
    query: &str,
    tags_of: impl Fn(&IndexEntry) -> BTreeSet<String>,
) -> Result<Vec<MboxHandle>> {
    let parsed = parse_query(query)?;
    Ok(catalog
        .entries
        .iter()
        .enumerate()
        .map(|(pos, entry)| MboxHandle {
            catalog: Arc::clone(catalog),
            pos,
            tags: tags_of(entry),
        })
        .filter(|handle| parsed.matches(handle))
        .collect())
}

fn find_in(
    catalog: &Arc<Catalog>,
    id: &str,
    tags_of: impl Fn(&IndexEntry) -> BTreeSet<String>,
) -> Option<MboxHandle> {
    let pos = *catalog.by_id.get(strip_angle_brackets(id))?;
    Some(MboxHandle {
        catalog: Arc::clone(catalog),
        pos,
        tags: tags_of(&catalog.entries[pos]),
    })
}

/// Read session: the catalog plus the tag store as it was when opened.
#[derive(Debug)]
pub struct MboxReadSession {
    catalog: Arc<Catalog>,
    stored: TagMap,
}

impl ReadSession for MboxReadSession {
    type Handle = MboxHandle;

    fn query(&self, query: &str) -> Result<Vec<MboxHandle>> {
        run_query(&self.catalog, query, |entry| self.catalog.tags(&self.stored, entry))
    }

    fn find_message(&self, id: &str) -> Result<Option<MboxHandle>> {
        Ok(find_in(&self.catalog, id, |entry| {
            self.catalog.tags(&self.stored, entry)
        }))
    }

    fn all_tags(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .catalog
            .entries
            .iter()
            .flat_map(|entry| self.catalog.tags(&self.stored, entry))
            .collect())
    }
}

/// Exclusive write session. Holds the in-process writer slot and the lock
/// file until dropped.
#[derive(Debug)]
pub struct MboxWriteSession<'a> {
    catalog: Arc<Catalog>,
    store: &'a TagStore,
    stored: TagMap,
    staged: HashMap<String, BTreeSet<String>>,
    _lock: WriterLock,
    _writer: MutexGuard<'a, ()>,
}

impl MboxWriteSession<'_> {
    fn current_tags(&self, entry: &IndexEntry) -> BTreeSet<String> {
        self.staged
            .get(&entry.message_id)
            .cloned()
            .unwrap_or_else(|| self.catalog.tags(&self.stored, entry))
    }

    fn staged_tags(&mut self, id: &str) -> Result<&mut BTreeSet<String>> {
        let id = strip_angle_brackets(id);
        if !self.staged.contains_key(id) {
            let pos = *self
                .catalog
                .by_id
                .get(id)
                .ok_or_else(|| TagviewError::MessageNotFound(id.to_string()))?;
            let tags = self.catalog.tags(&self.stored, &self.catalog.entries[pos]);
            self.staged.insert(id.to_string(), tags);
        }
        self.staged
            .get_mut(id)
            .ok_or_else(|| TagviewError::MessageNotFound(id.to_string()))
    }
}

impl ReadSession for MboxWriteSession<'_> {
    type Handle = MboxHandle;

    fn query(&self, query: &str) -> Result<Vec<MboxHandle>> {
        run_query(&self.catalog, query, |entry| self.current_tags(entry))
    }

    fn find_message(&self, id: &str) -> Result<Option<MboxHandle>> {
        Ok(find_in(&self.catalog, id, |entry| self.current_tags(entry)))
    }

    fn all_tags(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .catalog
            .entries
            .iter()
            .flat_map(|entry| self.current_tags(entry))
            .collect())
    }
}

impl WriteSession for MboxWriteSession<'_> {
    fn add_tag(&mut self, id: &str, tag: &str) -> Result<()> {
        self.staged_tags(id)?.insert(tag.to_string());
        Ok(())
    }

    fn remove_tag(&mut self, id: &str, tag: &str) -> Result<()> {
        self.staged_tags(id)?.remove(tag);
        Ok(())
    }

    fn commit(mut self) -> Result<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let changed = self.staged.len();
        self.stored.extend(self.staged.drain());
        self.store.save(&self.stored)?;
        debug!(messages = changed, "Committed mbox write session");
        Ok(())
    }
}
