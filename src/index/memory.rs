//! In-memory mail index.
//!
//! Messages live in a copy-on-write snapshot: read sessions clone an `Arc`
//! and never wait, the single write session stages tag changes privately
//! and swaps in a new snapshot on commit. Query order is insertion order.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, TryLockError};

use tracing::debug;

use crate::error::{Result, TagviewError};
use crate::index::query::{parse_query, strip_angle_brackets};
use crate::index::{MailIndex, MessageHandle, ReadSession, WriteSession};
use crate::model::part::MimePart;

/// A message as stored by [`MemoryIndex`].
#[derive(Debug, Clone, Default)]
pub struct StoredMessage {
    pub id: String,
    pub thread_id: String,
    /// Lower-case header name → decoded value.
    pub headers: BTreeMap<String, String>,
    pub tags: BTreeSet<String>,
    pub parts: Vec<MimePart>,
}

impl StoredMessage {
    pub fn new(id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Append a part; its ordinal is set to its position.
    pub fn with_part(mut self, mut part: MimePart) -> Self {
        part.ordinal = self.parts.len();
        self.parts.push(part);
        self
    }
}

type Snapshot = Arc<Vec<StoredMessage>>;

/// Mail index held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    messages: RwLock<Snapshot>,
    writer: Mutex<()>,
}

impl MemoryIndex {
    pub fn from_messages(messages: impl IntoIterator<Item = StoredMessage>) -> Self {
        Self {
            messages: RwLock::new(Arc::new(messages.into_iter().collect())),
            writer: Mutex::new(()),
        }
    }

    /// Append a message to the end of the native order.
    pub fn insert(&self, message: StoredMessage) -> Result<()> {
        let mut current = self.messages.write().map_err(|_| poisoned())?;
        let mut next = current.as_ref().clone();
        next.push(message);
        *current = Arc::new(next);
        Ok(())
    }

    /// Like [`MailIndex::open_write`], but fails with
    /// [`TagviewError::IndexUnavailable`] instead of waiting for the writer slot.
    pub fn try_open_write(&self) -> Result<MemoryWriteSession<'_>> {
        let guard = match self.writer.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return Err(TagviewError::IndexUnavailable(
                    "another write session is open".into(),
                ))
            }
            Err(TryLockError::Poisoned(_)) => return Err(poisoned()),
        };
        self.write_session(guard)
    }

    fn snapshot(&self) -> Result<Snapshot> {
        Ok(Arc::clone(&*self.messages.read().map_err(|_| poisoned())?))
    }

    fn write_session<'a>(&'a self, guard: MutexGuard<'a, ()>) -> Result<MemoryWriteSession<'a>> {
        Ok(MemoryWriteSession {
            index: self,
            snapshot: self.snapshot()?,
            staged: HashMap::new(),
            _writer: guard,
        })
    }
}

fn poisoned() -> TagviewError {
    TagviewError::IndexUnavailable("index lock poisoned".into())
}

impl MailIndex for MemoryIndex {
    type Read<'a>
        = MemoryReadSession
    where
        Self: 'a;
    type Write<'a>
        = MemoryWriteSession<'a>
    where
        Self: 'a;

    fn open_read(&self) -> Result<MemoryReadSession> {
        Ok(MemoryReadSession {
            snapshot: self.snapshot()?,
        })
    }

    fn open_write(&self) -> Result<MemoryWriteSession<'_>> {
        let guard = self.writer.lock().map_err(|_| poisoned())?;
        debug!("Opened memory index write session");
        self.write_session(guard)
    }
}

/// Handle into a snapshot. Tags are resolved when the handle is created.
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    snapshot: Snapshot,
    pos: usize,
    tags: BTreeSet<String>,
}

impl MemoryHandle {
    fn message(&self) -> &StoredMessage {
        &self.snapshot[self.pos]
    }
}

impl MessageHandle for MemoryHandle {
    fn id(&self) -> &str {
        &self.message().id
    }

    fn thread_id(&self) -> &str {
        &self.message().thread_id
    }

    fn header(&self, name: &str) -> Option<String> {
        self.message()
            .headers
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    fn tags(&self) -> BTreeSet<String> {
        self.tags.clone()
    }

    fn parts(&self) -> Result<Vec<MimePart>> {
        Ok(self.message().parts.clone())
    }
}

/// Run a query over a snapshot, resolving tags through `tags_of`.
fn run_query(
    snapshot: &Snapshot,
    query: &str,
    tags_of: impl Fn(&StoredMessage) -> BTreeSet<String>,
) -> Result<Vec<MemoryHandle>> {
    let parsed = parse_query(query)?;
    Ok(snapshot
        .iter()
        .enumerate()
        .map(|(pos, msg)| MemoryHandle {
            snapshot: Arc::clone(snapshot),
            pos,
            tags: tags_of(msg),
        })
        .filter(|handle| parsed.matches(handle))
        .collect())
}

fn find_in(
    snapshot: &Snapshot,
    id: &str,
    tags_of: impl Fn(&StoredMessage) -> BTreeSet<String>,
) -> Option<MemoryHandle> {
    let id = strip_angle_brackets(id);
    snapshot
        .iter()
        .position(|msg| msg.id == id)
        .map(|pos| MemoryHandle {
            snapshot: Arc::clone(snapshot),
            pos,
            tags: tags_of(&snapshot[pos]),
        })
}

/// Read-only session over one snapshot.
#[derive(Debug)]
pub struct MemoryReadSession {
    snapshot: Snapshot,
}

impl ReadSession for MemoryReadSession {
    type Handle = MemoryHandle;

    fn query(&self, query: &str) -> Result<Vec<MemoryHandle>> {
        run_query(&self.snapshot, query, |msg| msg.tags.clone())
    }

    fn find_message(&self, id: &str) -> Result<Option<MemoryHandle>> {
        Ok(find_in(&self.snapshot, id, |msg| msg.tags.clone()))
    }

    fn all_tags(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .snapshot
            .iter()
            .flat_map(|msg| msg.tags.iter().cloned())
            .collect())
    }
}

/// The exclusive write session. Holds the writer slot until dropped.
#[derive(Debug)]
pub struct MemoryWriteSession<'a> {
    index: &'a MemoryIndex,
    snapshot: Snapshot,
    /// Full tag set of every message touched in this session.
    staged: HashMap<String, BTreeSet<String>>,
    _writer: MutexGuard<'a, ()>,
}

impl MemoryWriteSession<'_> {
    fn current_tags(&self, msg: &StoredMessage) -> BTreeSet<String> {
        self.staged
            .get(&msg.id)
            .cloned()
            .unwrap_or_else(|| msg.tags.clone())
    }

    fn staged_tags(&mut self, id: &str) -> Result<&mut BTreeSet<String>> {
        let id = strip_angle_brackets(id);
        if !self.staged.contains_key(id) {
            let msg = self
                .snapshot
                .iter()
                .find(|msg| msg.id == id)
                .ok_or_else(|| TagviewError::MessageNotFound(id.to_string()))?;
            self.staged.insert(id.to_string(), msg.tags.clone());
        }
        self.staged
            .get_mut(id)
            .ok_or_else(|| TagviewError::MessageNotFound(id.to_string()))
    }
}

impl ReadSession for MemoryWriteSession<'_> {
    type Handle = MemoryHandle;

    fn query(&self, query: &str) -> Result<Vec<MemoryHandle>> {
        run_query(&self.snapshot, query, |msg| self.current_tags(msg))
    }

    fn find_message(&self, id: &str) -> Result<Option<MemoryHandle>> {
        Ok(find_in(&self.snapshot, id, |msg| self.current_tags(msg)))
    }

    fn all_tags(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .snapshot
            .iter()
            .flat_map(|msg| self.current_tags(msg))
            .collect())
    }
}

impl WriteSession for MemoryWriteSession<'_> {
    fn add_tag(&mut self, id: &str, tag: &str) -> Result<()> {
        self.staged_tags(id)?.insert(tag.to_string());
        Ok(())
    }

    fn remove_tag(&mut self, id: &str, tag: &str) -> Result<()> {
        self.staged_tags(id)?.remove(tag);
        Ok(())
    }

    fn commit(self) -> Result<()> {
        let mut current = self.index.messages.write().map_err(|_| poisoned())?;
        let mut next = current.as_ref().clone();
        for msg in &mut next {
            if let Some(tags) = self.staged.get(&msg.id) {
                msg.tags = tags.clone();
            }
        }
        *current = Arc::new(next);
        debug!(messages = self.staged.len(), "Committed memory index write session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> MemoryIndex {
        MemoryIndex::from_messages([
            StoredMessage::new("a@x", "t1")
                .with_header("Subject", "First")
                .with_tag("inbox"),
            StoredMessage::new("b@x", "t1")
                .with_header("Subject", "Re: First")
                .with_tag("inbox")
                .with_tag("unread"),
            StoredMessage::new("c@x", "t2").with_header("Subject", "Other"),
        ])
    }

    #[test]
    fn test_query_preserves_insertion_order() {
        let idx = index();
        let session = idx.open_read().unwrap();
        let ids: Vec<_> = session
            .query("thread:t1")
            .unwrap()
            .iter()
            .map(|h| h.id().to_string())
            .collect();
        assert_eq!(ids, ["a@x", "b@x"]);
        assert_eq!(session.count("tag:inbox").unwrap(), 2);
        assert_eq!(session.count("*").unwrap(), 3);
    }

    #[test]
    fn test_find_message_and_headers() {
        let idx = index();
        let session = idx.open_read().unwrap();
        let handle = session.find_message("<b@x>").unwrap().unwrap();
        assert_eq!(handle.header("SUBJECT").as_deref(), Some("Re: First"));
        assert!(session.find_message("zzz").unwrap().is_none());
        assert_eq!(
            session.all_tags().unwrap(),
            BTreeSet::from(["inbox".to_string(), "unread".to_string()])
        );
    }

    #[test]
    fn test_uncommitted_changes_are_discarded() {
        let idx = index();
        {
            let mut w = idx.open_write().unwrap();
            w.add_tag("c@x", "flagged").unwrap();
            assert_eq!(w.count("tag:flagged").unwrap(), 1);
        }
        let r = idx.open_read().unwrap();
        assert_eq!(r.count("tag:flagged").unwrap(), 0);
    }

    #[test]
    fn test_commit_publishes_changes() {
        let idx = index();
        let before = idx.open_read().unwrap();

        let mut w = idx.open_write().unwrap();
        w.remove_tag("b@x", "unread").unwrap();
        w.add_tag("b@x", "replied").unwrap();
        w.commit().unwrap();

        // Sessions opened earlier keep their snapshot.
        assert_eq!(before.count("tag:unread").unwrap(), 1);
        let after = idx.open_read().unwrap();
        assert_eq!(after.count("tag:unread").unwrap(), 0);
        assert_eq!(after.count("tag:replied").unwrap(), 1);
    }

    #[test]
    fn test_single_writer() {
        let idx = index();
        let w = idx.open_write().unwrap();
        let err = idx.try_open_write().unwrap_err();
        assert!(err.is_retryable());
        drop(w);
        assert!(idx.try_open_write().is_ok());
    }

    #[test]
    fn test_tagging_unknown_message() {
        let idx = index();
        let mut w = idx.open_write().unwrap();
        let err = w.add_tag("nope@x", "x").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_with_part_assigns_ordinals() {
        let msg = StoredMessage::new("p@x", "t")
            .with_part(MimePart::new(9, "text/plain", "a"))
            .with_part(MimePart::new(9, "text/html", "b"));
        let ordinals: Vec<_> = msg.parts.iter().map(|p| p.ordinal).collect();
        assert_eq!(ordinals, [0, 1]);
    }
}
