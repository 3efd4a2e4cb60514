//! Boundary to the mail index.
//!
//! The index owns search, threading and tag persistence. The rest of the
//! crate only sees the traits below: an index hands out scoped read and
//! write sessions, and sessions hand out message handles. Sessions release
//! their resources when dropped, on every exit path.
//!
//! Two implementations ship with the crate: [`memory::MemoryIndex`] and
//! [`mbox::MboxIndex`].

pub mod mbox;
pub mod memory;
pub mod query;

use std::collections::BTreeSet;

use crate::error::Result;
use crate::model::part::MimePart;

/// A message as seen through an index session.
pub trait MessageHandle {
    /// Globally unique message id.
    fn id(&self) -> &str;

    /// Id of the thread this message belongs to.
    fn thread_id(&self) -> &str;

    /// Decoded value of a header (case-insensitive name), if present.
    fn header(&self, name: &str) -> Option<String>;

    /// Tags as of the session the handle came from.
    fn tags(&self) -> BTreeSet<String>;

    /// Leaf MIME parts in the index's native order; ordinals are 0-based
    /// and contiguous.
    fn parts(&self) -> Result<Vec<MimePart>>;
}

/// A read-only view of the index.
pub trait ReadSession {
    type Handle: MessageHandle;

    /// Run a query; the query string is passed to the index verbatim.
    fn query(&self, query: &str) -> Result<Vec<Self::Handle>>;

    /// Look up a message by id.
    fn find_message(&self, id: &str) -> Result<Option<Self::Handle>>;

    /// Every tag used by at least one message.
    fn all_tags(&self) -> Result<BTreeSet<String>>;

    /// Number of messages matching a query.
    fn count(&self, query: &str) -> Result<usize> {
        Ok(self.query(query)?.len())
    }
}

/// An exclusive, writable session. Changes become visible on [`commit`];
/// dropping the session without committing discards them.
///
/// [`commit`]: WriteSession::commit
pub trait WriteSession: ReadSession {
    fn add_tag(&mut self, id: &str, tag: &str) -> Result<()>;

    fn remove_tag(&mut self, id: &str, tag: &str) -> Result<()>;

    /// Apply every staged change atomically and release the writer slot.
    fn commit(self) -> Result<()>
    where
        Self: Sized;
}

/// A mail index: a factory for scoped sessions.
///
/// Only one write session may exist at a time; `open_write` blocks until
/// the writer slot is free. Read sessions never wait for writers.
pub trait MailIndex {
    type Read<'a>: ReadSession
    where
        Self: 'a;
    type Write<'a>: WriteSession
    where
        Self: 'a;

    fn open_read(&self) -> Result<Self::Read<'_>>;

    fn open_write(&self) -> Result<Self::Write<'_>>;
}

/// Query matching every message carrying `tag`.
pub fn tag_query(tag: &str) -> String {
    format!("tag:{}", query::quote_value(tag))
}

/// Query matching every message of a thread. Thread ids are opaque, so any
/// quote or backslash is escaped.
pub fn thread_query(thread_id: &str) -> String {
    format!("thread:{}", query::quote_value(thread_id))
}
