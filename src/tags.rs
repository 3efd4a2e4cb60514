//! Tag mutation against an exclusive write session.

use tracing::{debug, info};

use crate::error::{Result, TagviewError};
use crate::index::{thread_query, MailIndex, MessageHandle, ReadSession, WriteSession};
use crate::model::{TagDelta, TagTarget};

/// Applies [`TagDelta`]s through the index's single writer.
pub struct TagMutator<'i, I: MailIndex> {
    index: &'i I,
}

impl<'i, I: MailIndex> TagMutator<'i, I> {
    pub fn new(index: &'i I) -> Self {
        Self { index }
    }

    /// Apply `delta` to the target and commit. Returns the number of
    /// messages touched.
    ///
    /// Blocks until the writer slot is free. Every removal is applied before
    /// any addition, so a tag named in both sets ends up present. If any
    /// step fails the session is dropped uncommitted and nothing changes.
    /// Blank tag names are rejected before the session is opened.
    pub fn apply(&self, target: &TagTarget, delta: &TagDelta) -> Result<usize> {
        if let Some(tag) = delta.add.iter().chain(&delta.remove).find(|t| t.trim().is_empty()) {
            return Err(TagviewError::InvalidTag(tag.clone()));
        }

        let mut session = self.index.open_write()?;

        let ids: Vec<String> = match target {
            TagTarget::Message(id) => {
                let handle = session
                    .find_message(id)?
                    .ok_or_else(|| TagviewError::MessageNotFound(id.clone()))?;
                vec![handle.id().to_string()]
            }
            TagTarget::Thread(thread_id) => {
                let handles = session.query(&thread_query(thread_id))?;
                if handles.is_empty() {
                    return Err(TagviewError::ThreadNotFound(thread_id.clone()));
                }
                handles.iter().map(|h| h.id().to_string()).collect()
            }
        };

        for tag in &delta.remove {
            for id in &ids {
                session.remove_tag(id, tag)?;
            }
        }
        for tag in &delta.add {
            for id in &ids {
                session.add_tag(id, tag)?;
            }
        }
        debug!(
            messages = ids.len(),
            add = ?delta.add,
            remove = ?delta.remove,
            "Staged tag delta"
        );

        session.commit()?;
        info!(messages = ids.len(), "Tags updated on {target:?}");
        Ok(ids.len())
    }
}
