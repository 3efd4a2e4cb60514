//! Message assembly: turns index handles into presentation-ready views.
//!
//! The free functions work on an open read session so several lookups can
//! share one session (part ordinals are only guaranteed stable within a
//! session). [`MessageAssembler`] wraps an index and opens a fresh session
//! per call, which is what a request handler wants.

use tracing::debug;

use crate::error::{Result, TagviewError};
use crate::index::{tag_query, thread_query, MailIndex, MessageHandle, ReadSession};
use crate::model::{Headers, MessageSummary, MessageView, MimePart, SafeHtml, ThreadView};
use crate::render::html::extract_body;
use crate::render::select;

fn read_headers<H: MessageHandle>(handle: &H) -> Headers {
    Headers {
        subject: handle.header("subject"),
        from: handle.header("from"),
        to: handle.header("to"),
        cc: handle.header("cc"),
        date: handle.header("date"),
    }
}

/// Build the full view of one message.
///
/// Parts are fetched once. The HTML body, if any, is reduced to the content
/// of its `<body>` and marked safe; the plain body stays plain text.
pub fn assemble<H: MessageHandle>(handle: &H) -> Result<MessageView> {
    let parts = handle.parts()?;
    let html = select(&parts, "text/html").map(|html| SafeHtml::new(extract_body(&html)));
    let text = select(&parts, "text/plain");

    Ok(MessageView {
        id: handle.id().to_string(),
        thread_id: handle.thread_id().to_string(),
        headers: read_headers(handle),
        tags: handle.tags(),
        html,
        text,
        parts,
    })
}

/// Header-only view for listings; does not touch message bodies.
pub fn summarize<H: MessageHandle>(handle: &H) -> MessageSummary {
    MessageSummary {
        id: handle.id().to_string(),
        thread_id: handle.thread_id().to_string(),
        headers: read_headers(handle),
        tags: handle.tags(),
    }
}

/// Assemble a thread, newest message first.
///
/// The index returns thread members oldest to newest; the subject is taken
/// from the newest one, which becomes the first after reversal.
pub fn assemble_thread<S: ReadSession>(session: &S, thread_id: &str) -> Result<ThreadView> {
    let handles = session.query(&thread_query(thread_id))?;
    let Some(newest) = handles.last() else {
        return Err(TagviewError::ThreadNotFound(thread_id.to_string()));
    };
    let subject = newest.header("subject");

    let mut messages = handles.iter().map(assemble).collect::<Result<Vec<_>>>()?;
    messages.reverse();

    debug!(thread_id, messages = messages.len(), "Assembled thread");
    Ok(ThreadView {
        thread_id: thread_id.to_string(),
        subject,
        messages,
    })
}

/// Assemble one message by id.
pub fn find_message<S: ReadSession>(session: &S, id: &str) -> Result<MessageView> {
    let handle = session
        .find_message(id)?
        .ok_or_else(|| TagviewError::MessageNotFound(id.to_string()))?;
    assemble(&handle)
}

/// Fetch a single part by ordinal.
pub fn part_by_ordinal<S: ReadSession>(session: &S, id: &str, ordinal: usize) -> Result<MimePart> {
    let handle = session
        .find_message(id)?
        .ok_or_else(|| TagviewError::MessageNotFound(id.to_string()))?;
    handle
        .parts()?
        .into_iter()
        .nth(ordinal)
        .ok_or_else(|| TagviewError::PartNotFound {
            id: id.to_string(),
            ordinal,
        })
}

/// Summaries of every message matching `query`, in index order.
pub fn list_messages<S: ReadSession>(session: &S, query: &str) -> Result<Vec<MessageSummary>> {
    Ok(session.query(query)?.iter().map(summarize).collect())
}

/// Read-side entry point: one read session per call.
pub struct MessageAssembler<'i, I: MailIndex> {
    index: &'i I,
}

impl<'i, I: MailIndex> MessageAssembler<'i, I> {
    pub fn new(index: &'i I) -> Self {
        Self { index }
    }

    pub fn message(&self, id: &str) -> Result<MessageView> {
        find_message(&self.index.open_read()?, id)
    }

    pub fn thread(&self, thread_id: &str) -> Result<ThreadView> {
        assemble_thread(&self.index.open_read()?, thread_id)
    }

    pub fn part(&self, id: &str, ordinal: usize) -> Result<MimePart> {
        part_by_ordinal(&self.index.open_read()?, id, ordinal)
    }

    /// Summaries for an index query, passed through verbatim.
    pub fn search(&self, query: &str) -> Result<Vec<MessageSummary>> {
        list_messages(&self.index.open_read()?, query)
    }

    /// Summaries of every message carrying `tag`.
    pub fn list_tag(&self, tag: &str) -> Result<Vec<MessageSummary>> {
        self.search(&tag_query(tag))
    }

    pub fn count(&self, query: &str) -> Result<usize> {
        self.index.open_read()?.count(query)
    }

    pub fn all_tags(&self) -> Result<std::collections::BTreeSet<String>> {
        self.index.open_read()?.all_tags()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::{MemoryIndex, StoredMessage};

    fn index() -> MemoryIndex {
        MemoryIndex::from_messages([
            StoredMessage::new("m1@x", "t1")
                .with_header("subject", "Plans")
                .with_header("from", "alice@x")
                .with_tag("inbox")
                .with_part(MimePart::new(0, "text/plain", "Let's meet").with_charset("utf-8"))
                .with_part(MimePart::new(
                    0,
                    "text/html",
                    "<html><body><p>Let's meet</p></body></html>",
                )),
            StoredMessage::new("m2@x", "t1")
                .with_header("subject", "Re: Plans")
                .with_part(MimePart::new(0, "text/plain", "> Let's meet\nSure")),
            StoredMessage::new("m3@x", "t2").with_header("subject", "Other"),
        ])
    }

    #[test]
    fn test_assemble_selects_bodies() {
        let idx = index();
        let view = MessageAssembler::new(&idx).message("m1@x").unwrap();
        assert_eq!(view.headers.subject.as_deref(), Some("Plans"));
        assert_eq!(view.headers.from.as_deref(), Some("alice@x"));
        assert_eq!(view.headers.cc, None);
        assert_eq!(view.html.as_ref().map(SafeHtml::as_str), Some("<p>Let's meet</p>"));
        assert_eq!(view.text.as_deref(), Some("Let's meet"));
        assert_eq!(view.parts.len(), 2);
    }

    #[test]
    fn test_message_without_parts() {
        let idx = index();
        let view = MessageAssembler::new(&idx).message("m3@x").unwrap();
        assert!(view.html.is_none());
        assert!(view.text.is_none());
        assert!(view.body().is_none());
    }

    #[test]
    fn test_thread_is_newest_first() {
        let idx = index();
        let thread = MessageAssembler::new(&idx).thread("t1").unwrap();
        let ids: Vec<_> = thread.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m2@x", "m1@x"]);
        assert_eq!(thread.subject.as_deref(), Some("Re: Plans"));
    }

    #[test]
    fn test_not_found_errors() {
        let idx = index();
        let assembler = MessageAssembler::new(&idx);
        assert!(matches!(
            assembler.message("nope"),
            Err(TagviewError::MessageNotFound(_))
        ));
        assert!(matches!(
            assembler.thread("t9"),
            Err(TagviewError::ThreadNotFound(_))
        ));
        assert!(matches!(
            assembler.part("m1@x", 2),
            Err(TagviewError::PartNotFound { ordinal: 2, .. })
        ));
    }

    #[test]
    fn test_listing_and_counting() {
        let idx = index();
        let assembler = MessageAssembler::new(&idx);
        let inbox = assembler.list_tag("inbox").unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, "m1@x");
        assert_eq!(assembler.count("thread:t1").unwrap(), 2);
        assert_eq!(assembler.search("subject:plans").unwrap().len(), 2);
        assert!(assembler.search("tag:").is_err());
    }
}
