//! Presentation-ready views of messages and threads.
//!
//! These are derived per request by the assembler and never persisted.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use super::part::MimePart;

/// Markup that may be rendered without escaping.
///
/// Only the HTML body extraction and the quote renderer construct this;
/// everything else reaching the presentation layer is plain text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SafeHtml(String);

impl SafeHtml {
    pub(crate) fn new(markup: String) -> Self {
        Self(markup)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SafeHtml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The headers shown for every message. Values are taken verbatim from the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Headers {
    pub subject: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub cc: Option<String>,
    pub date: Option<String>,
}

/// Body chosen for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedBody {
    /// Extracted HTML body fragment.
    Html(SafeHtml),
    /// Decoded plain text, still unescaped.
    Plain(String),
}

/// A fully decoded message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: String,
    pub thread_id: String,
    pub headers: Headers,
    pub tags: BTreeSet<String>,
    /// Body fragment of the first `text/html` part.
    pub html: Option<SafeHtml>,
    /// Decoded first `text/plain` part.
    pub text: Option<String>,
    /// Every leaf part, indexed by ordinal.
    pub parts: Vec<MimePart>,
}

impl MessageView {
    /// Preferred body: HTML when present, otherwise plain text.
    pub fn body(&self) -> Option<RenderedBody> {
        match (&self.html, &self.text) {
            (Some(html), _) => Some(RenderedBody::Html(html.clone())),
            (None, Some(text)) => Some(RenderedBody::Plain(text.clone())),
            (None, None) => None,
        }
    }

    /// Look up a part by its ordinal.
    pub fn part(&self, ordinal: usize) -> Option<&MimePart> {
        self.parts.get(ordinal)
    }
}

/// A thread in presentation order (newest first).
#[derive(Debug, Clone, Serialize)]
pub struct ThreadView {
    pub thread_id: String,
    /// Subject of the most recent message.
    pub subject: Option<String>,
    pub messages: Vec<MessageView>,
}

/// One row of a message list: headers and tags, no bodies.
#[derive(Debug, Clone, Serialize)]
pub struct MessageSummary {
    pub id: String,
    pub thread_id: String,
    pub headers: Headers,
    pub tags: BTreeSet<String>,
}
