//! Query language of the bundled index back ends.
//!
//! The rendering core never interprets queries; it hands them to the index
//! verbatim. Both [`MemoryIndex`](super::memory::MemoryIndex) and
//! [`MboxIndex`](super::mbox::MboxIndex) parse them with this module.
//!
//! # Supported syntax
//!
//! - `tag:inbox`: exact tag
//! - `thread:000000000000002a`: exact thread id
//! - `id:msg@example.com`: exact message id (angle brackets optional)
//! - `from:alice`, `to:bob`, `cc:carol`, `subject:invoice`: case-insensitive substring
//! - `word`: substring of subject, from or to
//! - `"exact phrase"` / `subject:"weekly report"`: quoted values; inside
//!   quotes `\"` is a literal quote and `\\` a literal backslash
//! - `*`: every message
//!
//! **Operators**: `a b` is AND, `a OR b` switches the whole query to OR,
//! `-term` negates. An empty query matches everything.

use std::borrow::Cow;

use crate::error::{Result, TagviewError};
use crate::index::MessageHandle;

/// Header fields that support substring search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    From,
    To,
    Cc,
    Subject,
}

impl HeaderField {
    fn name(self) -> &'static str {
        match self {
            Self::From => "from",
            Self::To => "to",
            Self::Cc => "cc",
            Self::Subject => "subject",
        }
    }
}

/// What a single term tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermKind {
    Everything,
    Tag(String),
    Thread(String),
    Id(String),
    /// Lower-cased needle searched in one header.
    Header(HeaderField, String),
    /// Lower-cased needle searched in subject, from and to.
    Text(String),
}

/// A possibly negated term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub kind: TermKind,
    pub negated: bool,
}

/// A parsed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub terms: Vec<Term>,
    /// Any term may match instead of all of them.
    pub is_or: bool,
}

/// Parse a query string.
///
/// Fails with [`TagviewError::MalformedQuery`] on an unterminated quote, a
/// field with an empty value, an unknown field name, or a dangling operator.
pub fn parse_query(input: &str) -> Result<Query> {
    let tokens = tokenize(input)?;
    let mut terms = Vec::new();
    let mut is_or = false;

    for token in &tokens {
        if token == "OR" {
            is_or = true;
            continue;
        }

        let (negated, token) = match token.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, token.as_str()),
        };
        if token.is_empty() {
            return Err(TagviewError::malformed(input, "'-' without a term"));
        }

        terms.push(Term {
            kind: parse_term(input, token)?,
            negated,
        });
    }

    if is_or && terms.is_empty() {
        return Err(TagviewError::malformed(input, "OR without operands"));
    }

    Ok(Query { terms, is_or })
}

fn parse_term(input: &str, token: &str) -> Result<TermKind> {
    if token == "*" {
        return Ok(TermKind::Everything);
    }
    if token.starts_with('"') {
        return Ok(TermKind::Text(unquote(token).to_lowercase()));
    }

    let Some((field, value)) = token.split_once(':') else {
        return Ok(TermKind::Text(token.to_lowercase()));
    };
    if !field.chars().all(|c| c.is_ascii_lowercase()) {
        // Not a field prefix, e.g. "Re:" in plain text.
        return Ok(TermKind::Text(token.to_lowercase()));
    }

    let value = unquote(value);
    if value.is_empty() {
        return Err(TagviewError::malformed(
            input,
            format!("empty value for '{field}:'"),
        ));
    }

    let kind = match field {
        "tag" => TermKind::Tag(value.to_string()),
        "thread" => TermKind::Thread(value.to_string()),
        "id" => TermKind::Id(strip_angle_brackets(&value).to_string()),
        "from" => TermKind::Header(HeaderField::From, value.to_lowercase()),
        "to" => TermKind::Header(HeaderField::To, value.to_lowercase()),
        "cc" => TermKind::Header(HeaderField::Cc, value.to_lowercase()),
        "subject" => TermKind::Header(HeaderField::Subject, value.to_lowercase()),
        other => {
            return Err(TagviewError::malformed(
                input,
                format!("unknown field '{other}:'"),
            ))
        }
    };
    Ok(kind)
}

impl Query {
    /// Check whether a message matches.
    pub fn matches<M: MessageHandle + ?Sized>(&self, msg: &M) -> bool {
        if self.terms.is_empty() {
            return true;
        }
        if self.is_or {
            self.terms.iter().any(|term| term_matches(msg, term))
        } else {
            self.terms.iter().all(|term| term_matches(msg, term))
        }
    }
}

fn term_matches<M: MessageHandle + ?Sized>(msg: &M, term: &Term) -> bool {
    let raw = match &term.kind {
        TermKind::Everything => true,
        TermKind::Tag(tag) => msg.tags().contains(tag),
        TermKind::Thread(thread) => msg.thread_id() == thread,
        TermKind::Id(id) => msg.id() == id,
        TermKind::Header(field, needle) => header_contains(msg, field.name(), needle),
        TermKind::Text(needle) => ["subject", "from", "to"]
            .iter()
            .any(|name| header_contains(msg, name, needle)),
    };
    raw != term.negated
}

fn header_contains<M: MessageHandle + ?Sized>(msg: &M, name: &str, needle: &str) -> bool {
    msg.header(name)
        .is_some_and(|value| value.to_lowercase().contains(needle))
}

/// Split on whitespace, keeping double-quoted runs together. Escapes are
/// kept in the token and resolved by [`unquote`].
fn tokenize(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = input.trim().chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' && in_quotes {
            current.push(ch);
            if let Some(escaped) = chars.next() {
                current.push(escaped);
            }
        } else if ch == '"' {
            in_quotes = !in_quotes;
            current.push(ch);
        } else if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if in_quotes {
        return Err(TagviewError::malformed(input, "unterminated quote"));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Strip surrounding quotes and resolve `\"` / `\\` inside them.
fn unquote(value: &str) -> Cow<'_, str> {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
    else {
        return Cow::Borrowed(value);
    };
    if !inner.contains('\\') {
        return Cow::Borrowed(inner);
    }
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.extend(chars.next()),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

/// Render a value so that it parses back as exactly one term value.
pub fn quote_value(value: &str) -> Cow<'_, str> {
    let needs_quotes = value.is_empty()
        || value.starts_with('"')
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\\');
    if !needs_quotes {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    Cow::Owned(out)
}

/// `<id@host>` → `id@host`.
pub fn strip_angle_brackets(id: &str) -> &str {
    let id = id.trim();
    id.strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(id)
}
