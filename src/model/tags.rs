//! Tag mutation requests.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Tags to add and remove, applied together in one write session.
///
/// Removals are applied before additions, so a tag named in both sets
/// ends up present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagDelta {
    pub add: BTreeSet<String>,
    pub remove: BTreeSet<String>,
}

impl TagDelta {
    pub fn new<A, R, S>(add: A, remove: R) -> Self
    where
        A: IntoIterator<Item = S>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            add: add.into_iter().map(Into::into).collect(),
            remove: remove.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse command-line style arguments: `+tag` adds, `-tag` removes.
    ///
    /// Returns the offending argument when one has neither prefix.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> std::result::Result<Self, String> {
        let mut delta = Self::default();
        for arg in args {
            let arg = arg.as_ref();
            if let Some(tag) = arg.strip_prefix('+').filter(|t| !t.is_empty()) {
                delta.add.insert(tag.to_string());
            } else if let Some(tag) = arg.strip_prefix('-').filter(|t| !t.is_empty()) {
                delta.remove.insert(tag.to_string());
            } else {
                return Err(arg.to_string());
            }
        }
        Ok(delta)
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// JSON body of a tag mutation request: `{"tags": {"add": [...], "remove": [...]}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRequest {
    #[serde(default)]
    pub tags: TagDelta,
}

/// Which messages a delta applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagTarget {
    /// A single message id.
    Message(String),
    /// Every message of a thread.
    Thread(String),
}
