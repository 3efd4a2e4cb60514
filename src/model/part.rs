//! A single decoded MIME part.
//!
//! Parts are produced by the index for one request and dropped with it.
//! The ordinal is the part's external address: the same value is used when
//! a message is assembled and when a client later fetches the part.

use serde::Serialize;

use crate::render::charset;

/// One leaf part of a multipart message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MimePart {
    /// Zero-based position within the message's part list.
    pub ordinal: usize,

    /// Lower-case `type/subtype` (e.g. `"text/html"`).
    pub content_type: String,

    /// Declared charset, if any.
    pub charset: Option<String>,

    /// Declared filename (`Content-Disposition` filename or `Content-Type` name).
    pub filename: Option<String>,

    /// `Content-ID` without angle brackets.
    pub content_id: Option<String>,

    /// Payload with the transfer encoding already removed.
    #[serde(rename = "size", serialize_with = "serialize_len")]
    pub raw: Vec<u8>,
}

impl MimePart {
    /// Create a part with no charset, filename or content id.
    pub fn new(ordinal: usize, content_type: impl Into<String>, raw: impl Into<Vec<u8>>) -> Self {
        Self {
            ordinal,
            content_type: content_type.into(),
            charset: None,
            filename: None,
            content_id: None,
            raw: raw.into(),
        }
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// `true` for `text/*` parts.
    pub fn is_text(&self) -> bool {
        self.content_type.starts_with("text/")
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        self.raw.len() as u64
    }

    /// Decode the payload as text using the declared charset.
    ///
    /// Falls back to UTF-8 and substitutes undecodable sequences; never fails.
    pub fn decoded_text(&self) -> String {
        charset::decode(&self.raw, self.charset.as_deref())
    }

    /// Value for a `Content-Disposition` response header, when the part
    /// declares a filename.
    pub fn content_disposition(&self) -> Option<String> {
        self.filename.as_ref().map(|name| {
            let quoted = name.replace('\\', "\\\\").replace('"', "\\\"");
            format!("inline; filename=\"{quoted}\"")
        })
    }
}

/// Serializes the payload as its length so views never ship raw bytes.
fn serialize_len<S: serde::Serializer>(raw: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(raw.len() as u64)
}
