//! Core data model types: MIME parts, message and thread views, tag deltas.

pub mod message;
pub mod part;
pub mod tags;

pub use message::{Headers, MessageSummary, MessageView, RenderedBody, SafeHtml, ThreadView};
pub use part::MimePart;
pub use tags::{TagDelta, TagRequest, TagTarget};
