//! `tagview`: browse tagged mail threads, render message bodies, fetch
//! MIME parts and edit tags on top of a mail index.
//!
//! The rendering core ([`assemble`], [`render`], [`tags`]) talks to the
//! index only through the traits in [`index`]. Two back ends ship with the
//! crate: an in-memory index and an mbox-backed one.

pub mod assemble;
pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod render;
pub mod tags;

pub use assemble::MessageAssembler;
pub use error::{Result, TagviewError};
pub use tags::TagMutator;
