//! Message rendering: charset decoding, body selection, HTML body
//! extraction, quote normalization and reply trimming.

pub mod body;
pub mod charset;
pub mod citations;
pub mod html;
pub mod quote;
pub mod select;

pub use body::{body_html, body_text};
pub use citations::remove_citations;
pub use quote::{normalize, render_quoted, QuoteToken};
pub use select::select;
