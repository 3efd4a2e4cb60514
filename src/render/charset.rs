//! Charset decoding with a UTF-8 fallback.

use encoding_rs::{Encoding, UTF_8};
use tracing::debug;

/// Charset assumed when a part declares none, or one we do not know.
pub const FALLBACK_CHARSET: &str = "utf-8";

/// Decode `bytes` using the named charset.
///
/// Never fails: an unknown label falls back to UTF-8, and byte sequences
/// that are invalid in the chosen encoding become U+FFFD.
pub fn decode(bytes: &[u8], charset: Option<&str>) -> String {
    let encoding = charset
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .and_then(|label| {
            let found = Encoding::for_label(label.as_bytes());
            if found.is_none() {
                debug!(
                    charset = label,
                    fallback = FALLBACK_CHARSET,
                    "Unknown charset, decoding with fallback"
                );
            }
            found
        })
        .unwrap_or(UTF_8);

    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        debug!(
            encoding = used.name(),
            "Replaced undecodable byte sequences"
        );
    }
    text.into_owned()
}
