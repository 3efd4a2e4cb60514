//! Body selection: pick the first part of a given content type.

use crate::model::part::MimePart;

/// Return the decoded text of the first part whose content type is exactly
/// `wanted`, or `None` when the message has no such part.
///
/// Later parts of the same type (e.g. siblings in a `multipart/alternative`)
/// are ignored. Which type is preferred is up to the caller.
pub fn select(parts: &[MimePart], wanted: &str) -> Option<String> {
    parts
        .iter()
        .find(|part| part.content_type == wanted)
        .map(MimePart::decoded_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts() -> Vec<MimePart> {
        vec![
            MimePart::new(0, "text/plain", "plain body").with_charset("us-ascii"),
            MimePart::new(1, "text/html", "<p>first</p>").with_charset("utf-8"),
            MimePart::new(2, "text/html", "<p>second</p>"),
            MimePart::new(3, "image/png", vec![0x89, b'P', b'N', b'G']).with_filename("a.png"),
        ]
    }

    #[test]
    fn test_first_match_wins() {
        assert_eq!(select(&parts(), "text/html").as_deref(), Some("<p>first</p>"));
    }

    #[test]
    fn test_no_match_is_none() {
        let only_plain = vec![MimePart::new(0, "text/plain", "hi")];
        assert_eq!(select(&only_plain, "text/html"), None);
        assert_eq!(select(&[], "text/plain"), None);
    }

    #[test]
    fn test_match_is_exact_and_case_sensitive() {
        let parts = vec![
            MimePart::new(0, "TEXT/HTML", "upper"),
            MimePart::new(1, "text/html; charset=utf-8", "params"),
        ];
        assert_eq!(select(&parts, "text/html"), None);
    }

    #[test]
    fn test_decodes_declared_charset() {
        let parts =
            vec![MimePart::new(0, "text/plain", b"na\xefve".to_vec()).with_charset("iso-8859-1")];
        assert_eq!(select(&parts, "text/plain").as_deref(), Some("naïve"));
    }
}
