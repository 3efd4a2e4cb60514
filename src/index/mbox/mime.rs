//! Leaf MIME parts of a raw message, via `mail-parser`.

use mail_parser::{MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::warn;

use crate::index::query::strip_angle_brackets;
use crate::model::part::MimePart;

/// Split a raw RFC 5322 message into its leaf parts, in document order.
///
/// Text and HTML payloads have already been decoded to UTF-8 by the parser
/// and carry charset `utf-8`. A message the parser rejects is exposed as a
/// single `text/plain` part holding everything after the header block.
pub fn extract_parts(raw: &[u8]) -> Vec<MimePart> {
    let Some(message) = MessageParser::default().parse(raw) else {
        warn!(len = raw.len(), "Unparseable message, exposing body as text/plain");
        return vec![MimePart::new(0, "text/plain", body_fallback(raw))];
    };

    message
        .parts
        .iter()
        .filter(|part| !matches!(part.body, PartType::Multipart(_)))
        .enumerate()
        .map(|(ordinal, part)| to_mime_part(ordinal, part))
        .collect()
}

fn to_mime_part(ordinal: usize, part: &MessagePart<'_>) -> MimePart {
    let content_type = part
        .content_type()
        .map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .map(|ct| ct.to_ascii_lowercase())
        .unwrap_or_else(|| default_content_type(&part.body).to_string());

    let charset = match part.body {
        PartType::Text(_) | PartType::Html(_) => Some("utf-8".to_string()),
        _ => part
            .content_type()
            .and_then(|ct| ct.attribute("charset"))
            .map(str::to_string),
    };

    let mut mime = MimePart::new(ordinal, content_type, part.contents().to_vec());
    mime.charset = charset;
    mime.filename = part.attachment_name().map(str::to_string);
    mime.content_id = part
        .content_id()
        .map(|id| strip_angle_brackets(id).to_string());
    mime
}

fn default_content_type(body: &PartType<'_>) -> &'static str {
    match body {
        PartType::Text(_) => "text/plain",
        PartType::Html(_) => "text/html",
        PartType::Message(_) => "message/rfc822",
        _ => "application/octet-stream",
    }
}

fn body_fallback(raw: &[u8]) -> Vec<u8> {
    let split = [&b"\r\n\r\n"[..], &b"\n\n"[..]]
        .iter()
        .filter_map(|sep| {
            raw.windows(sep.len())
                .position(|w| w == *sep)
                .map(|pos| pos + sep.len())
        })
        .min();
    raw[split.unwrap_or(0)..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_part_message() {
        let raw = b"Subject: x\nContent-Type: text/plain; charset=utf-8\n\nHello\n";
        let parts = extract_parts(raw);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].ordinal, 0);
        assert_eq!(parts[0].content_type, "text/plain");
        assert_eq!(parts[0].decoded_text().trim_end(), "Hello");
    }

    #[test]
    fn test_multipart_leaves_in_order() {
        let raw = b"Subject: x\n\
MIME-Version: 1.0\n\
Content-Type: multipart/mixed; boundary=\"B\"\n\
\n\
--B\n\
Content-Type: text/plain; charset=iso-8859-1\n\
Content-Transfer-Encoding: quoted-printable\n\
\n\
caf=E9\n\
--B\n\
Content-Type: application/pdf; name=\"r.pdf\"\n\
Content-Disposition: attachment; filename=\"r.pdf\"\n\
Content-ID: <pdf1@x>\n\
Content-Transfer-Encoding: base64\n\
\n\
JVBERi0=\n\
--B--\n";
        let parts = extract_parts(raw);
        assert_eq!(parts.len(), 2);

        assert_eq!(parts[0].content_type, "text/plain");
        assert_eq!(parts[0].charset.as_deref(), Some("utf-8"));
        assert!(parts[0].decoded_text().starts_with("café"));

        assert_eq!(parts[1].ordinal, 1);
        assert_eq!(parts[1].content_type, "application/pdf");
        assert_eq!(parts[1].filename.as_deref(), Some("r.pdf"));
        assert_eq!(parts[1].content_id.as_deref(), Some("pdf1@x"));
        assert_eq!(parts[1].raw, b"%PDF-");
    }

    #[test]
    fn test_body_fallback() {
        assert_eq!(body_fallback(b"A: b\n\nbody"), b"body");
        assert_eq!(body_fallback(b"A: b\r\n\r\nbody"), b"body");
        assert_eq!(body_fallback(b"no headers"), b"no headers");
    }
}
