//! HTML body extraction.
//!
//! Mail clients send complete documents; a message view embeds only the
//! content of `<body>`. Head, script and style blocks never survive.

/// Extract the body fragment of an HTML document.
///
/// - With a `<body>` element: its inner content (up to `</body>` or EOF).
/// - Without one: the input minus doctype, `<html>` tags and the `<head>` block.
///
/// `<script>` and `<style>` blocks are removed in both cases.
pub fn extract_body(html: &str) -> String {
    let fragment = match body_range(html) {
        Some((start, end)) => html[start..end].to_string(),
        None => {
            let mut text = remove_tag_block(html, "head");
            for tag in ["!doctype", "html", "/html"] {
                text = remove_tags(&text, tag);
            }
            text
        }
    };

    let fragment = remove_tag_block(&fragment, "script");
    let fragment = remove_tag_block(&fragment, "style");
    fragment.trim().to_string()
}

/// Byte range of the content between `<body ...>` and `</body>`.
fn body_range(html: &str) -> Option<(usize, usize)> {
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();
    let open = find_tag(&lower, "body", 0)?;
    let start = open + lower[open..].find('>')? + 1;
    let end = find_tag(&lower, "/body", start).unwrap_or(html.len());
    Some((start, end))
}

/// Find `<name` at or after `from`, followed by a tag boundary.
fn find_tag(lower: &str, name: &str, from: usize) -> Option<usize> {
    let needle = format!("<{name}");
    let mut pos = from;
    while let Some(found) = lower[pos..].find(&needle) {
        let at = pos + found;
        let after = at + needle.len();
        match lower.as_bytes().get(after) {
            None | Some(b'>' | b'/' | b' ' | b'\t' | b'\r' | b'\n') => return Some(at),
            _ => pos = after,
        }
    }
    None
}

/// Remove an entire element including its content (e.g. `<script>…</script>`).
///
/// An unclosed element swallows the rest of the input.
fn remove_tag_block(html: &str, tag: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let close = format!("/{tag}");
    let mut result = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(start) = find_tag(&lower, tag, pos) {
        result.push_str(&html[pos..start]);
        pos = match find_tag(&lower, &close, start) {
            Some(end) => lower[end..]
                .find('>')
                .map_or(html.len(), |gt| end + gt + 1),
            None => html.len(),
        };
    }
    result.push_str(&html[pos..]);
    result
}

/// Remove every `<tag ...>` occurrence, keeping the surrounding content.
fn remove_tags(html: &str, tag: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let mut result = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(start) = find_tag(&lower, tag, pos) {
        result.push_str(&html[pos..start]);
        pos = lower[start..]
            .find('>')
            .map_or(html.len(), |gt| start + gt + 1);
    }
    result.push_str(&html[pos..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_body_content() {
        let html = "<!DOCTYPE html><html><head><title>T</title></head>\
                    <BODY class=\"x\"><p>Hello</p></body></html>";
        assert_eq!(extract_body(html), "<p>Hello</p>");
    }

    #[test]
    fn test_fragment_without_body() {
        let html = "<html><head><meta charset=\"utf-8\"></head><div>Hi</div></html>";
        assert_eq!(extract_body(html), "<div>Hi</div>");
        assert_eq!(extract_body("<b>bare</b>"), "<b>bare</b>");
    }

    #[test]
    fn test_unclosed_body() {
        assert_eq!(extract_body("<body><p>cut off"), "<p>cut off");
    }

    #[test]
    fn test_removes_scripts_and_styles() {
        let html = "<body>Before<script type=\"text/javascript\">alert('x')</script>\
                    <style>p{}</style>After</body>";
        assert_eq!(extract_body(html), "BeforeAfter");
    }

    #[test]
    fn test_tag_prefixes_are_not_confused() {
        // <bodyguard> and <header> are not <body> / <head>.
        let html = "<header>top</header><bodyguard>x</bodyguard>";
        assert_eq!(extract_body(html), html);
    }

    #[test]
    fn test_non_ascii_content_survives() {
        let html = "<html><body><p>Grüße — ÄÖÜ</p></body></html>";
        assert_eq!(extract_body(html), "<p>Grüße — ÄÖÜ</p>");
    }
}
