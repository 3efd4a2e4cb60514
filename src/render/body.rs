//! Body output for a message view, driven by the `[display]` config.

use std::borrow::Cow;

use html_escape::encode_safe;

use crate::config::DisplayConfig;
use crate::model::MessageView;

use super::{remove_citations, render_quoted};

/// Plain-text body to print, with citations dropped when
/// `strip_citations` is set. `None` when the message has no text part.
pub fn body_text<'v>(view: &'v MessageView, display: &DisplayConfig) -> Option<Cow<'v, str>> {
    let text = view.text.as_deref()?;
    Some(if display.strip_citations {
        Cow::Owned(remove_citations(text))
    } else {
        Cow::Borrowed(text)
    })
}

/// HTML fragment for one message.
///
/// The extracted HTML body wins when `show_html` is set or when there is no
/// text part. Otherwise the text is rendered as nested blockquotes
/// (`render_quotes`) or as an escaped `<pre>` block.
pub fn body_html(view: &MessageView, display: &DisplayConfig) -> String {
    if display.show_html || view.text.is_none() {
        if let Some(html) = &view.html {
            return html.to_string();
        }
    }
    let Some(text) = body_text(view, display) else {
        return String::new();
    };
    if display.render_quotes {
        format!(
            "<div style=\"white-space: pre-wrap\">{}</div>",
            render_quoted(&text)
        )
    } else {
        format!("<pre>{}</pre>", encode_safe(&text))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::model::{Headers, SafeHtml};

    const BODY: &str = "hi\n> quoted\nbye";

    fn view(text: Option<&str>, html: Option<&str>) -> MessageView {
        MessageView {
            id: "m1".into(),
            thread_id: "t1".into(),
            headers: Headers::default(),
            tags: BTreeSet::new(),
            html: html.map(|h| SafeHtml::new(h.to_string())),
            text: text.map(String::from),
            parts: Vec::new(),
        }
    }

    fn display(render_quotes: bool, strip_citations: bool) -> DisplayConfig {
        DisplayConfig {
            render_quotes,
            strip_citations,
            show_html: false,
        }
    }

    #[test]
    fn test_quotes_rendered_and_kept() {
        let html = body_html(&view(Some(BODY), None), &display(true, false));
        assert_eq!(
            html,
            "<div style=\"white-space: pre-wrap\">hi\n<blockquote>quoted\n</blockquote>bye\n</div>"
        );
    }

    #[test]
    fn test_quotes_rendered_and_stripped() {
        let html = body_html(&view(Some(BODY), None), &display(true, true));
        assert_eq!(html, "<div style=\"white-space: pre-wrap\">hi\nbye\n</div>");
    }

    #[test]
    fn test_pre_keeps_citations() {
        let html = body_html(&view(Some(BODY), None), &display(false, false));
        assert_eq!(html, "<pre>hi\n&gt; quoted\nbye</pre>");
    }

    #[test]
    fn test_pre_strips_citations() {
        let html = body_html(&view(Some(BODY), None), &display(false, true));
        assert_eq!(html, "<pre>hi\nbye</pre>");
    }

    #[test]
    fn test_html_body_selection() {
        let both = view(Some(BODY), Some("<p>hi</p>"));
        assert!(body_html(&both, &display(true, false)).starts_with("<div"));

        let show_html = DisplayConfig {
            show_html: true,
            ..display(true, false)
        };
        assert_eq!(body_html(&both, &show_html), "<p>hi</p>");
        assert_eq!(
            body_html(&view(None, Some("<p>only</p>")), &display(true, false)),
            "<p>only</p>"
        );
        assert_eq!(body_html(&view(None, None), &display(true, false)), "");
    }

    #[test]
    fn test_body_text_follows_strip_flag() {
        let v = view(Some(BODY), None);
        assert_eq!(body_text(&v, &display(true, false)).as_deref(), Some(BODY));
        assert_eq!(body_text(&v, &display(true, true)).as_deref(), Some("hi\nbye"));
        assert_eq!(body_text(&view(None, None), &display(true, true)), None);
    }
}
