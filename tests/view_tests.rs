//! Behavior of the rendering core against the in-memory index.

use std::collections::BTreeSet;

use proptest::prelude::*;

use tagview::assemble::{assemble_thread, find_message, part_by_ordinal};
use tagview::index::memory::{MemoryIndex, StoredMessage};
use tagview::index::{MailIndex, ReadSession, WriteSession};
use tagview::model::{MimePart, TagDelta, TagTarget};
use tagview::render::{normalize, remove_citations, render_quoted, select, QuoteToken};
use tagview::{MessageAssembler, TagMutator, TagviewError};

use QuoteToken::{Close, Open, Text};

fn text(s: &str) -> QuoteToken {
    Text(s.to_string())
}

fn message(id: &str, thread: &str, subject: &str) -> StoredMessage {
    StoredMessage::new(id, thread)
        .with_header("Subject", subject)
        .with_header("From", "Alice <alice@example.com>")
        .with_header("Date", "Mon, 1 Jan 2024 09:00:00 +0000")
        .with_tag("inbox")
}

/// Two threads: `t1` holds a1 (oldest) and a2, `t2` holds b1.
fn index() -> MemoryIndex {
    MemoryIndex::from_messages([
        message("a1@example.com", "t1", "Plan")
            .with_part(MimePart::new(0, "text/plain", "first draft").with_charset("utf-8")),
        message("b1@example.com", "t2", "Other").with_tag("unread"),
        message("a2@example.com", "t1", "Re: Plan")
            .with_part(MimePart::new(0, "text/plain", b"na\xefve".to_vec()))
            .with_part(
                MimePart::new(0, "text/html", "<html><body><b>bold</b></body></html>")
                    .with_charset("utf-8"),
            )
            .with_part(
                MimePart::new(0, "image/png", b"\x89PNG".to_vec()).with_filename("dot.png"),
            ),
    ])
}

fn tags_of(index: &MemoryIndex, id: &str) -> BTreeSet<String> {
    MessageAssembler::new(index).message(id).unwrap().tags
}

#[test]
fn test_normalize_passes_unquoted_text_through() {
    let tokens: Vec<_> = normalize(["hello"]).collect();
    assert_eq!(tokens, vec![text("hello")]);
}

#[test]
fn test_normalize_nests_and_unwinds() {
    let tokens: Vec<_> = normalize([">a", ">>b", "c"]).collect();
    assert_eq!(
        tokens,
        vec![Open, text("a"), Open, text("b"), Close, Close, text("c")]
    );
}

#[test]
fn test_rendered_quotes_are_escaped() {
    let html = render_quoted("> <script>\nok");
    assert_eq!(
        html.as_str(),
        "<blockquote>&lt;script&gt;\n</blockquote>ok\n"
    );
}

#[test]
fn test_select_first_html_part_or_nothing() {
    let plain_only = vec![MimePart::new(0, "text/plain", "hi")];
    assert_eq!(select(&plain_only, "text/html"), None);

    let two_html = vec![
        MimePart::new(0, "text/plain", "hi"),
        MimePart::new(1, "text/html", "<p>one</p>"),
        MimePart::new(2, "text/html", "<p>two</p>"),
    ];
    assert_eq!(select(&two_html, "text/html").as_deref(), Some("<p>one</p>"));
}

#[test]
fn test_missing_charset_never_fails_assembly() {
    let index = index();
    let view = MessageAssembler::new(&index)
        .message("a2@example.com")
        .unwrap();
    let text = view.text.unwrap();
    assert!(text.starts_with("na"));
    assert!(text.contains('\u{fffd}'));
    assert_eq!(view.html.unwrap().as_str(), "<b>bold</b>");
}

#[test]
fn test_thread_is_newest_first_with_newest_subject() {
    let index = index();
    let session = index.open_read().unwrap();
    let thread = assemble_thread(&session, "t1").unwrap();
    let ids: Vec<&str> = thread.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["a2@example.com", "a1@example.com"]);
    assert_eq!(thread.subject.as_deref(), Some("Re: Plan"));

    let err = assemble_thread(&session, "t9").unwrap_err();
    assert!(matches!(err, TagviewError::ThreadNotFound(_)));
}

#[test]
fn test_part_fetch_matches_assembled_view() {
    let index = index();
    let session = index.open_read().unwrap();
    let view = find_message(&session, "a2@example.com").unwrap();
    assert_eq!(view.parts.len(), 3);
    for k in 0..view.parts.len() {
        let part = part_by_ordinal(&session, "a2@example.com", k).unwrap();
        assert_eq!(part.raw, view.parts[k].raw);
        assert_eq!(part.content_type, view.parts[k].content_type);
        assert_eq!(part.ordinal, k);
    }
    assert!(part_by_ordinal(&session, "a2@example.com", 3)
        .unwrap_err()
        .is_not_found());
    assert!(part_by_ordinal(&session, "zz@example.com", 0)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_overlapping_delta_leaves_tag_present() {
    let index = index();
    let delta = TagDelta::new(["inbox", "todo"], ["inbox"]);
    TagMutator::new(&index)
        .apply(&TagTarget::Message("a1@example.com".into()), &delta)
        .unwrap();
    assert!(tags_of(&index, "a1@example.com").contains("inbox"));

    // Removing an absent tag is a no-op before the add.
    let delta = TagDelta::new(["archived"], ["archived"]);
    TagMutator::new(&index)
        .apply(&TagTarget::Message("a1@example.com".into()), &delta)
        .unwrap();
    assert!(tags_of(&index, "a1@example.com").contains("archived"));
}

#[test]
fn test_thread_delta_is_scoped_to_thread() {
    let index = index();
    let delta = TagDelta::new(["done"], ["inbox"]);
    let touched = TagMutator::new(&index)
        .apply(&TagTarget::Thread("t1".into()), &delta)
        .unwrap();
    assert_eq!(touched, 2);

    for id in ["a1@example.com", "a2@example.com"] {
        let tags = tags_of(&index, id);
        assert!(tags.contains("done"), "{id}");
        assert!(!tags.contains("inbox"), "{id}");
    }
    let other = tags_of(&index, "b1@example.com");
    assert!(other.contains("inbox"));
    assert!(!other.contains("done"));
}

#[test]
fn test_reads_do_not_see_staged_changes() {
    let index = index();
    let reader = index.open_read().unwrap();
    let mut writer = index.open_write().unwrap();
    writer.add_tag("b1@example.com", "flagged").unwrap();
    assert_eq!(reader.count("tag:flagged").unwrap(), 0);

    // Only one writer at a time.
    assert!(index.try_open_write().unwrap_err().is_retryable());

    writer.commit().unwrap();
    assert_eq!(reader.count("tag:flagged").unwrap(), 0);
    assert_eq!(index.open_read().unwrap().count("tag:flagged").unwrap(), 1);
}

#[test]
fn test_listing_and_tags() {
    let index = index();
    let assembler = MessageAssembler::new(&index);
    assert_eq!(assembler.list_tag("inbox").unwrap().len(), 3);
    assert_eq!(assembler.list_tag("unread").unwrap()[0].id, "b1@example.com");
    assert_eq!(assembler.count("*").unwrap(), 3);
    let all: Vec<String> = assembler.all_tags().unwrap().into_iter().collect();
    assert_eq!(all, ["inbox", "unread"]);
}

#[test]
fn test_citations_are_removed_line_by_line() {
    assert_eq!(
        remove_citations("thanks\n> quoted\n>> deeper\n  > kept\nbye"),
        "thanks\n  > kept\nbye"
    );
}

#[test]
fn test_quoted_tag_names_are_listable() {
    let index = index();
    let delta = TagDelta::new(["say\"hi"], []);
    TagMutator::new(&index)
        .apply(&TagTarget::Message("a1@example.com".into()), &delta)
        .unwrap();

    let assembler = MessageAssembler::new(&index);
    assert!(assembler.all_tags().unwrap().contains("say\"hi"));
    let listed = assembler.list_tag("say\"hi").unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, "a1@example.com");
}

#[test]
fn test_opaque_thread_ids_with_quotes() {
    let index = index();
    index
        .insert(message("q1@example.com", "t\"1", "Quoted").with_tag("unread"))
        .unwrap();

    let thread = MessageAssembler::new(&index).thread("t\"1").unwrap();
    assert_eq!(thread.messages.len(), 1);
    assert_eq!(thread.subject.as_deref(), Some("Quoted"));

    let touched = TagMutator::new(&index)
        .apply(
            &TagTarget::Thread("t\"1".into()),
            &TagDelta::new([], ["unread"]),
        )
        .unwrap();
    assert_eq!(touched, 1);
    assert!(!tags_of(&index, "q1@example.com").contains("unread"));
    assert!(tags_of(&index, "b1@example.com").contains("unread"));
}

#[test]
fn test_blank_tag_names_are_rejected() {
    let index = index();
    let err = TagMutator::new(&index)
        .apply(
            &TagTarget::Message("a1@example.com".into()),
            &TagDelta::new(["ok", ""], []),
        )
        .unwrap_err();
    assert!(matches!(err, TagviewError::InvalidTag(_)));
    assert!(!tags_of(&index, "a1@example.com").contains("ok"));
}

proptest! {
    #[test]
    fn test_normalize_is_balanced(lines in prop::collection::vec("[> a<&]{0,6}", 0..20)) {
        let mut depth: i64 = 0;
        for token in normalize(&lines) {
            match token {
                Open => depth += 1,
                Close => depth -= 1,
                Text(_) => {}
            }
            prop_assert!(depth >= 0);
        }
        prop_assert_eq!(depth, 0);
    }
}
