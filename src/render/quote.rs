//! Quote-depth normalization for `>`-quoted plain text.
//!
//! Turns reply bodies like
//!
//! ```text
//! > > original
//! > reply
//! answer
//! ```
//!
//! into a balanced stream of open/close markers around escaped text lines,
//! suitable for rendering as nested `<blockquote>` elements. Tokens are
//! produced lazily, one input line at a time.

use std::fmt::Write as _;

use html_escape::encode_safe;

use crate::model::message::SafeHtml;

/// One element of the normalized stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteToken {
    /// Enter one more quote level.
    Open,
    /// Leave one quote level.
    Close,
    /// An escaped line of text, quote prefix removed.
    Text(String),
}

/// Pull-based normalizer over a sequence of lines. Single pass; not restartable.
#[derive(Debug)]
pub struct QuoteNormalizer<I> {
    lines: I,
    level: usize,
    /// Markers still to emit before `pending_text`.
    pending_markers: usize,
    pending_open: bool,
    pending_text: Option<String>,
    exhausted: bool,
}

/// Normalize `lines` into a lazy stream of [`QuoteToken`]s.
///
/// Depth is the number of leading `>` characters (a contiguous run; `"> >"`
/// has depth 1). Moving deeper emits one `Open` per level gained, moving out
/// emits one `Close` per level lost, and the stream ends by closing every
/// level still open.
pub fn normalize<I, S>(lines: I) -> QuoteNormalizer<I::IntoIter>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    QuoteNormalizer {
        lines: lines.into_iter(),
        level: 0,
        pending_markers: 0,
        pending_open: false,
        pending_text: None,
        exhausted: false,
    }
}

impl<I> QuoteNormalizer<I> {
    /// Quote depth after the most recently consumed line.
    pub fn level(&self) -> usize {
        self.level
    }
}

impl<I, S> Iterator for QuoteNormalizer<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = QuoteToken;

    fn next(&mut self) -> Option<QuoteToken> {
        loop {
            if self.pending_markers > 0 {
                self.pending_markers -= 1;
                return Some(if self.pending_open {
                    QuoteToken::Open
                } else {
                    QuoteToken::Close
                });
            }
            if let Some(text) = self.pending_text.take() {
                return Some(QuoteToken::Text(text));
            }
            if self.exhausted {
                return None;
            }

            match self.lines.next() {
                Some(line) => {
                    let (depth, stripped) = split_quote(line.as_ref());
                    self.pending_open = depth > self.level;
                    self.pending_markers = depth.abs_diff(self.level);
                    self.level = depth;
                    self.pending_text = Some(encode_safe(stripped).into_owned());
                }
                None => {
                    self.exhausted = true;
                    self.pending_open = false;
                    self.pending_markers = self.level;
                    self.level = 0;
                }
            }
        }
    }
}

impl<I, S> std::iter::FusedIterator for QuoteNormalizer<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
}

/// Split a line into its quote depth and the text after the `>` run and
/// any spaces that follow it.
fn split_quote(line: &str) -> (usize, &str) {
    let depth = line.bytes().take_while(|&b| b == b'>').count();
    (depth, line[depth..].trim_start_matches(' '))
}

/// Render plain text as nested `<blockquote>` markup.
///
/// Every text line is escaped and followed by a newline, so the result is
/// meant for a container with `white-space: pre-wrap`.
pub fn render_quoted(text: &str) -> SafeHtml {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for token in normalize(text.lines()) {
        match token {
            QuoteToken::Open => out.push_str("<blockquote>"),
            QuoteToken::Close => out.push_str("</blockquote>"),
            QuoteToken::Text(line) => {
                let _ = writeln!(out, "{line}");
            }
        }
    }
    SafeHtml::new(out)
}
