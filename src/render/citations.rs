//! Reply trimming.

/// Drop every line that starts with `>`.
///
/// Independent of the quote normalizer: quoted lines are removed outright
/// rather than nested. Line endings of the kept lines are preserved.
pub fn remove_citations(text: &str) -> String {
    text.split_inclusive('\n')
        .filter(|line| !line.starts_with('>'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_quoted_lines() {
        let body = "Sounds good.\n> Can we meet?\n>> Earlier text\nSee you\n";
        assert_eq!(remove_citations(body), "Sounds good.\nSee you\n");
    }

    #[test]
    fn test_keeps_indented_markers() {
        // Only a '>' in the first column marks a citation.
        let body = " > not a citation\na > b\n";
        assert_eq!(remove_citations(body), body);
    }

    #[test]
    fn test_crlf_and_missing_final_newline() {
        assert_eq!(remove_citations("a\r\n>b\r\nc"), "a\r\nc");
        assert_eq!(remove_citations(">only"), "");
    }
}
