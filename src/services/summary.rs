//! Summary derivation from body text.

use unicode_segmentation::UnicodeSegmentation;

use crate::models::SummaryConfig;

const ELLIPSIS: &str = "...";

/// Build a summary from `body`.
///
/// Paragraphs are newline-separated blocks, or sentences when the body is a
/// single line. Paragraphs shorter than `min_paragraph` are ignored; the rest
/// accumulate until `min_length` is reached, and the result is cut at a word
/// boundary so it never exceeds `max_length` (zero means unlimited).
pub fn derive(body: &str, limits: &SummaryConfig) -> String {
    let mut summary = String::new();
    for paragraph in paragraphs(body) {
        if paragraph.chars().count() < limits.min_paragraph {
            continue;
        }
        if !summary.is_empty() {
            summary.push(' ');
        }
        summary.push_str(paragraph);
        if summary.chars().count() >= limits.min_length {
            break;
        }
    }
    truncate(&summary, limits.max_length)
}

fn paragraphs(body: &str) -> Vec<&str> {
    let lines: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.len() > 1 {
        return lines;
    }
    body.unicode_sentences()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Cut `text` at the last word boundary that leaves room for an ellipsis.
pub fn truncate(text: &str, max_length: usize) -> String {
    if max_length == 0 || text.chars().count() <= max_length {
        return text.to_string();
    }
    let budget = max_length.saturating_sub(ELLIPSIS.len());
    let mut end = 0;
    let mut used = 0;
    for (offset, word) in text.split_word_bound_indices() {
        let len = word.chars().count();
        if used + len > budget {
            break;
        }
        used += len;
        if !word.trim().is_empty() {
            end = offset + word.len();
        }
    }
    let cut = text[..end].trim_end_matches(|c: char| c.is_whitespace() || c == ',' || c == ';');
    format!("{cut}{ELLIPSIS}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_length: usize, min_length: usize, min_paragraph: usize) -> SummaryConfig {
        SummaryConfig {
            max_length,
            min_length,
            min_paragraph,
        }
    }

    #[test]
    fn test_short_paragraphs_ignored() {
        let body = "Share this\n\
            The first real paragraph is long enough.\n\
            Another paragraph follows here.";
        assert_eq!(
            derive(body, &limits(0, 10, 20)),
            "The first real paragraph is long enough."
        );
    }

    #[test]
    fn test_accumulates_to_min_length() {
        let body = "One sentence here. Two sentences here. Three sentences here.";
        assert_eq!(
            derive(body, &limits(0, 30, 5)),
            "One sentence here. Two sentences here."
        );
    }

    #[test]
    fn test_truncates_at_word_boundary() {
        let text = "The quick brown fox jumps over the lazy dog";
        let cut = truncate(text, 20);
        assert_eq!(cut, "The quick brown...");
        assert!(cut.chars().count() <= 20);
        assert_eq!(truncate(text, 0), text);
        assert_eq!(truncate("short", 20), "short");
    }

    #[test]
    fn test_multibyte_text() {
        let cut = truncate("Über große Straßen fährt man schnell", 16);
        assert!(cut.chars().count() <= 16);
        assert!(cut.ends_with(ELLIPSIS));
    }
}
