//! Cleanup of generated text.

use regex::Regex;
use std::sync::LazyLock;

static KEYWORD_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,\n;/]+").expect("valid keyword split regex"));

static BULLET_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[•\-–—*·]+|\d{1,2}[.)])\s*").expect("valid bullet prefix regex")
});

const KEYWORD_TRIM: &[char] = &['•', '-', '–', '—', ' ', '\t', '"', '\'', '`'];

/// Maximum number of keyword phrases kept for an image search.
pub const MAX_KEYWORD_PHRASES: usize = 2;

/// Truncates `s` to at most `max_chars` characters.
#[must_use]
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    s.char_indices().nth(max_chars).map_or(s, |(idx, _)| &s[..idx])
}

/// Splits generated bullet text into clean lines.
///
/// Blank lines are dropped, as are leading bullet glyphs and short
/// numbering such as `1.` or `2)`.
#[must_use]
pub fn normalize_bullets(raw: &str) -> Vec<String> {
    raw.lines()
        .map(|line| BULLET_PREFIX.replace(line.trim(), "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Normalizes keyword text into a short comma-separated search phrase.
///
/// Returns an empty string when nothing usable remains.
#[must_use]
pub fn sanitize_keywords(raw: &str) -> String {
    KEYWORD_SPLIT
        .split(raw)
        .map(|part| part.trim_matches(KEYWORD_TRIM))
        .filter(|part| !part.is_empty())
        .take(MAX_KEYWORD_PHRASES)
        .collect::<Vec<_>>()
        .join(", ")
}
