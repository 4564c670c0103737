use std::collections::BTreeSet;

pub const MIN_KEYWORD_CHARS: usize = 2;

/// Candidate keywords of a post: the distinct letter/digit tokens of title and
/// summary that are at least `MIN_KEYWORD_CHARS` characters long.
pub fn extract_keywords(title: Option<&str>, summary: Option<&str>) -> BTreeSet<String> {
    let text = format!("{} {}", title.unwrap_or(""), summary.unwrap_or(""));
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    cleaned
        .split_whitespace()
        .filter(|token| token.chars().count() >= MIN_KEYWORD_CHARS)
        .map(str::to_string)
        .collect()
}
