use std::collections::HashSet;

/// Punctuation removed from a text before it is split into keywords
const STRIPPED_PUNCTUATION: [char; 6] = ['.', ',', '!', '?', ';', ':'];

/// Tokens of this many characters or fewer are not keywords
const MAX_IGNORED_TOKEN_LENGTH: usize = 2;

/// Normalizes a free text into the keywords used by the keyword index
///
/// The text is lower-cased, stripped from `. , ! ? ; :`, split on whitespace,
/// and tokens of 2 characters or fewer are dropped.
/// Keywords are deduplicated and keep the order of their first occurrence,
/// so that the first keywords of a search query are the ones kept when a query is capped.
///
/// The same function is applied to image descriptions at ingestion and to search queries.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !STRIPPED_PUNCTUATION.contains(c))
        .collect();

    let mut seen = HashSet::new();

    normalized
        .split_whitespace()
        .filter(|token| token.chars().count() > MAX_IGNORED_TOKEN_LENGTH)
        .filter(|token| seen.insert(token.to_string()))
        .map(str::to_string)
        .collect()
}
