//! Keyword tags for highlight windows.
//!
//! Chat text is split into runs of Han characters and runs of other
//! letters or digits. Punctuation, emoji and whitespace separate tokens and
//! never become tokens themselves.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{Han}+|[\p{L}\p{N}--\p{Han}]+").unwrap());

/// Tokens shorter than this many characters are ignored.
const MIN_TOKEN_CHARS: usize = 2;

/// The `top_k` most frequent tokens across `texts`.
///
/// Ordered by descending frequency; equal counts keep the order in which
/// the tokens were first seen.
pub fn top_keywords<S: AsRef<str>>(texts: &[S], top_k: usize) -> Vec<String> {
    // token -> (count, first seen)
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    let mut seen = 0usize;

    for text in texts {
        for token in TOKEN.find_iter(text.as_ref()) {
            let token = token.as_str();
            if token.chars().count() < MIN_TOKEN_CHARS {
                continue;
            }
            let entry = counts.entry(token).or_insert_with(|| {
                seen += 1;
                (0, seen)
            });
            entry.0 += 1;
        }
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(token, (count, first))| (token, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(top_k)
        .map(|(token, _, _)| token.to_string())
        .collect()
}
