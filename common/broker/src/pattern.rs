//! Topic routing-key matching.
//!
//! Patterns and keys are dot-separated words. `*` matches exactly one word,
//! `#` matches zero or more words; anything else matches literally.

/// Returns true when `routing_key` matches the binding `pattern`.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    let Some((first, rest)) = pattern.split_first() else {
        return key.is_empty();
    };
    match *first {
        "#" => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        "*" => !key.is_empty() && matches_words(rest, &key[1..]),
        word => key.first().copied() == Some(word) && matches_words(rest, &key[1..]),
    }
}
