// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;
use std::sync::OnceLock;

/// Stopwords filtered out of generated slugs and session names.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
    "can", "need", "dare", "ought", "used", "to", "of", "in", "for", "on", "with", "at", "by",
    "from", "as", "into", "through", "during", "before", "after", "above", "below", "between",
    "under", "again", "further", "then", "once", "here", "there", "when", "where", "why", "how",
    "all", "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not", "only",
    "own", "same", "so", "than", "too", "very", "just", "also", "now", "what", "which", "who",
    "whom", "this", "that", "these", "those", "am", "and", "but", "if", "or", "because", "while",
    "although", "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your",
    "yours", "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers",
    "herself", "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "about",
    "tell",
];

fn stopwords() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

/// Generate a slug from free text: lowercase, letters only, stopwords and
/// words of two characters or less removed, first five key words joined by
/// underscores.
///
/// `"what is the meaning of life"` → `"meaning_life"`.  Empty input yields
/// `"untitled"`; input with no key words yields `"session"`.
pub fn generate_slug(text: &str) -> String {
    generate_slug_with(text, 5)
}

pub fn generate_slug_with(text: &str, max_words: usize) -> String {
    if text.trim().is_empty() {
        return "untitled".to_string();
    }

    let lowered = text.to_lowercase();
    let key_words: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| w.len() > 2 && !stopwords().contains(w))
        .take(max_words)
        .collect();

    if key_words.is_empty() {
        return "session".to_string();
    }
    key_words.join("_")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_stopwords_and_short_words() {
        assert_eq!(generate_slug("what is the meaning of life"), "meaning_life");
    }

    #[test]
    fn keeps_at_most_max_words() {
        let slug = generate_slug_with("quantum computing error correction surface codes lattice", 2);
        assert_eq!(slug, "quantum_computing");
    }

    #[test]
    fn default_cap_is_five_words() {
        let slug = generate_slug("alpha bravo charlie delta echo foxtrot golf");
        assert_eq!(slug.split('_').count(), 5);
    }

    #[test]
    fn empty_input_is_untitled() {
        assert_eq!(generate_slug(""), "untitled");
        assert_eq!(generate_slug("   "), "untitled");
    }

    #[test]
    fn all_stopword_input_is_session() {
        assert_eq!(generate_slug("the of and it"), "session");
        // words of length ≤ 2 are removed as well
        assert_eq!(generate_slug("ab cd ef"), "session");
    }

    #[test]
    fn digits_and_punctuation_split_words() {
        assert_eq!(generate_slug("rust-2024 edition, async/await!"), "rust_edition_async_await");
    }

    #[test]
    fn case_is_normalized() {
        assert_eq!(generate_slug("Meaning LIFE"), "meaning_life");
    }
}
