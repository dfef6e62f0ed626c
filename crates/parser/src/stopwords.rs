use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

// Ban comments are overwhelmingly English regardless of the advertised
// server language, so a single embedded list covers the annotation case.
static ENGLISH: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    include_str!("../data/english.txt")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
});

static WORD_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\w-]+").unwrap());

fn stop_words(language: &str) -> &'static HashSet<&'static str> {
    match language {
        "en" | "english" => &ENGLISH,
        _ => {
            static EMPTY: Lazy<HashSet<&'static str>> = Lazy::new(HashSet::new);
            &EMPTY
        }
    }
}

/// Significant words of a free-text string: lowercased, longer than two
/// characters, minus the language's stop words.
pub fn key_words(language: &str, text: &str) -> HashSet<String> {
    let stops = stop_words(language);
    WORD_PATTERN
        .find_iter(text)
        .map(|word| word.as_str().to_lowercase())
        .filter(|word| word.len() > 2 && !stops.contains(word.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_significant_words() {
        let words = key_words("english", "Instance has anti-trans content.");
        assert!(words.contains("anti-trans"));
        assert!(words.contains("instance"));
        assert!(!words.contains("has"));
    }

    #[test]
    fn ignores_punctuation() {
        let words = key_words("english", "!@#$%^&*(ignore-punctuation)");
        assert!(words.contains("ignore-punctuation"));
    }

    #[test]
    fn stop_words_only_is_empty() {
        assert!(key_words("english", "the in a as").is_empty());
    }

    #[test]
    fn unknown_language_keeps_everything_long_enough() {
        let words = key_words("xx", "the quick fox");
        assert!(words.contains("the"));
        assert!(words.contains("quick"));
    }
}
