use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::db::LegalFlag;

const LEGAL_KEYWORDS: &[&str] = &[
    "agreement",
    "contract",
    "party",
    "parties",
    "whereas",
    "heretofore",
    "hereinafter",
    "jurisdiction",
    "liability",
    "indemnify",
    "indemnification",
    "clause",
    "article",
    "section",
    "subsection",
    "governing law",
    "termination",
    "confidentiality",
    "intellectual property",
    "warranty",
    "disclaimer",
    "force majeure",
    "arbitration",
    "litigation",
    "notwithstanding",
    "pursuant",
    "licensor",
    "licensee",
    "lessor",
    "lessee",
];

/// Below this many words a text is too short to judge.
const MIN_WORDS_FOR_CLASSIFICATION: usize = 50;
/// Keyword hits per word at or above which a text counts as legal.
const LEGAL_DENSITY_THRESHOLD: f64 = 0.01;

static LEGAL_KEYWORD_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    let alternation = LEGAL_KEYWORDS
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&format!(r"\b(?:{alternation})\b"))
        .case_insensitive(true)
        .build()
        .ok()
});

/// Keyword-density heuristic for whether a text reads like a legal document.
pub fn is_likely_legal(text: &str) -> LegalFlag {
    let words = text.split_whitespace().count();
    if words < MIN_WORDS_FOR_CLASSIFICATION {
        return LegalFlag::Unknown;
    }
    let Some(pattern) = LEGAL_KEYWORD_PATTERN.as_ref() else {
        return LegalFlag::Unknown;
    };

    let hits = pattern.find_iter(text).count();
    if hits as f64 / words as f64 >= LEGAL_DENSITY_THRESHOLD {
        LegalFlag::Legal
    } else {
        LegalFlag::NotLegal
    }
}

/// Counts words for document analytics.
pub trait WordCounter: Send + Sync {
    fn count(&self, text: &str) -> Result<usize, String>;
}

/// Whitespace tokens that contain at least one letter or digit.
///
/// Bare punctuation such as `-` or `§` is not a word.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconWordCounter;

impl WordCounter for LexiconWordCounter {
    fn count(&self, text: &str) -> Result<usize, String> {
        Ok(text
            .split_whitespace()
            .filter(|token| token.chars().any(char::is_alphanumeric))
            .count())
    }
}

/// Count with `counter`, falling back to a plain whitespace split if it fails.
pub fn word_count(counter: &dyn WordCounter, text: &str) -> i64 {
    let count = counter.count(text).unwrap_or_else(|err| {
        tracing::debug!(error = %err, "Word counter failed; using whitespace split");
        text.split_whitespace().count()
    });
    i64::try_from(count).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filler(words: usize) -> String {
        vec!["word"; words].join(" ")
    }

    #[test]
    fn short_texts_are_unknown() {
        assert_eq!(is_likely_legal("This Agreement binds the parties."), LegalFlag::Unknown);
        assert_eq!(is_likely_legal(""), LegalFlag::Unknown);
    }

    #[test]
    fn keyword_density_decides_long_texts() {
        let legal = format!("{} The Licensee shall comply.", filler(60));
        assert_eq!(is_likely_legal(&legal), LegalFlag::Legal);

        let plain = filler(200);
        assert_eq!(is_likely_legal(&plain), LegalFlag::NotLegal);
    }

    #[test]
    fn multi_word_keywords_count() {
        let text = format!("{} Force Majeure applies.", filler(90));
        assert_eq!(is_likely_legal(&text), LegalFlag::Legal);
    }

    #[test]
    fn lexicon_counter_skips_bare_punctuation() {
        assert_eq!(LexiconWordCounter.count("Section 4 - Term §").expect("count"), 3);
    }

    struct BrokenCounter;

    impl WordCounter for BrokenCounter {
        fn count(&self, _text: &str) -> Result<usize, String> {
            Err("lexicon unavailable".to_string())
        }
    }

    #[test]
    fn word_count_falls_back_to_whitespace_split() {
        assert_eq!(word_count(&BrokenCounter, "a - b"), 3);
        assert_eq!(word_count(&LexiconWordCounter, "a - b"), 2);
    }
}
