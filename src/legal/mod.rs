//! Legal-text heuristics: glossary term extraction, document classification,
//! word counting, and chat query intent.

pub mod classify;
pub mod glossary;
pub mod intent;

pub use classify::{LexiconWordCounter, WordCounter, is_likely_legal, word_count};
pub use glossary::{GlossaryMerger, MergeReport, NO_EXPLANATION};
pub use intent::{QueryIntent, classify_query};
