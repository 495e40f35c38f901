//! Chat query intent classification.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Summary,
    Obligation,
    Termination,
    Confidentiality,
    Financial,
    Legal,
    Timeline,
    General,
}

impl QueryIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Obligation => "obligation",
            Self::Termination => "termination",
            Self::Confidentiality => "confidentiality",
            Self::Financial => "financial",
            Self::Legal => "legal",
            Self::Timeline => "timeline",
            Self::General => "general",
        }
    }
}

/// Ordered `(intent, keywords)` rules. Earlier rules win when several match.
///
/// Keywords are lowercase substrings, so `"terminat"` covers "terminate"
/// and "termination".
pub const INTENT_RULES: &[(QueryIntent, &[&str])] = &[
    (
        QueryIntent::Summary,
        &["summary", "overview", "main purpose", "what is this"],
    ),
    (
        QueryIntent::Obligation,
        &["obligation", "responsibilit", "must", "shall", "required"],
    ),
    (
        QueryIntent::Termination,
        &["terminat", "end", "cancel", "expire"],
    ),
    (
        QueryIntent::Confidentiality,
        &["confidential", "secret", "nda"],
    ),
    (
        QueryIntent::Financial,
        &["payment", "fee", "cost", "price", "amount"],
    ),
    (QueryIntent::Legal, &["law", "jurisdiction", "govern"]),
    (
        QueryIntent::Timeline,
        &["date", "deadline", "timeline", "when"],
    ),
];

/// Every intent whose rule matches, in rule order.
pub fn detected_intents(query: &str) -> Vec<QueryIntent> {
    let lower = query.to_lowercase();
    INTENT_RULES
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(intent, _)| *intent)
        .collect()
}

/// The first matching rule's intent, or `General`.
pub fn classify_query(query: &str) -> QueryIntent {
    detected_intents(query)
        .into_iter()
        .next()
        .unwrap_or(QueryIntent::General)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_queries_are_general() {
        assert_eq!(classify_query("hello there"), QueryIntent::General);
        assert!(detected_intents("").is_empty());
    }

    #[test]
    fn rule_order_breaks_ties() {
        // Matches both obligation ("must") and financial ("payment").
        let query = "When must the payment be made?";
        assert_eq!(
            detected_intents(query),
            vec![
                QueryIntent::Obligation,
                QueryIntent::Financial,
                QueryIntent::Timeline
            ]
        );
        assert_eq!(classify_query(query), QueryIntent::Obligation);
    }

    #[test]
    fn matching_is_case_insensitive_substring() {
        assert_eq!(classify_query("Can I TERMINATE early?"), QueryIntent::Termination);
        assert_eq!(classify_query("Is there an NDA?"), QueryIntent::Confidentiality);
    }

    #[test]
    fn every_intent_except_general_has_a_rule() {
        let ruled: Vec<QueryIntent> = INTENT_RULES.iter().map(|(i, _)| *i).collect();
        assert_eq!(ruled.len(), 7);
        assert!(!ruled.contains(&QueryIntent::General));
    }
}
