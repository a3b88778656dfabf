//! Intent routing for free-text user input.

use std::sync::LazyLock;

use regex::Regex;

/// Identifier used when the input names no document.
pub const DEFAULT_DOCUMENT: &str = "the document";

/// First single- or double-quoted span, quotes matched pairwise.
static QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"'([^']*)'|"([^"]*)""#).expect("quoted-span pattern is valid")
});

/// What the user is asking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Suggest a next action from the user's context.
    ProactiveSuggestion,
    /// Review the identified document.
    DocumentReview { document: String },
    /// Nothing recognized; describe what the assistant can do.
    Fallback,
}

/// Maps user input to an intent.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Intent;
}

/// Routes any input mentioning "review" (case-insensitive) to a document
/// review; everything else falls back.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl IntentClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Intent {
        if text.to_lowercase().contains("review") {
            Intent::DocumentReview {
                document: extract_document_id(text),
            }
        } else {
            Intent::Fallback
        }
    }
}

/// The first quoted substring of `text`, or [`DEFAULT_DOCUMENT`] when there
/// is none (or it is blank).
pub fn extract_document_id(text: &str) -> String {
    QUOTED
        .captures(text)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_DOCUMENT.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_quoted_identifier() {
        assert_eq!(
            extract_document_id("Please review 'Q3 Budget Proposal' today"),
            "Q3 Budget Proposal"
        );
    }

    #[test]
    fn double_quoted_identifier() {
        assert_eq!(
            extract_document_id(r#"review "Launch Plan" and 'Other'"#),
            "Launch Plan"
        );
    }

    #[test]
    fn first_quote_wins() {
        assert_eq!(extract_document_id(r#"review 'A' then "B""#), "A");
    }

    #[test]
    fn no_quotes_falls_back() {
        assert_eq!(extract_document_id("review the attached file"), "the document");
    }

    #[test]
    fn unterminated_quote_falls_back() {
        assert_eq!(extract_document_id("review 'Q3 Budget"), "the document");
    }

    #[test]
    fn blank_quotes_fall_back() {
        assert_eq!(extract_document_id("review '  ' please"), "the document");
    }

    #[test]
    fn keyword_is_case_insensitive() {
        let classifier = KeywordClassifier;
        assert_eq!(
            classifier.classify("REVIEW 'Q3 Budget Proposal'"),
            Intent::DocumentReview {
                document: "Q3 Budget Proposal".into()
            }
        );
        assert_eq!(
            classifier.classify("Can you look over my Reviewed notes?"),
            Intent::DocumentReview {
                document: "the document".into()
            }
        );
    }

    #[test]
    fn other_input_falls_back() {
        let classifier = KeywordClassifier;
        assert_eq!(classifier.classify("what can you do?"), Intent::Fallback);
        assert_eq!(classifier.classify("suggest something"), Intent::Fallback);
    }
}
