//! Prompt Validator
//!
//! Cheap, synchronous gate that rejects input which is not a meaningful
//! question about the PMS domain before any LLM or database call.

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

pub const MIN_LENGTH: usize = 10;
const MAX_SYMBOL_RATIO: f64 = 0.25;
const MAX_DIGIT_RATIO: f64 = 0.4;
const MIN_WORDS: usize = 3;
const MIN_VOWEL_RATIO: f64 = 0.2;

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"[a-z]+").unwrap();
}

const ALLOWED_KEYWORDS: &[&str] = &[
    // entities
    "user", "users", "employee", "employees", "staff", "person", "people",
    "email", "mail", "phone", "mobile", "contact", "name", "names", "id",
    "ticket", "tickets", "fms", "workflow", "workflows", "task", "tasks",
    "recurring", "project", "projects", "department", "departments",
    "designation", "designations",
    // verbs
    "show", "list", "count", "find", "get", "give", "display",
    // status words
    "pending", "active", "inactive", "completed", "overdue", "done", "status",
    // question words
    "who", "how", "which", "what", "of",
];

const ENTITY_KEYWORDS: &[&str] = &[
    "user", "users", "employee", "employees", "staff", "person", "people",
    "ticket", "tickets", "task", "tasks", "department", "departments",
    "designation", "designations", "fms", "workflow", "workflows", "project",
    "projects", "email", "phone", "contact",
];

const VAGUE_PRONOUNS: &[&str] = &[
    "their", "them", "they", "it", "its", "this", "that", "these", "those", "his", "her",
];

/// Why a prompt was rejected. Rules are evaluated in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRejection {
    Empty,
    TooShort,
    NotReadable,
    TooManySpecialCharacters,
    TooManyNumbers,
    NotEnoughWords,
    RandomTyping,
    OutOfDomain,
    TooVague,
}

impl fmt::Display for PromptRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            PromptRejection::Empty => "Query is empty.",
            PromptRejection::TooShort => "Query is too short.",
            PromptRejection::NotReadable => "Query must contain readable text.",
            PromptRejection::TooManySpecialCharacters => "Too many special characters.",
            PromptRejection::TooManyNumbers => "Too many numbers.",
            PromptRejection::NotEnoughWords => "Not enough meaningful words.",
            PromptRejection::RandomTyping => "Looks like random typing.",
            PromptRejection::OutOfDomain => "Query not related to supported domain.",
            PromptRejection::TooVague => {
                "Query is too vague. Please specify what you want to query (e.g., users, tickets, tasks)."
            }
        };
        f.write_str(message)
    }
}

#[derive(Debug, Clone)]
pub struct PromptValidator {
    /// Rule 9, the vague-pronoun check. On by default.
    reject_vague: bool,
}

impl Default for PromptValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptValidator {
    pub fn new() -> Self {
        Self { reject_vague: true }
    }

    pub fn without_vagueness_check() -> Self {
        Self { reject_vague: false }
    }

    /// `(is_valid, reason)` form used by the orchestrator and the HTTP layer.
    pub fn validate(&self, text: &str) -> (bool, String) {
        match self.check(text) {
            Ok(()) => (true, "Query is meaningful.".to_string()),
            Err(rejection) => (false, rejection.to_string()),
        }
    }

    pub fn check(&self, text: &str) -> Result<(), PromptRejection> {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return Err(PromptRejection::Empty);
        }

        let total = text.chars().count();
        if total < MIN_LENGTH {
            return Err(PromptRejection::TooShort);
        }

        if !text.chars().any(|c| c.is_ascii_alphabetic()) {
            return Err(PromptRejection::NotReadable);
        }

        let symbols = text
            .chars()
            .filter(|c| !c.is_ascii_alphanumeric() && !c.is_whitespace())
            .count();
        if symbols as f64 / total as f64 > MAX_SYMBOL_RATIO {
            return Err(PromptRejection::TooManySpecialCharacters);
        }

        let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
        if digits as f64 / total as f64 > MAX_DIGIT_RATIO {
            return Err(PromptRejection::TooManyNumbers);
        }

        let words: Vec<&str> = WORD_RE.find_iter(&text).map(|m| m.as_str()).collect();
        if words.len() < MIN_WORDS {
            return Err(PromptRejection::NotEnoughWords);
        }

        let letters: usize = words.iter().map(|w| w.len()).sum();
        let vowels = words
            .iter()
            .flat_map(|w| w.chars())
            .filter(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
            .count();
        if letters > 0 && (vowels as f64 / letters as f64) < MIN_VOWEL_RATIO {
            return Err(PromptRejection::RandomTyping);
        }

        if !words.iter().any(|w| ALLOWED_KEYWORDS.contains(w)) {
            return Err(PromptRejection::OutOfDomain);
        }

        if self.reject_vague {
            let has_vague_pronoun = words.iter().any(|w| VAGUE_PRONOUNS.contains(w));
            let has_entity = words.iter().any(|w| ENTITY_KEYWORDS.contains(w));
            if has_vague_pronoun && !has_entity {
                return Err(PromptRejection::TooVague);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(text: &str) -> Result<(), PromptRejection> {
        PromptValidator::new().check(text)
    }

    #[test]
    fn test_everything_under_min_length_is_too_short() {
        for text in ["a", "show", "list user", "who is x"] {
            assert_eq!(check(text), Err(PromptRejection::TooShort), "{}", text);
        }
        assert_eq!(check("   \t "), Err(PromptRejection::Empty));
    }

    #[test]
    fn test_rules_in_order() {
        assert_eq!(check("1234567890 42"), Err(PromptRejection::NotReadable));
        assert_eq!(check("asdf1234!!!"), Err(PromptRejection::TooManySpecialCharacters));
        assert_eq!(check("users 12345 67890"), Err(PromptRejection::TooManyNumbers));
        assert_eq!(check("show users please"), Ok(()));
        assert_eq!(check("tickets pending"), Err(PromptRejection::NotEnoughWords));
        assert_eq!(check("qwrt zxcv bnmk tsks"), Err(PromptRejection::RandomTyping));
        assert_eq!(check("tell me the weather in paris"), Err(PromptRejection::OutOfDomain));
    }

    #[test]
    fn test_vague_pronoun_without_entity() {
        assert_eq!(check("show me all of their stuff"), Err(PromptRejection::TooVague));
        assert_eq!(check("show me all of their tickets"), Ok(()));
        assert_eq!(
            PromptValidator::without_vagueness_check().check("show me all of their stuff"),
            Ok(())
        );
    }

    #[test]
    fn test_domain_question_passes() {
        let (valid, reason) =
            PromptValidator::new().validate("How many help tickets are pending by all users, give names");
        assert!(valid, "{}", reason);
    }
}
