//! Message classification.
//!
//! A fixed-priority rule chain over the active keyword set; the first rule
//! that matches decides the route. All matching is case-insensitive
//! substring containment, with no stemming or fuzzy matching.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;

use crate::keywords::{self, KeywordSet, KeywordStore};

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());

/// Messages with more tokens than this are never small talk.
const SMALL_TALK_MAX_WORDS: usize = 3;

/// Where a message is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Acknowledgment,
    PayPal,
    Publication,
    Remittance,
    /// Student-specific question about fees or invoices.
    Fees,
    /// Student-specific question about courses and grades.
    Academic,
    /// Student-specific wording with neither sub-intent: FAQ on the extracted
    /// question without conversation context.
    StudentFaq,
    /// Everything else: FAQ with the recent conversation prepended.
    GeneralFaq,
}

/// Classification result: the intent plus the question text to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub intent: Intent,
    /// Trimmed message for most routes; the extracted question for the
    /// student-specific ones.
    pub question: String,
}

/// Classify one message against a keyword set.
pub fn route(message: &str, keywords: &KeywordSet) -> Route {
    let trimmed = message.trim();
    let lowered = trimmed.to_lowercase();
    let plain = |intent| Route {
        intent,
        question: trimmed.to_string(),
    };

    if is_pure_greeting(&lowered, keywords) {
        return plain(Intent::Greeting);
    }
    if is_acknowledgment(&lowered, keywords) {
        return plain(Intent::Acknowledgment);
    }
    if keywords.matches(keywords::PAYPAL, &lowered) {
        return plain(Intent::PayPal);
    }
    if keywords.matches(keywords::PUBLICATIONS, &lowered) {
        return plain(Intent::Publication);
    }
    if keywords.matches(keywords::REMITTANCE, &lowered) {
        return plain(Intent::Remittance);
    }

    if keywords.matches(keywords::STUDENT_SPECIFIC, &lowered) {
        let question = extract_question(trimmed, keywords);
        let question_lowered = question.to_lowercase();
        let intent = if keywords.matches(keywords::FEES, &question_lowered) {
            Intent::Fees
        } else if keywords.matches(keywords::ACADEMIC, &question_lowered) {
            Intent::Academic
        } else {
            Intent::StudentFaq
        };
        return Route { intent, question };
    }

    plain(Intent::GeneralFaq)
}

fn is_pure_greeting(lowered: &str, keywords: &KeywordSet) -> bool {
    WORD_RE.find_iter(lowered).count() <= SMALL_TALK_MAX_WORDS
        && keywords.matches(keywords::GREETINGS, lowered)
        && !lowered.contains('?')
}

fn is_acknowledgment(lowered: &str, keywords: &KeywordSet) -> bool {
    lowered.split_whitespace().count() <= SMALL_TALK_MAX_WORDS
        && keywords.matches(keywords::ACKNOWLEDGMENTS, lowered)
}

/// Strip a leading greeting prefix and embedded honorifics, then collapse
/// whitespace. Returns the trimmed original when nothing would remain.
///
/// Stripping repeats until the text stops changing, so applying this to its
/// own output is a no-op.
pub fn extract_question(message: &str, keywords: &KeywordSet) -> String {
    let original = message.trim();
    let mut current = collapse_whitespace(original);

    loop {
        let next = strip_once(&current, keywords);
        if next.is_empty() {
            return original.to_string();
        }
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_once(text: &str, keywords: &KeywordSet) -> String {
    let without_prefix = match keywords.prefix_pattern() {
        Some(re) => re.replace(text, "").into_owned(),
        None => text.to_string(),
    };
    let without_salutations = match keywords.salutation_pattern() {
        Some(re) => re.replace_all(&without_prefix, " ").into_owned(),
        None => without_prefix,
    };
    collapse_whitespace(&without_salutations)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Coarse topic for analytics. Unlike [`route`], topical keywords take
/// precedence over greeting and acknowledgment phrases.
pub fn topic_label(message: &str, keywords: &KeywordSet) -> &'static str {
    let lowered = message.trim().to_lowercase();
    let checks = [
        (keywords::PAYPAL, "payment"),
        (keywords::PUBLICATIONS, "publication"),
        (keywords::REMITTANCE, "remittance"),
        (keywords::FEES, "fees"),
        (keywords::ACADEMIC, "academic"),
        (keywords::GREETINGS, "greeting"),
        (keywords::ACKNOWLEDGMENTS, "acknowledgment"),
    ];
    checks
        .iter()
        .find(|(category, _)| keywords.matches(category, &lowered))
        .map(|(_, label)| *label)
        .unwrap_or("general")
}

/// Router bound to a hot-reloadable keyword store. Each call classifies
/// against one consistent snapshot of the keywords.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    store: Arc<KeywordStore>,
}

impl MessageRouter {
    pub fn new(store: Arc<KeywordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<KeywordStore> {
        &self.store
    }

    pub fn route(&self, message: &str) -> Route {
        route(message, &self.store.snapshot())
    }

    pub fn extract_question(&self, message: &str) -> String {
        extract_question(message, &self.store.snapshot())
    }

    pub fn topic_label(&self, message: &str) -> &'static str {
        topic_label(message, &self.store.snapshot())
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new(Arc::new(KeywordStore::with_defaults()))
    }
}
