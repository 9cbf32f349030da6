//! Record shapes shared between the pipeline, the workers and storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Salutation used when a contact has no stored preference.
pub const DEFAULT_SALUTATION: &str = "Student";

/// Maximum stored length of a received message or bot response.
pub const MAX_LOGGED_MESSAGE_CHARS: usize = 1000;

/// Maximum stored length of the comma-joined FAQ source list.
pub const MAX_LOGGED_FAQ_CHARS: usize = 500;

// =============================================================================
// Student projections
// =============================================================================

/// Contact profile resolved from the student directory.
///
/// An unknown contact is represented by [`StudentProfile::unknown`] rather
/// than an error: empty application number, default salutation and the
/// display name the channel reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub application_number: String,
    pub salutation: String,
    pub full_name: String,
    pub email: String,
    pub program: String,
    pub status: String,
}

impl StudentProfile {
    /// The empty sentinel for a contact with no directory entry.
    pub fn unknown(display_name: &str) -> Self {
        Self {
            application_number: String::new(),
            salutation: DEFAULT_SALUTATION.to_string(),
            full_name: display_name.to_string(),
            email: String::new(),
            program: String::new(),
            status: String::new(),
        }
    }

    /// True when the profile carries an application number.
    pub fn is_known(&self) -> bool {
        !self.application_number.trim().is_empty()
    }
}

/// One invoice line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_number: String,
    pub invoice_date: String,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub balance_amount: f64,
    pub due_date: String,
    pub status: String,
    pub payment_method: String,
}

/// Recent invoices for one student with summary totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSet {
    pub invoices: Vec<Invoice>,
    pub total_balance: f64,
    pub total_paid: f64,
    pub invoice_count: usize,
}

impl InvoiceSet {
    /// Build the set and its totals. Returns `None` for an empty list so that
    /// "no invoices" and "no record" are the same thing downstream.
    pub fn from_invoices(invoices: Vec<Invoice>) -> Option<Self> {
        if invoices.is_empty() {
            return None;
        }
        let total_balance = invoices.iter().map(|i| i.balance_amount).sum();
        let total_paid = invoices.iter().map(|i| i.paid_amount).sum();
        Some(Self {
            invoice_count: invoices.len(),
            invoices,
            total_balance,
            total_paid,
        })
    }
}

/// One course enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub course_name: String,
    pub course_code: String,
    pub enrollment_date: String,
    pub status: String,
    pub grade: Option<String>,
    pub credits: Option<f64>,
    pub mentor: Option<String>,
}

/// Course list for one student with completion counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcademicSet {
    pub courses: Vec<Course>,
    pub total_courses: usize,
    pub completed_courses: usize,
    pub in_progress: usize,
}

impl AcademicSet {
    /// Build the set and its counts; `None` when there are no courses.
    pub fn from_courses(courses: Vec<Course>) -> Option<Self> {
        if courses.is_empty() {
            return None;
        }
        let completed_courses = courses.iter().filter(|c| c.status == "Completed").count();
        let in_progress = courses.iter().filter(|c| c.status == "In Progress").count();
        Some(Self {
            total_courses: courses.len(),
            courses,
            completed_courses,
            in_progress,
        })
    }
}

// =============================================================================
// Conversation log
// =============================================================================

/// One answered (or onboarding) turn, as handed to the conversation logger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurnRecord {
    /// The chat contact the turn happened with.
    pub contact_id: String,
    /// Empty for contacts that are not yet linked to a student record.
    #[serde(default)]
    pub application_number: String,
    pub display_name: String,
    pub received_message: String,
    pub response: String,
    pub message_type: String,
    pub media_type: String,
    pub category: String,
    pub confidence: f64,
    /// Comma-joined source questions.
    pub faq_question: String,
    pub bot_name: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurnRecord {
    /// Copy of the record with text fields cut to their storage limits.
    pub fn truncated(&self) -> Self {
        Self {
            received_message: truncate_chars(&self.received_message, MAX_LOGGED_MESSAGE_CHARS),
            response: truncate_chars(&self.response, MAX_LOGGED_MESSAGE_CHARS),
            faq_question: truncate_chars(&self.faq_question, MAX_LOGGED_FAQ_CHARS),
            ..self.clone()
        }
    }
}

/// A previously logged exchange, newest first when listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub received_message: String,
    pub response: String,
    pub message_type: String,
    pub category: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
