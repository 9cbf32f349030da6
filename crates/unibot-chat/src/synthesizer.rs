//! Reply texts for each route.
//!
//! Small-talk and policy routes use fixed texts. Student records are turned
//! into prose by a generation call that only sees the question, the
//! salutation and the record; FAQ answers are labelled by their confidence.

use std::sync::Arc;

use rand::seq::IndexedRandom;
use serde::Serialize;
use tracing::{debug, warn};

use unibot_core::generation::TextGenerator;
use unibot_core::types::{AcademicSet, InvoiceSet};
use unibot_vector::knowledge::KnowledgeAnswer;

use crate::error::ChatError;
use crate::types::{Category, ConversationResult, MessageType};

/// FAQ answers at or above this confidence are used as-is.
pub const ANSWER_THRESHOLD: f64 = 0.65;

/// FAQ answers at or above this confidence are labelled high confidence.
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.75;

pub const INVOICE_SOURCE: &str = "Student Invoice Database";
pub const ACADEMIC_SOURCE: &str = "Student Academic Database";

const LOW_CONFIDENCE_HINT: &str =
    "\n\nIf this doesn't fully answer your question, please provide more details or contact support.";

const GREETING_TEMPLATES: [&str; 3] = [
    "{salutation}, hello! How can I assist you today?",
    "Hi {salutation}! I'm here to help with your queries.",
    "Greetings {salutation}! What can I do for you?",
];

const ACKNOWLEDGMENT_TEMPLATES: [&str; 3] = [
    "{salutation}, glad I could help! Do you have any other questions?",
    "You're welcome {salutation}! Feel free to ask if you need anything else.",
    "{salutation}, happy to assist! Let me know if there's anything more.",
];

/// Which student record a fees/academic route is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Invoice,
    Academic,
}

impl RecordKind {
    fn category(self) -> Category {
        match self {
            RecordKind::Invoice => Category::Fees,
            RecordKind::Academic => Category::Academic,
        }
    }

    fn general_type(self) -> MessageType {
        match self {
            RecordKind::Invoice => MessageType::FeesGeneral,
            RecordKind::Academic => MessageType::AcademicGeneral,
        }
    }

    fn not_found_text(self, salutation: &str) -> String {
        match self {
            RecordKind::Invoice => format!(
                "{salutation}, I couldn't find invoice details for your account. \
                 Please provide your application number or contact finance support."
            ),
            RecordKind::Academic => format!(
                "{salutation}, I couldn't find academic data for your account. \
                 Please provide your application number."
            ),
        }
    }
}

fn fill(template: &str, salutation: &str) -> String {
    template.replace("{salutation}", salutation)
}

fn pick(templates: &[&str], salutation: &str) -> String {
    let template = templates
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(templates[0]);
    fill(template, salutation)
}

/// Prompt for turning invoice data into a reply.
pub fn invoice_prompt(question: &str, salutation: &str, data: &str) -> String {
    format!(
        "You are a helpful university assistant. \n\n\
         Student asked: {question}\n\n\
         Invoice Data:\n{data}\n\n\
         Generate a clear, professional response addressing their question using the invoice data.\n\
         Address them as {salutation}.\n\
         Format amounts in currency.\n\
         Be concise but complete.\n\n\
         Response:"
    )
}

/// Prompt for turning course data into a reply.
pub fn academic_prompt(question: &str, salutation: &str, data: &str) -> String {
    format!(
        "You are a helpful university assistant. \n\n\
         Student asked: {question}\n\n\
         Academic Data:\n{data}\n\n\
         Generate a clear, professional response addressing their question using the academic data.\n\
         Address them as {salutation}.\n\
         Use bullet points for clarity.\n\
         Be concise but complete.\n\n\
         Response:"
    )
}

/// Builds [`ConversationResult`]s for every route.
#[derive(Clone)]
pub struct ResponseSynthesizer {
    generator: Arc<dyn TextGenerator>,
}

impl std::fmt::Debug for ResponseSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSynthesizer").finish_non_exhaustive()
    }
}

impl ResponseSynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    // ---- Fixed texts ----

    pub fn greeting(&self, salutation: &str) -> ConversationResult {
        ConversationResult::canned(
            pick(&GREETING_TEMPLATES, salutation),
            MessageType::Greeting,
            Category::Greeting,
        )
    }

    pub fn acknowledgment(&self, salutation: &str) -> ConversationResult {
        ConversationResult::canned(
            pick(&ACKNOWLEDGMENT_TEMPLATES, salutation),
            MessageType::Acknowledgment,
            Category::PostInteraction,
        )
    }

    /// Undertaking-letter menu; the student is expected to reply 1 or 2.
    pub fn paypal(&self, salutation: &str) -> ConversationResult {
        let text = format!(
            "{salutation}, to proceed with PayPal payment, reply with:\n\n\
             1 - I already have the undertaking letter\n\
             2 - Send me the undertaking letter template\n\n\
             Please reply with 1 or 2."
        );
        ConversationResult {
            requires_followup: true,
            ..ConversationResult::canned(text, MessageType::PaypalQuery, Category::Payment)
        }
    }

    /// E-Journal contact details, followed by the FAQ answer when it is
    /// confident enough.
    pub fn publication(&self, salutation: &str, faq: &KnowledgeAnswer) -> ConversationResult {
        let mut text = format!(
            "{salutation}, for queries related to publications or research articles, \
             please contact our E-Journal Executive:\n\n\
             📧 Email: sabitha.k@tauedu.org or ejournal.assist@tau.edu.gy\n\
             📱 WhatsApp:\n  \
             • Public Health, Management: +91 7397735325\n  \
             • Academic Research, Medicine: +91 9500108397"
        );
        let mut sources = Vec::new();
        if faq.confidence >= ANSWER_THRESHOLD {
            text.push_str("\n\n");
            text.push_str(&faq.answer);
            sources = faq.sources.clone();
        }
        ConversationResult {
            sources,
            ..ConversationResult::canned(text, MessageType::PublicationQuery, Category::Publication)
        }
    }

    pub fn remittance(&self, salutation: &str) -> ConversationResult {
        let text = format!(
            "{salutation}, thank you for sharing the remittance copy. I will forward it to our \
             Finance team for verification and mapping. You can check the status in the CMS \
             portal within 3-10 business days."
        );
        ConversationResult::canned(text, MessageType::RemittanceConfirmation, Category::Finance)
    }

    // ---- Student records ----

    /// Describe the student's invoices. Falls back to a summary text when
    /// generation fails; the reply never comes back empty.
    pub async fn invoice_response(
        &self,
        question: &str,
        salutation: &str,
        invoices: &InvoiceSet,
    ) -> ConversationResult {
        let text = match self
            .format_record(invoices, |data| invoice_prompt(question, salutation, data))
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Invoice formatting failed; using summary");
                format!(
                    "{salutation}, I found {} invoice(s) on your account with a total balance of \
                     {:.2} and {:.2} paid, but I couldn't prepare the full details right now. \
                     Please check the CMS portal or contact finance support.",
                    invoices.invoice_count, invoices.total_balance, invoices.total_paid
                )
            }
        };
        ConversationResult {
            sources: vec![INVOICE_SOURCE.to_string()],
            ..ConversationResult::canned(text, MessageType::InvoiceResponse, Category::Fees)
        }
    }

    /// Describe the student's courses, with the same fallback policy as
    /// [`invoice_response`](Self::invoice_response).
    pub async fn academic_response(
        &self,
        question: &str,
        salutation: &str,
        academic: &AcademicSet,
    ) -> ConversationResult {
        let text = match self
            .format_record(academic, |data| academic_prompt(question, salutation, data))
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Academic formatting failed; using summary");
                format!(
                    "{salutation}, I found {} course(s) on your record ({} completed, {} in \
                     progress), but I couldn't prepare the full details right now. Please check \
                     the LMS portal or try again later.",
                    academic.total_courses, academic.completed_courses, academic.in_progress
                )
            }
        };
        ConversationResult {
            sources: vec![ACADEMIC_SOURCE.to_string()],
            ..ConversationResult::canned(text, MessageType::AcademicResponse, Category::Academic)
        }
    }

    async fn format_record<T, F>(&self, record: &T, prompt: F) -> Result<String, ChatError>
    where
        T: Serialize + Sync,
        F: FnOnce(&str) -> String,
    {
        let data = serde_json::to_string_pretty(record)
            .map_err(|e| ChatError::Generation(format!("Failed to serialize record: {}", e)))?;
        let text = self.generator.generate(&prompt(&data)).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Generation("Generator returned empty text".to_string()));
        }
        debug!(chars = text.len(), "Record formatted");
        Ok(text.to_string())
    }

    /// Reply for a fees/academic question with no usable record: the FAQ
    /// answer when confident enough, otherwise the record-not-found text.
    pub fn record_fallback(
        &self,
        kind: RecordKind,
        salutation: &str,
        faq: KnowledgeAnswer,
    ) -> ConversationResult {
        if faq.confidence >= ANSWER_THRESHOLD {
            return ConversationResult {
                response: faq.answer,
                message_type: kind.general_type(),
                confidence: faq.confidence,
                sources: faq.sources,
                category: kind.category(),
                requires_followup: false,
            };
        }
        ConversationResult {
            response: kind.not_found_text(salutation),
            message_type: MessageType::DataNotFound,
            confidence: faq.confidence,
            sources: Vec::new(),
            category: kind.category(),
            requires_followup: false,
        }
    }

    // ---- FAQ ----

    /// Label an FAQ answer by confidence, appending the hint to weak ones.
    pub fn faq_result(&self, faq: KnowledgeAnswer) -> ConversationResult {
        let (message_type, response) = if faq.confidence >= HIGH_CONFIDENCE_THRESHOLD {
            (MessageType::FaqAnswerHighConfidence, faq.answer)
        } else if faq.confidence >= ANSWER_THRESHOLD {
            (MessageType::FaqAnswer, faq.answer)
        } else {
            (
                MessageType::LowConfidenceAnswer,
                format!("{}{}", faq.answer, LOW_CONFIDENCE_HINT),
            )
        };
        ConversationResult {
            response,
            message_type,
            confidence: faq.confidence,
            sources: faq.sources,
            category: Category::General,
            requires_followup: false,
        }
    }

    /// Generic reply for a turn that failed.
    pub fn error_result(&self, salutation: &str) -> ConversationResult {
        ConversationResult {
            confidence: 0.0,
            ..ConversationResult::canned(
                format!("{salutation}, I encountered an error. Please try again."),
                MessageType::Error,
                Category::Error,
            )
        }
    }
}
