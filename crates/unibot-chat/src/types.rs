//! Result and context types for conversation turns.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Label describing which branch produced a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Greeting,
    Acknowledgment,
    PaypalQuery,
    PublicationQuery,
    RemittanceConfirmation,
    InvoiceResponse,
    AcademicResponse,
    FeesGeneral,
    AcademicGeneral,
    DataNotFound,
    FaqAnswerHighConfidence,
    FaqAnswer,
    LowConfidenceAnswer,
    UnsavedContactGreeting,
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Greeting => "greeting",
            MessageType::Acknowledgment => "acknowledgment",
            MessageType::PaypalQuery => "paypal_query",
            MessageType::PublicationQuery => "publication_query",
            MessageType::RemittanceConfirmation => "remittance_confirmation",
            MessageType::InvoiceResponse => "invoice_response",
            MessageType::AcademicResponse => "academic_response",
            MessageType::FeesGeneral => "fees_general",
            MessageType::AcademicGeneral => "academic_general",
            MessageType::DataNotFound => "data_not_found",
            MessageType::FaqAnswerHighConfidence => "faq_answer_high_confidence",
            MessageType::FaqAnswer => "faq_answer",
            MessageType::LowConfidenceAnswer => "low_confidence_answer",
            MessageType::UnsavedContactGreeting => "unsaved_contact_greeting",
            MessageType::Error => "error",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse topic recorded with every logged turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Greeting,
    PostInteraction,
    Payment,
    Publication,
    Finance,
    Fees,
    Academic,
    General,
    Applied,
    Error,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Greeting => "greeting",
            Category::PostInteraction => "post_interaction",
            Category::Payment => "payment",
            Category::Publication => "publication",
            Category::Finance => "finance",
            Category::Fees => "fees",
            Category::Academic => "academic",
            Category::General => "general",
            Category::Applied => "applied",
            Category::Error => "error",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured outcome of one conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationResult {
    pub response: String,
    pub message_type: MessageType,
    /// Heuristic score in `[0, 1]`.
    pub confidence: f64,
    pub sources: Vec<String>,
    pub category: Category,
    #[serde(default)]
    pub requires_followup: bool,
}

impl ConversationResult {
    /// A fixed-confidence reply with no sources.
    pub fn canned(response: String, message_type: MessageType, category: Category) -> Self {
        Self {
            response,
            message_type,
            confidence: 1.0,
            sources: Vec::new(),
            category,
            requires_followup: false,
        }
    }

    /// Sources joined for the conversation log.
    pub fn joined_sources(&self) -> String {
        self.sources.join(",")
    }
}

/// One earlier message in the chat, oldest first when passed as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub sender: String,
    pub message: String,
}

impl ContextMessage {
    pub fn new(sender: &str, message: &str) -> Self {
        Self {
            sender: sender.to_string(),
            message: message.to_string(),
        }
    }
}
