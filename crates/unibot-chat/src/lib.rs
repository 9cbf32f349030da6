//! Conversation handling for unibot.
//!
//! Classifies inbound messages against a hot-reloadable keyword set, routes
//! them to fixed replies, student records or the knowledge engine, and
//! returns a structured result for the channel and the conversation log.

pub mod error;
pub mod keywords;
pub mod pipeline;
pub mod router;
pub mod synthesizer;
pub mod types;

pub use error::ChatError;
pub use keywords::{KeywordConfig, KeywordSet, KeywordStore};
pub use pipeline::ConversationPipeline;
pub use router::{extract_question, route, topic_label, Intent, MessageRouter, Route};
pub use synthesizer::{RecordKind, ResponseSynthesizer};
pub use types::{Category, ContextMessage, ConversationResult, MessageType};
