//! Error types for the conversation pipeline.

use unibot_core::error::UnibotError;

/// Errors from keyword handling and turn processing.
///
/// None of these reach a channel user: the pipeline turns every error into
/// the generic error reply.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("keyword error: {0}")]
    Keywords(String),
    #[error("retrieval error: {0}")]
    Retrieval(String),
    #[error("generation error: {0}")]
    Generation(String),
    #[error("data access error: {0}")]
    DataAccess(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<UnibotError> for ChatError {
    fn from(err: UnibotError) -> Self {
        match err {
            UnibotError::Generation(msg) => ChatError::Generation(msg),
            UnibotError::Retrieval(msg) | UnibotError::Embedding(msg) => ChatError::Retrieval(msg),
            UnibotError::Io(e) => ChatError::Io(e),
            other => ChatError::DataAccess(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Keywords(err.to_string())
    }
}
