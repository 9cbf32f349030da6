//! Text generation boundary.
//!
//! Two call sites use a generator: grounded FAQ synthesis in the knowledge
//! engine and structured-record formatting in the response synthesizer. Each
//! owns its own prompt and its own failure handling.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, UnibotError};

/// Completes a fully rendered prompt into response text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Deterministic generator that returns a fixed reply and records prompts.
#[derive(Debug)]
pub struct MockGenerator {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::with_reply("Here is the information you asked for.")
    }

    pub fn with_reply(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .map_err(|e| UnibotError::Generation(format!("Lock poisoned: {}", e)))?
            .push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

/// Generator that always fails, for exercising fallback paths.
#[derive(Debug, Clone, Default)]
pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(UnibotError::Generation("generator unavailable".to_string()))
    }
}
