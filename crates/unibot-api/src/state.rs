//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use unibot_bot::BotManager;
use unibot_chat::KeywordStore;
use unibot_core::config::{BotConfig, UnibotConfig};
use unibot_vector::KnowledgeEngine;

/// Shared application state. Cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<BotManager>,
    /// Configured identities; start/restart look their settings up here.
    pub bots: Arc<Vec<BotConfig>>,
    pub keywords: Arc<KeywordStore>,
    pub knowledge: Arc<KnowledgeEngine>,
    pub api_token: String,
    /// Port the server listens on, used for the CORS allow-list.
    pub port: u16,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: &UnibotConfig,
        manager: Arc<BotManager>,
        keywords: Arc<KeywordStore>,
        knowledge: Arc<KnowledgeEngine>,
        api_token: String,
    ) -> Self {
        Self {
            manager,
            bots: Arc::new(config.bots.clone()),
            keywords,
            knowledge,
            api_token,
            port: config.general.port,
            start_time: Instant::now(),
        }
    }

    /// Configuration for a named bot, if it is configured.
    pub fn bot_config(&self, id: &str) -> Option<&BotConfig> {
        self.bots.iter().find(|b| b.name == id)
    }
}
