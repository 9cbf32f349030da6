//! The per-identity worker loop.
//!
//! Connect, then repeatedly poll for unread chats, answer each one through
//! the conversation pipeline and log the turn. Cancellation is checked at
//! every loop boundary and between messages; idle waits and send throttling
//! race against the token so a stop is seen immediately.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use unibot_chat::pipeline::ConversationPipeline;
use unibot_chat::types::{Category, ConversationResult, MessageType};
use unibot_core::config::WorkerConfig;
use unibot_core::directory::StudentDirectory;
use unibot_core::error::{Result, UnibotError};
use unibot_core::types::ConversationTurnRecord;

use crate::channel::{ChannelAdapter, InboundEvent};
use crate::contact::{contact_number, is_unsaved_contact, UNSAVED_CONTACT_GREETING};
use crate::manager::BotSlot;
use crate::record::{BotStatus, LogLevel};

/// Timing knobs for a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    /// Sleep between polls that found nothing.
    pub idle_interval: Duration,
    /// Outbound send budget.
    pub max_messages_per_minute: u32,
    /// Default bound for a graceful stop.
    pub stop_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            idle_interval: Duration::from_secs(config.idle_interval_secs),
            max_messages_per_minute: config.max_messages_per_minute,
            stop_timeout: Duration::from_secs(config.stop_timeout_secs),
        }
    }
}

/// Keeps sends at least `60s / n` apart.
#[derive(Debug)]
pub(crate) struct Throttle {
    spacing: Duration,
    last_send: Option<Instant>,
}

impl Throttle {
    pub(crate) fn per_minute(max_messages: u32) -> Self {
        Self {
            spacing: Duration::from_secs(60) / max_messages.max(1),
            last_send: None,
        }
    }

    /// Wait until the next send is allowed. Returns `false` if cancelled
    /// while waiting.
    pub(crate) async fn ready(&self, token: &CancellationToken) -> bool {
        let Some(last) = self.last_send else {
            return !token.is_cancelled();
        };
        let next = last + self.spacing;
        if Instant::now() >= next {
            return !token.is_cancelled();
        }
        tokio::select! {
            _ = token.cancelled() => false,
            _ = tokio::time::sleep_until(next) => true,
        }
    }

    pub(crate) fn record_send(&mut self) {
        self.last_send = Some(Instant::now());
    }
}

/// Collaborators shared by every worker.
#[derive(Clone)]
pub struct WorkerDeps {
    pub pipeline: Arc<ConversationPipeline>,
    pub directory: Arc<dyn StudentDirectory>,
    pub settings: WorkerSettings,
}

impl std::fmt::Debug for WorkerDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerDeps")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

pub(crate) struct BotWorker {
    identity: String,
    slot: Arc<BotSlot>,
    channel: Box<dyn ChannelAdapter>,
    deps: WorkerDeps,
    token: CancellationToken,
    throttle: Throttle,
}

impl BotWorker {
    pub(crate) fn new(
        identity: &str,
        slot: Arc<BotSlot>,
        channel: Box<dyn ChannelAdapter>,
        deps: WorkerDeps,
        token: CancellationToken,
    ) -> Self {
        let throttle = Throttle::per_minute(deps.settings.max_messages_per_minute);
        Self {
            identity: identity.to_string(),
            slot,
            channel,
            deps,
            token,
            throttle,
        }
    }

    /// Run until cancelled or until an unrecovered fault.
    pub(crate) async fn run(mut self) -> Result<()> {
        self.channel.connect().await?;
        if self.token.is_cancelled() {
            self.shutdown().await;
            return Ok(());
        }
        self.slot.with_record(|r| {
            r.transition(BotStatus::Running);
            r.detail = "Connected".to_string();
            r.push_log(LogLevel::Info, "Connected to channel");
        });
        info!(bot = %self.identity, "Bot running");

        let outcome = self.poll_loop().await;
        self.shutdown().await;
        outcome
    }

    async fn poll_loop(&mut self) -> Result<()> {
        while !self.token.is_cancelled() {
            let events = self.channel.poll_unread().await?;
            let unread = u32::try_from(events.len()).unwrap_or(u32::MAX);
            self.slot.with_record(|r| {
                r.unread_estimate = unread;
                r.detail = if unread == 0 {
                    "Idle - No unread messages".to_string()
                } else {
                    format!("Processing {} unread", unread)
                };
                r.last_activity = Some(Utc::now());
            });

            if events.is_empty() {
                tokio::select! {
                    _ = self.token.cancelled() => break,
                    _ = tokio::time::sleep(self.deps.settings.idle_interval) => {}
                }
                continue;
            }

            for event in events {
                if self.token.is_cancelled() {
                    break;
                }
                self.handle(event).await;
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.channel.disconnect().await {
            warn!(bot = %self.identity, error = %e, "Channel disconnect failed");
        }
        debug!(bot = %self.identity, "Worker exiting");
    }

    async fn handle(&mut self, event: InboundEvent) {
        let display_name = event.contact_display_name.trim().to_string();

        if is_unsaved_contact(&display_name) {
            self.greet_unsaved(&event, &display_name).await;
            return;
        }

        let profile = match self
            .deps
            .directory
            .lookup_profile(&event.contact_id, &display_name)
            .await
        {
            Ok(profile) => profile,
            Err(e) => {
                warn!(bot = %self.identity, contact = %display_name, error = %e, "Profile lookup failed");
                self.slot.with_record(|r| {
                    r.push_log(LogLevel::Warning, &format!("Profile lookup failed for {}", display_name))
                });
                return;
            }
        };

        if !profile.is_known() {
            info!(bot = %self.identity, contact = %display_name, "No application number; skipping");
            self.slot.with_record(|r| {
                r.push_log(LogLevel::Info, &format!("Skipped {}: no application number", display_name))
            });
            return;
        }

        let result = self
            .deps
            .pipeline
            .process(
                &event.text,
                &profile.application_number,
                &display_name,
                &profile.salutation,
                &event.recent_context,
            )
            .await;

        if !self.send(&event.contact_id, &result.response).await {
            return;
        }

        self.log_turn(
            &event.contact_id,
            &profile.application_number,
            &display_name,
            &event.text,
            &result,
        )
        .await;
        self.slot.with_record(|r| {
            r.record_processed();
            r.push_log(
                LogLevel::Success,
                &format!("Replied to {} ({})", display_name, result.message_type),
            );
        });
        info!(
            bot = %self.identity,
            contact = %display_name,
            message_type = %result.message_type,
            confidence = result.confidence,
            "Message answered"
        );
    }

    async fn greet_unsaved(&mut self, event: &InboundEvent, display_name: &str) {
        if !self.send(&event.contact_id, UNSAVED_CONTACT_GREETING).await {
            return;
        }
        let result = ConversationResult::canned(
            UNSAVED_CONTACT_GREETING.to_string(),
            MessageType::UnsavedContactGreeting,
            Category::Applied,
        );
        self.log_turn(&contact_number(display_name), "", display_name, "", &result)
            .await;
        self.slot.with_record(|r| {
            r.push_log(LogLevel::Info, &format!("Greeted unsaved contact {}", display_name))
        });
        info!(bot = %self.identity, contact = %display_name, "Unsaved contact greeted");
    }

    /// Throttled send. Returns whether the message went out.
    async fn send(&mut self, contact_id: &str, text: &str) -> bool {
        if !self.throttle.ready(&self.token).await {
            return false;
        }
        match self.channel.send(contact_id, text).await {
            Ok(()) => {
                self.throttle.record_send();
                true
            }
            Err(e) => {
                warn!(bot = %self.identity, contact = contact_id, error = %e, "Send failed");
                self.slot.with_record(|r| {
                    r.push_log(LogLevel::Error, &format!("Send to {} failed: {}", contact_id, e))
                });
                false
            }
        }
    }

    async fn log_turn(
        &self,
        contact_id: &str,
        application_number: &str,
        display_name: &str,
        received: &str,
        result: &ConversationResult,
    ) {
        let record = ConversationTurnRecord {
            contact_id: contact_id.to_string(),
            application_number: application_number.to_string(),
            display_name: display_name.to_string(),
            received_message: received.to_string(),
            response: result.response.clone(),
            message_type: result.message_type.to_string(),
            media_type: "text".to_string(),
            category: result.category.to_string(),
            confidence: result.confidence,
            faq_question: result.joined_sources(),
            bot_name: self.identity.clone(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.deps.directory.append_conversation_turn(&record).await {
            warn!(bot = %self.identity, error = %e, "Failed to log conversation turn");
        }
    }
}

/// Log text for a worker that exited with an error.
pub(crate) fn fault_reason(err: &UnibotError) -> String {
    format!("Worker fault: {}", err)
}
