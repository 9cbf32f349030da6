//! Messaging channel boundary.
//!
//! A worker owns one [`ChannelAdapter`] for its whole life: it connects once,
//! polls for unread chats, sends replies and disconnects on shutdown. The
//! [`ChannelFactory`] lets the manager build a fresh adapter on every start.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use unibot_chat::types::ContextMessage;
use unibot_core::config::BotConfig;
use unibot_core::error::{Result, UnibotError};

/// One unread chat as reported by the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub text: String,
    /// Channel-level contact handle (phone number or chat name).
    pub contact_id: String,
    pub contact_display_name: String,
    /// Earlier messages in the chat, oldest first.
    #[serde(default)]
    pub recent_context: Vec<ContextMessage>,
}

impl InboundEvent {
    pub fn new(text: &str, contact_id: &str, display_name: &str) -> Self {
        Self {
            text: text.to_string(),
            contact_id: contact_id.to_string(),
            contact_display_name: display_name.to_string(),
            recent_context: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: Vec<ContextMessage>) -> Self {
        self.recent_context = context;
        self
    }
}

/// A messaging surface a bot can read from and reply on.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    async fn connect(&mut self) -> Result<()>;

    /// Unread messages since the last poll; empty when there are none.
    async fn poll_unread(&mut self) -> Result<Vec<InboundEvent>>;

    /// Send `text` to a contact. Line breaks are preserved.
    async fn send(&mut self, contact_id: &str, text: &str) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;
}

/// Builds the channel adapter for a bot identity.
pub trait ChannelFactory: Send + Sync {
    fn create(&self, bot: &BotConfig) -> Box<dyn ChannelAdapter>;
}

impl<F> ChannelFactory for F
where
    F: Fn(&BotConfig) -> Box<dyn ChannelAdapter> + Send + Sync,
{
    fn create(&self, bot: &BotConfig) -> Box<dyn ChannelAdapter> {
        self(bot)
    }
}

// ---------------------------------------------------------------------------
// IdleChannel
// ---------------------------------------------------------------------------

/// Adapter that connects and never reports a message.
#[derive(Debug, Clone, Default)]
pub struct IdleChannel {
    name: String,
}

impl IdleChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl ChannelAdapter for IdleChannel {
    async fn connect(&mut self) -> Result<()> {
        debug!(channel = %self.name, "Idle channel connected");
        Ok(())
    }

    async fn poll_unread(&mut self) -> Result<Vec<InboundEvent>> {
        Ok(Vec::new())
    }

    async fn send(&mut self, contact_id: &str, text: &str) -> Result<()> {
        debug!(channel = %self.name, contact = contact_id, chars = text.len(), "Idle channel dropped message");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedChannel
// ---------------------------------------------------------------------------

/// A message the scripted channel was asked to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub contact_id: String,
    pub text: String,
}

/// Shared view of what a [`ScriptedChannel`] sent, usable after the channel
/// has been moved into a worker.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    disconnected: Arc<Mutex<bool>>,
}

impl Outbox {
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn was_disconnected(&self) -> bool {
        self.disconnected.lock().map(|d| *d).unwrap_or(false)
    }
}

/// In-memory adapter that replays scripted batches of unread messages.
///
/// Each poll returns the next batch; once the script is exhausted polls
/// return nothing. Failure and stall switches exercise worker fault paths.
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    batches: VecDeque<Vec<InboundEvent>>,
    outbox: Outbox,
    fail_connect: bool,
    fail_send: bool,
    fail_poll_when_empty: bool,
    panic_poll_when_empty: bool,
    stall_when_empty: Option<Duration>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one poll's worth of messages.
    pub fn with_batch(mut self, events: Vec<InboundEvent>) -> Self {
        self.batches.push_back(events);
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_send(mut self) -> Self {
        self.fail_send = true;
        self
    }

    /// Return an error from the first poll after the script runs out.
    pub fn failing_poll_when_empty(mut self) -> Self {
        self.fail_poll_when_empty = true;
        self
    }

    /// Panic in the first poll after the script runs out.
    pub fn panicking_poll_when_empty(mut self) -> Self {
        self.panic_poll_when_empty = true;
        self
    }

    /// Block each poll after the script runs out for `duration`, ignoring
    /// cancellation.
    pub fn stalling_when_empty(mut self, duration: Duration) -> Self {
        self.stall_when_empty = Some(duration);
        self
    }

    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }
}

#[async_trait]
impl ChannelAdapter for ScriptedChannel {
    async fn connect(&mut self) -> Result<()> {
        if self.fail_connect {
            return Err(UnibotError::Channel("scripted connect failure".to_string()));
        }
        Ok(())
    }

    async fn poll_unread(&mut self) -> Result<Vec<InboundEvent>> {
        if let Some(batch) = self.batches.pop_front() {
            return Ok(batch);
        }
        if self.panic_poll_when_empty {
            panic!("scripted poll panic");
        }
        if self.fail_poll_when_empty {
            return Err(UnibotError::Channel("scripted poll failure".to_string()));
        }
        if let Some(duration) = self.stall_when_empty {
            tokio::time::sleep(duration).await;
        }
        Ok(Vec::new())
    }

    async fn send(&mut self, contact_id: &str, text: &str) -> Result<()> {
        if self.fail_send {
            return Err(UnibotError::Channel("scripted send failure".to_string()));
        }
        let mut sent = self
            .outbox
            .sent
            .lock()
            .map_err(|e| UnibotError::Channel(format!("Lock poisoned: {}", e)))?;
        sent.push(SentMessage {
            contact_id: contact_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Ok(mut flag) = self.outbox.disconnected.lock() {
            *flag = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_batches_in_order() {
        let mut channel = ScriptedChannel::new()
            .with_batch(vec![InboundEvent::new("hi", "c1", "Jamie")])
            .with_batch(vec![
                InboundEvent::new("one", "c2", "Sam"),
                InboundEvent::new("two", "c3", "Ade"),
            ]);
        channel.connect().await.unwrap();
        assert_eq!(channel.poll_unread().await.unwrap().len(), 1);
        assert_eq!(channel.poll_unread().await.unwrap().len(), 2);
        assert!(channel.poll_unread().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outbox_preserves_line_breaks() {
        let mut channel = ScriptedChannel::new();
        let outbox = channel.outbox();
        channel.send("c1", "line one\n\nline two").await.unwrap();
        channel.disconnect().await.unwrap();
        assert_eq!(outbox.sent()[0].text, "line one\n\nline two");
        assert!(outbox.was_disconnected());
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let mut channel = ScriptedChannel::new()
            .failing_connect()
            .failing_send()
            .failing_poll_when_empty();
        assert!(channel.connect().await.is_err());
        assert!(channel.send("c1", "x").await.is_err());
        assert!(channel.poll_unread().await.is_err());
        assert!(channel.outbox().is_empty());
    }

    #[tokio::test]
    async fn test_idle_channel_is_quiet() {
        let mut channel = IdleChannel::new("Bot_Secondary");
        channel.connect().await.unwrap();
        assert!(channel.poll_unread().await.unwrap().is_empty());
        channel.send("c1", "ignored").await.unwrap();
    }

    #[test]
    fn test_closure_factory() {
        let factory = |_: &BotConfig| -> Box<dyn ChannelAdapter> { Box::new(IdleChannel::default()) };
        let bot = BotConfig {
            name: "Bot_Primary".to_string(),
            user_data_path: String::new(),
            enabled: true,
        };
        let _channel = factory.create(&bot);
    }
}
