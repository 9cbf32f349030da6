//! Console channel: drive a bot from stdin and print its replies.
//!
//! Lines are read by one background task for the life of the process, so a
//! bot bound to the console can be stopped and restarted without losing
//! input. Accepted line forms:
//!
//! - `Name <+15551234567>: message` comes from that contact number, shown as `Name`
//! - `Name: message` comes from contact `Name`
//! - anything else comes from the default console contact
//!
//! Student lookups match on the digits of the contact, so only the first
//! form reaches a student record.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use unibot_bot::{ChannelAdapter, InboundEvent};
use unibot_core::error::Result;

pub const CONSOLE_CONTACT: &str = "Console Student";

/// Shared receiving end of the stdin reader.
pub type ConsoleInput = Arc<Mutex<mpsc::UnboundedReceiver<String>>>;

/// Start reading stdin lines in the background.
pub fn spawn_stdin_reader() -> ConsoleInput {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
        debug!("stdin closed");
    });
    Arc::new(Mutex::new(rx))
}

/// Turn a console line into an inbound event. Blank lines yield nothing.
pub fn parse_line(line: &str) -> Option<InboundEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (sender, text) = match line.split_once(": ") {
        Some((sender, text)) if !sender.trim().is_empty() && !text.trim().is_empty() => {
            (sender.trim(), text.trim())
        }
        _ => return Some(InboundEvent::new(line, CONSOLE_CONTACT, CONSOLE_CONTACT)),
    };
    let (name, number) = split_sender(sender);
    Some(InboundEvent::new(text, number.unwrap_or(name), name))
}

/// `Name <number>` → (`Name`, Some(`number`)); anything else is a bare name.
fn split_sender(sender: &str) -> (&str, Option<&str>) {
    let Some(inner) = sender.strip_suffix('>') else {
        return (sender, None);
    };
    match inner.rsplit_once('<') {
        Some((name, number)) if !name.trim().is_empty() && !number.trim().is_empty() => {
            (name.trim(), Some(number.trim()))
        }
        _ => (sender, None),
    }
}

pub struct ConsoleChannel {
    bot: String,
    input: ConsoleInput,
}

impl ConsoleChannel {
    pub fn new(bot: &str, input: ConsoleInput) -> Self {
        Self {
            bot: bot.to_string(),
            input,
        }
    }
}

#[async_trait]
impl ChannelAdapter for ConsoleChannel {
    async fn connect(&mut self) -> Result<()> {
        info!(bot = %self.bot, "Console channel attached; type `Name <number>: message` to chat");
        Ok(())
    }

    async fn poll_unread(&mut self) -> Result<Vec<InboundEvent>> {
        let mut input = self.input.lock().await;
        let mut events = Vec::new();
        while let Ok(line) = input.try_recv() {
            events.extend(parse_line(&line));
        }
        Ok(events)
    }

    async fn send(&mut self, contact_id: &str, text: &str) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        let block = format!("[{} -> {}]\n{}\n\n", self.bot, contact_id, text);
        stdout.write_all(block.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        debug!(bot = %self.bot, "Console channel detached");
        Ok(())
    }
}
