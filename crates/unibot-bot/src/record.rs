//! Per-identity bookkeeping: status, counters and the bounded activity log.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Activity log entries kept per bot; older entries are evicted.
pub const MAX_LOG_ENTRIES: usize = 50;

/// Lifecycle state of one bot identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl BotStatus {
    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// `Error` is not terminal: the identity can be stopped or started again.
    pub fn can_transition_to(self, next: BotStatus) -> bool {
        use BotStatus::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Error, Starting)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Starting, Error)
                | (Running, Stopping)
                | (Running, Error)
                | (Stopping, Stopped)
                | (Error, Stopping)
                | (Error, Stopped)
        )
    }

    /// Starting, running or stopping.
    pub fn is_live(self) -> bool {
        matches!(self, BotStatus::Starting | BotStatus::Running | BotStatus::Stopping)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BotStatus::Stopped => "stopped",
            BotStatus::Starting => "starting",
            BotStatus::Running => "running",
            BotStatus::Stopping => "stopping",
            BotStatus::Error => "error",
        }
    }
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One line of the user-facing bot log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Mutable state of one bot identity.
#[derive(Debug, Clone)]
pub struct BotRecord {
    pub identity: String,
    pub status: BotStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub messages_processed: u64,
    pub last_activity: Option<DateTime<Utc>>,
    /// Free-form description of what the worker is doing.
    pub detail: String,
    pub unread_estimate: u32,
    pub last_error: Option<String>,
    log: VecDeque<LogEntry>,
}

impl BotRecord {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            status: BotStatus::Stopped,
            started_at: None,
            stopped_at: None,
            messages_processed: 0,
            last_activity: None,
            detail: String::new(),
            unread_estimate: 0,
            last_error: None,
            log: VecDeque::with_capacity(MAX_LOG_ENTRIES),
        }
    }

    /// Move to `next` if the state machine allows it. Returns whether the
    /// status changed.
    pub fn transition(&mut self, next: BotStatus) -> bool {
        if !self.status.can_transition_to(next) {
            debug!(bot = %self.identity, from = %self.status, to = %next, "Ignoring invalid transition");
            return false;
        }
        self.status = next;
        self.last_activity = Some(Utc::now());
        true
    }

    /// Reset counters and enter `Starting` for a fresh worker.
    pub(crate) fn begin_start(&mut self) {
        let now = Utc::now();
        self.status = BotStatus::Starting;
        self.started_at = Some(now);
        self.stopped_at = None;
        self.messages_processed = 0;
        self.last_activity = Some(now);
        self.detail = "Starting".to_string();
        self.unread_estimate = 0;
        self.last_error = None;
    }

    /// Enter `Stopped` after the worker has exited.
    pub(crate) fn mark_stopped(&mut self) {
        let now = Utc::now();
        self.status = BotStatus::Stopped;
        self.stopped_at = Some(now);
        self.last_activity = Some(now);
        self.detail = "Stopped".to_string();
        self.unread_estimate = 0;
    }

    /// Enter `Error` after an unrecovered worker fault.
    pub(crate) fn mark_failed(&mut self, reason: &str) {
        if self.transition(BotStatus::Error) {
            self.detail = "Error".to_string();
        }
        self.last_error = Some(reason.to_string());
        self.push_log(LogLevel::Error, reason);
    }

    /// Count one answered message. Returns the new total.
    pub fn record_processed(&mut self) -> u64 {
        self.messages_processed += 1;
        self.last_activity = Some(Utc::now());
        self.messages_processed
    }

    pub fn push_log(&mut self, level: LogLevel, message: &str) {
        if self.log.len() == MAX_LOG_ENTRIES {
            self.log.pop_front();
        }
        self.log.push_back(LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
        });
    }

    pub fn log(&self) -> impl Iterator<Item = &LogEntry> {
        self.log.iter()
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    pub fn snapshot(&self) -> BotSnapshot {
        let uptime_secs = match (self.status.is_live(), self.started_at) {
            (true, Some(started)) => Some((Utc::now() - started).num_seconds().max(0)),
            _ => None,
        };
        BotSnapshot {
            identity: self.identity.clone(),
            status: self.status,
            started_at: self.started_at,
            stopped_at: self.stopped_at,
            uptime_secs,
            messages_processed: self.messages_processed,
            last_activity: self.last_activity,
            detail: self.detail.clone(),
            unread_estimate: self.unread_estimate,
            last_error: self.last_error.clone(),
            log: self.log.iter().cloned().collect(),
        }
    }
}

/// Point-in-time copy of a [`BotRecord`], as served by the status API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotSnapshot {
    pub identity: String,
    pub status: BotStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub uptime_secs: Option<i64>,
    pub messages_processed: u64,
    pub last_activity: Option<DateTime<Utc>>,
    pub detail: String,
    pub unread_estimate: u32,
    pub last_error: Option<String>,
    pub log: Vec<LogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut record = BotRecord::new("Bot_Primary");
        assert_eq!(record.status, BotStatus::Stopped);
        assert!(record.transition(BotStatus::Starting));
        assert!(record.transition(BotStatus::Running));
        assert!(record.transition(BotStatus::Stopping));
        assert!(record.transition(BotStatus::Stopped));
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut record = BotRecord::new("Bot_Primary");
        assert!(!record.transition(BotStatus::Running));
        assert!(!record.transition(BotStatus::Error));
        assert_eq!(record.status, BotStatus::Stopped);

        assert!(!BotStatus::Running.can_transition_to(BotStatus::Starting));
        assert!(!BotStatus::Stopping.can_transition_to(BotStatus::Running));
        assert!(!BotStatus::Stopped.can_transition_to(BotStatus::Stopped));
    }

    #[test]
    fn test_error_is_not_terminal() {
        assert!(BotStatus::Starting.can_transition_to(BotStatus::Error));
        assert!(BotStatus::Running.can_transition_to(BotStatus::Error));
        assert!(BotStatus::Error.can_transition_to(BotStatus::Starting));
        assert!(BotStatus::Error.can_transition_to(BotStatus::Stopped));
        assert!(!BotStatus::Error.is_live());
    }

    #[test]
    fn test_log_is_bounded() {
        let mut record = BotRecord::new("Bot_Primary");
        for i in 0..=MAX_LOG_ENTRIES {
            record.push_log(LogLevel::Info, &format!("entry {i}"));
        }
        assert_eq!(record.log_len(), MAX_LOG_ENTRIES);
        let first = record.log().next().unwrap();
        assert_eq!(first.message, "entry 1");
        let last = record.log().last().unwrap();
        assert_eq!(last.message, format!("entry {MAX_LOG_ENTRIES}"));
    }

    #[test]
    fn test_record_processed_counts_and_stamps() {
        let mut record = BotRecord::new("Bot_Primary");
        assert_eq!(record.record_processed(), 1);
        assert_eq!(record.record_processed(), 2);
        assert_eq!(record.snapshot().messages_processed, 2);
        assert!(record.last_activity.is_some());
    }

    #[test]
    fn test_begin_start_resets_counters() {
        let mut record = BotRecord::new("Bot_Primary");
        record.messages_processed = 7;
        record.last_error = Some("boom".to_string());
        record.stopped_at = Some(Utc::now());
        record.begin_start();
        assert_eq!(record.status, BotStatus::Starting);
        assert_eq!(record.messages_processed, 0);
        assert!(record.last_error.is_none());
        assert!(record.stopped_at.is_none());
        assert!(record.started_at.is_some());
    }

    #[test]
    fn test_mark_failed_records_reason() {
        let mut record = BotRecord::new("Bot_Primary");
        record.begin_start();
        record.mark_failed("channel closed");
        assert_eq!(record.status, BotStatus::Error);
        assert_eq!(record.last_error.as_deref(), Some("channel closed"));
        assert_eq!(record.log().last().unwrap().level, LogLevel::Error);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut record = BotRecord::new("Bot_Primary");
        record.begin_start();
        record.push_log(LogLevel::Warning, "slow channel");
        record.push_log(LogLevel::Success, "replied");
        let snapshot = record.snapshot();
        assert!(snapshot.uptime_secs.is_some());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "starting");
        assert_eq!(json["log"][0]["level"], "warning");
        assert_eq!(json["log"][1]["level"], "success");
        assert_eq!(json["identity"], "Bot_Primary");
    }

    #[test]
    fn test_stopped_snapshot_has_no_uptime() {
        let mut record = BotRecord::new("Bot_Primary");
        record.begin_start();
        record.mark_stopped();
        let snapshot = record.snapshot();
        assert_eq!(snapshot.status, BotStatus::Stopped);
        assert!(snapshot.uptime_secs.is_none());
        assert!(snapshot.stopped_at.is_some());
    }
}
