//! Bot lifecycle: per-identity workers that poll a messaging channel and
//! answer through the conversation pipeline.

pub mod channel;
pub mod contact;
pub mod manager;
pub mod record;
pub mod worker;

pub use channel::{ChannelAdapter, ChannelFactory, IdleChannel, InboundEvent, ScriptedChannel};
pub use manager::{BotError, BotManager};
pub use record::{BotRecord, BotSnapshot, BotStatus, LogEntry, LogLevel, MAX_LOG_ENTRIES};
pub use worker::{WorkerDeps, WorkerSettings};
