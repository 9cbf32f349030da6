//! Lifecycle manager for bot identities.
//!
//! Each identity gets a [`BotSlot`]: its record behind a short-lived mutex,
//! plus the cancellation token and task handle of the live worker, if any.
//! Slots live in a registry keyed by identity and persist after a stop so
//! status queries keep working until the identity is removed.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use unibot_core::config::BotConfig;

use crate::channel::ChannelFactory;
use crate::record::{BotRecord, BotSnapshot, BotStatus, LogLevel};
use crate::worker::{fault_reason, BotWorker, WorkerDeps};

/// Errors from lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("bot {0} is already running")]
    AlreadyRunning(String),
    #[error("unknown bot: {0}")]
    UnknownIdentity(String),
    #[error("bot {identity} did not stop within {timeout:?}")]
    ShutdownTimeout { identity: String, timeout: Duration },
    #[error("failed to stop bots: {}", .0.join(", "))]
    ShutdownIncomplete(Vec<String>),
    #[error("bot {0} is still running")]
    StillRunning(String),
}

struct WorkerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Registry entry for one identity.
pub(crate) struct BotSlot {
    record: Mutex<BotRecord>,
    handle: tokio::sync::Mutex<Option<WorkerHandle>>,
}

impl BotSlot {
    fn new(identity: &str) -> Self {
        Self {
            record: Mutex::new(BotRecord::new(identity)),
            handle: tokio::sync::Mutex::new(None),
        }
    }

    fn lock_record(&self) -> MutexGuard<'_, BotRecord> {
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` with the record locked. Never hold the lock across an await.
    pub(crate) fn with_record<R>(&self, f: impl FnOnce(&mut BotRecord) -> R) -> R {
        f(&mut self.lock_record())
    }

    async fn is_live(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(WorkerHandle::is_alive)
    }
}

/// Starts, stops and reports on bot workers.
///
/// At most one live worker exists per identity. Workers run as independent
/// tokio tasks; a fault in one only moves that identity to `Error`.
pub struct BotManager {
    slots: RwLock<HashMap<String, Arc<BotSlot>>>,
    channels: Arc<dyn ChannelFactory>,
    deps: WorkerDeps,
}

impl std::fmt::Debug for BotManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotManager")
            .field("identities", &self.identities())
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

impl BotManager {
    pub fn new(deps: WorkerDeps, channels: Arc<dyn ChannelFactory>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            channels,
            deps,
        }
    }

    /// Default graceful-stop bound from the worker settings.
    pub fn stop_timeout(&self) -> Duration {
        self.deps.settings.stop_timeout
    }

    fn slot(&self, id: &str) -> Result<Arc<BotSlot>, BotError> {
        let slots = self.slots.read().unwrap_or_else(|p| p.into_inner());
        slots
            .get(id)
            .cloned()
            .ok_or_else(|| BotError::UnknownIdentity(id.to_string()))
    }

    fn slot_or_insert(&self, id: &str) -> Arc<BotSlot> {
        let mut slots = self.slots.write().unwrap_or_else(|p| p.into_inner());
        Arc::clone(
            slots
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(BotSlot::new(id))),
        )
    }

    fn all_slots(&self) -> Vec<(String, Arc<BotSlot>)> {
        let slots = self.slots.read().unwrap_or_else(|p| p.into_inner());
        let mut all: Vec<(String, Arc<BotSlot>)> = slots
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    fn identities(&self) -> Vec<String> {
        self.all_slots().into_iter().map(|(id, _)| id).collect()
    }

    /// Launch a worker for `bot`. Fails without side effects when the
    /// identity already has a live worker.
    pub async fn start(&self, bot: &BotConfig) -> Result<(), BotError> {
        let id = bot.name.as_str();
        let slot = self.slot_or_insert(id);
        let mut handle = slot.handle.lock().await;
        if handle.as_ref().is_some_and(WorkerHandle::is_alive) {
            return Err(BotError::AlreadyRunning(id.to_string()));
        }

        slot.with_record(|r| {
            r.begin_start();
            r.push_log(LogLevel::Info, "Starting");
        });

        let token = CancellationToken::new();
        let worker = BotWorker::new(
            id,
            Arc::clone(&slot),
            self.channels.create(bot),
            self.deps.clone(),
            token.clone(),
        );
        let task_slot = Arc::clone(&slot);
        let identity = id.to_string();
        let task = tokio::spawn(async move {
            match AssertUnwindSafe(worker.run()).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let reason = fault_reason(&e);
                    error!(bot = %identity, error = %e, "Worker failed");
                    task_slot.with_record(|r| r.mark_failed(&reason));
                }
                Err(_) => {
                    error!(bot = %identity, "Worker panicked");
                    task_slot.with_record(|r| r.mark_failed("Worker panicked"));
                }
            }
        });

        *handle = Some(WorkerHandle { token, task });
        info!(bot = %id, "Bot started");
        Ok(())
    }

    /// Cancel the identity's worker and wait up to `timeout` for it to exit.
    ///
    /// On timeout the worker is left registered (and still cancelled) and
    /// [`BotError::ShutdownTimeout`] is returned.
    pub async fn stop(&self, id: &str, timeout: Duration) -> Result<(), BotError> {
        let slot = self.slot(id)?;
        let mut guard = slot.handle.lock().await;

        if let Some(handle) = guard.as_mut() {
            if handle.is_alive() {
                slot.with_record(|r| {
                    r.transition(BotStatus::Stopping);
                    r.detail = "Stopping".to_string();
                });
            }
            handle.token.cancel();

            if tokio::time::timeout(timeout, &mut handle.task).await.is_err() {
                warn!(bot = %id, ?timeout, "Worker did not stop in time; leaving it registered");
                slot.with_record(|r| {
                    r.push_log(
                        LogLevel::Warning,
                        &format!("Worker did not stop within {}s", timeout.as_secs_f64()),
                    )
                });
                return Err(BotError::ShutdownTimeout {
                    identity: id.to_string(),
                    timeout,
                });
            }
        }

        *guard = None;
        slot.with_record(|r| {
            if r.status != BotStatus::Stopped {
                r.mark_stopped();
                r.push_log(LogLevel::Info, "Stopped");
            }
        });
        info!(bot = %id, "Bot stopped");
        Ok(())
    }

    /// Stop every identity with a live worker. Keeps going past failures and
    /// reports the identities that did not stop.
    pub async fn stop_all(&self, timeout: Duration) -> Result<(), BotError> {
        let mut failed = Vec::new();
        for (id, slot) in self.all_slots() {
            if !slot.is_live().await {
                continue;
            }
            if let Err(e) = self.stop(&id, timeout).await {
                warn!(bot = %id, error = %e, "Stop failed");
                failed.push(id);
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(BotError::ShutdownIncomplete(failed))
        }
    }

    /// Stop (if live) then start. A failed stop aborts the restart.
    pub async fn restart(&self, bot: &BotConfig) -> Result<(), BotError> {
        if let Ok(slot) = self.slot(&bot.name) {
            if slot.is_live().await {
                self.stop(&bot.name, self.stop_timeout()).await?;
            }
        }
        self.start(bot).await
    }

    pub fn get_status(&self, id: &str) -> Result<BotSnapshot, BotError> {
        Ok(self.slot(id)?.with_record(|r| r.snapshot()))
    }

    /// Snapshots of every known identity, ordered by identity.
    pub fn get_all_statuses(&self) -> Vec<BotSnapshot> {
        self.all_slots()
            .into_iter()
            .map(|(_, slot)| slot.with_record(|r| r.snapshot()))
            .collect()
    }

    pub fn append_log(&self, id: &str, message: &str, level: LogLevel) -> Result<(), BotError> {
        self.slot(id)?.with_record(|r| r.push_log(level, message));
        Ok(())
    }

    pub fn increment_processed(&self, id: &str) -> Result<u64, BotError> {
        Ok(self.slot(id)?.with_record(BotRecord::record_processed))
    }

    /// Record what the worker is doing and how many chats look unread.
    pub fn update_status(&self, id: &str, detail: &str, unread: u32) -> Result<(), BotError> {
        self.slot(id)?.with_record(|r| {
            r.detail = detail.to_string();
            r.unread_estimate = unread;
            r.last_activity = Some(chrono::Utc::now());
        });
        Ok(())
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.slot(id)
            .map(|slot| slot.with_record(|r| r.status == BotStatus::Running))
            .unwrap_or(false)
    }

    /// Identities whose status is starting, running or stopping.
    pub fn active_bots(&self) -> Vec<String> {
        self.all_slots()
            .into_iter()
            .filter(|(_, slot)| slot.with_record(|r| r.status.is_live()))
            .map(|(id, _)| id)
            .collect()
    }

    /// Forget a stopped identity.
    pub async fn remove(&self, id: &str) -> Result<(), BotError> {
        let slot = self.slot(id)?;
        if slot.is_live().await {
            return Err(BotError::StillRunning(id.to_string()));
        }
        let mut slots = self.slots.write().unwrap_or_else(|p| p.into_inner());
        slots.remove(id);
        info!(bot = %id, "Bot removed");
        Ok(())
    }
}
