//! Data-access boundary for student records and the conversation log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, UnibotError};
use crate::types::{AcademicSet, ConversationTurnRecord, HistoryEntry, InvoiceSet, StudentProfile};

/// Read access to student projections plus the write-only conversation log.
///
/// Lookups that find nothing return the empty sentinel / `None`; `Err` is
/// reserved for the backing store failing.
#[async_trait]
pub trait StudentDirectory: Send + Sync {
    /// Resolve a channel contact to a profile.
    async fn lookup_profile(&self, contact_id: &str, display_name: &str) -> Result<StudentProfile>;

    /// Most recent invoices (at most five) for an application number.
    async fn lookup_invoices(&self, application_number: &str) -> Result<Option<InvoiceSet>>;

    /// Course enrollments for an application number.
    async fn lookup_academic(&self, application_number: &str) -> Result<Option<AcademicSet>>;

    /// Append one turn to the conversation log.
    async fn append_conversation_turn(&self, record: &ConversationTurnRecord) -> Result<()>;

    /// Recent logged turns for a contact, newest first.
    async fn conversation_history(&self, contact_id: &str, limit: usize)
        -> Result<Vec<HistoryEntry>>;
}

/// In-memory [`StudentDirectory`] for tests and offline runs.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    profiles: Mutex<HashMap<String, StudentProfile>>,
    invoices: Mutex<HashMap<String, InvoiceSet>>,
    academic: Mutex<HashMap<String, AcademicSet>>,
    turns: Mutex<Vec<ConversationTurnRecord>>,
    fail_lookups: AtomicBool,
    fail_appends: AtomicBool,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, contact_id: &str, profile: StudentProfile) {
        if let Ok(mut map) = self.profiles.lock() {
            map.insert(contact_id.to_string(), profile);
        }
    }

    pub fn insert_invoices(&self, application_number: &str, set: InvoiceSet) {
        if let Ok(mut map) = self.invoices.lock() {
            map.insert(application_number.to_string(), set);
        }
    }

    pub fn insert_academic(&self, application_number: &str, set: AcademicSet) {
        if let Ok(mut map) = self.academic.lock() {
            map.insert(application_number.to_string(), set);
        }
    }

    /// Make every record lookup fail with a data-access error.
    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Make every conversation append fail.
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of everything logged so far, oldest first.
    pub fn logged_turns(&self) -> Vec<ConversationTurnRecord> {
        self.turns.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn check_lookup(&self) -> Result<()> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(UnibotError::DataAccess("lookup failure injected".to_string()));
        }
        Ok(())
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> UnibotError {
    UnibotError::DataAccess(format!("Lock poisoned: {}", e))
}

#[async_trait]
impl StudentDirectory for MemoryDirectory {
    async fn lookup_profile(&self, contact_id: &str, display_name: &str) -> Result<StudentProfile> {
        self.check_lookup()?;
        let profiles = self.profiles.lock().map_err(poisoned)?;
        Ok(profiles
            .get(contact_id)
            .cloned()
            .unwrap_or_else(|| StudentProfile::unknown(display_name)))
    }

    async fn lookup_invoices(&self, application_number: &str) -> Result<Option<InvoiceSet>> {
        self.check_lookup()?;
        let invoices = self.invoices.lock().map_err(poisoned)?;
        Ok(invoices.get(application_number).cloned())
    }

    async fn lookup_academic(&self, application_number: &str) -> Result<Option<AcademicSet>> {
        self.check_lookup()?;
        let academic = self.academic.lock().map_err(poisoned)?;
        Ok(academic.get(application_number).cloned())
    }

    async fn append_conversation_turn(&self, record: &ConversationTurnRecord) -> Result<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(UnibotError::Storage("append failure injected".to_string()));
        }
        let mut turns = self.turns.lock().map_err(poisoned)?;
        turns.push(record.truncated());
        Ok(())
    }

    async fn conversation_history(
        &self,
        contact_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let turns = self.turns.lock().map_err(poisoned)?;
        Ok(turns
            .iter()
            .rev()
            .filter(|t| t.contact_id == contact_id)
            .take(limit)
            .map(|t| HistoryEntry {
                received_message: t.received_message.clone(),
                response: t.response.clone(),
                message_type: t.message_type.clone(),
                category: t.category.clone(),
                confidence: t.confidence,
                timestamp: t.timestamp,
            })
            .collect())
    }
}
