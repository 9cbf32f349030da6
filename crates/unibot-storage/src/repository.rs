//! SQLite-backed student directory and conversation log.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::OptionalExtension;
use tracing::warn;

use unibot_core::directory::StudentDirectory;
use unibot_core::error::UnibotError;
use unibot_core::types::{
    AcademicSet, ConversationTurnRecord, Course, HistoryEntry, Invoice, InvoiceSet,
    StudentProfile, DEFAULT_SALUTATION,
};

use crate::db::{storage_err, Database};

/// Most recent invoices returned per lookup.
pub const MAX_INVOICES: usize = 5;

fn lookup_err(context: &str) -> impl Fn(rusqlite::Error) -> UnibotError + '_ {
    move |e| UnibotError::DataAccess(format!("{}: {}", context, e))
}

/// Keep only the ASCII digits of a contact identifier.
pub fn contact_digits(contact: &str) -> String {
    contact.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// [`StudentDirectory`] over the `student_details`, `invoice_lines`,
/// `academic_details` and `conversation_log` tables.
#[derive(Debug, Clone)]
pub struct SqliteDirectory {
    db: Arc<Database>,
}

impl SqliteDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace a student row.
    pub fn upsert_student(
        &self,
        contact_number: &str,
        profile: &StudentProfile,
    ) -> Result<(), UnibotError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO student_details
                 (application_number, contact_number, salutation, full_name, email, program_name, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    profile.application_number,
                    contact_number,
                    profile.salutation,
                    profile.full_name,
                    profile.email,
                    profile.program,
                    profile.status,
                ],
            )
            .map_err(storage_err("Failed to save student"))?;
            Ok(())
        })
    }

    pub fn insert_invoice(
        &self,
        application_number: &str,
        invoice: &Invoice,
    ) -> Result<(), UnibotError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO invoice_lines
                 (invoice_number, application_number, invoice_date, total_amount, paid_amount,
                  balance_amount, due_date, status, payment_method)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    invoice.invoice_number,
                    application_number,
                    invoice.invoice_date,
                    invoice.total_amount,
                    invoice.paid_amount,
                    invoice.balance_amount,
                    invoice.due_date,
                    invoice.status,
                    invoice.payment_method,
                ],
            )
            .map_err(storage_err("Failed to save invoice"))?;
            Ok(())
        })
    }

    pub fn insert_course(&self, application_number: &str, course: &Course) -> Result<(), UnibotError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO academic_details
                 (application_number, course_name, course_code, enrollment_date, status, grade, credits, mentor)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    application_number,
                    course.course_name,
                    course.course_code,
                    course.enrollment_date,
                    course.status,
                    course.grade,
                    course.credits,
                    course.mentor,
                ],
            )
            .map_err(storage_err("Failed to save course"))?;
            Ok(())
        })
    }

    /// Profile whose stored contact number contains the digits of `contact_id`.
    pub fn find_profile(
        &self,
        contact_id: &str,
        display_name: &str,
    ) -> Result<StudentProfile, UnibotError> {
        let digits = contact_digits(contact_id);
        if digits.is_empty() {
            return Ok(StudentProfile::unknown(display_name));
        }

        let found = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT application_number, salutation, full_name, email, program_name, status
                 FROM student_details
                 WHERE REPLACE(REPLACE(REPLACE(contact_number, '+', ''), ' ', ''), '-', '') LIKE ?1
                 LIMIT 1",
                rusqlite::params![format!("%{}%", digits)],
                |row| {
                    let salutation: Option<String> = row.get(1)?;
                    Ok(StudentProfile {
                        application_number: row.get(0)?,
                        salutation: salutation
                            .filter(|s| !s.trim().is_empty())
                            .unwrap_or_else(|| DEFAULT_SALUTATION.to_string()),
                        full_name: row.get(2)?,
                        email: row.get(3)?,
                        program: row.get(4)?,
                        status: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(lookup_err("Failed to look up student"))
        })?;

        match found {
            Some(profile) => Ok(profile),
            None => {
                warn!(contact = %contact_id, "No student found for contact");
                Ok(StudentProfile::unknown(display_name))
            }
        }
    }

    pub fn find_invoices(&self, application_number: &str) -> Result<Option<InvoiceSet>, UnibotError> {
        let invoices = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT invoice_number, invoice_date, total_amount, paid_amount, balance_amount,
                            due_date, status, payment_method
                     FROM invoice_lines
                     WHERE application_number = ?1
                     ORDER BY invoice_date DESC
                     LIMIT ?2",
                )
                .map_err(lookup_err("Failed to prepare invoice query"))?;

            let rows = stmt
                .query_map(rusqlite::params![application_number, MAX_INVOICES as i64], |row| {
                    Ok(Invoice {
                        invoice_number: row.get(0)?,
                        invoice_date: row.get(1)?,
                        total_amount: row.get(2)?,
                        paid_amount: row.get(3)?,
                        balance_amount: row.get(4)?,
                        due_date: row.get(5)?,
                        status: row.get(6)?,
                        payment_method: row.get(7)?,
                    })
                })
                .map_err(lookup_err("Failed to query invoices"))?;

            rows.collect::<Result<Vec<_>, _>>()
                .map_err(lookup_err("Failed to read invoice row"))
        })?;

        Ok(InvoiceSet::from_invoices(invoices))
    }

    pub fn find_academic(&self, application_number: &str) -> Result<Option<AcademicSet>, UnibotError> {
        let courses = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT course_name, course_code, enrollment_date, status, grade, credits, mentor
                     FROM academic_details
                     WHERE application_number = ?1
                     ORDER BY enrollment_date DESC, id ASC",
                )
                .map_err(lookup_err("Failed to prepare academic query"))?;

            let rows = stmt
                .query_map(rusqlite::params![application_number], |row| {
                    Ok(Course {
                        course_name: row.get(0)?,
                        course_code: row.get(1)?,
                        enrollment_date: row.get(2)?,
                        status: row.get(3)?,
                        grade: row.get(4)?,
                        credits: row.get(5)?,
                        mentor: row.get(6)?,
                    })
                })
                .map_err(lookup_err("Failed to query courses"))?;

            rows.collect::<Result<Vec<_>, _>>()
                .map_err(lookup_err("Failed to read course row"))
        })?;

        Ok(AcademicSet::from_courses(courses))
    }

    /// Append a turn, applying the log truncation limits.
    pub fn append_turn(&self, record: &ConversationTurnRecord) -> Result<(), UnibotError> {
        let record = record.truncated();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversation_log
                 (contact_id, application_number, display_name, received_message, response,
                  message_type, media_type, category, confidence, faq_question, bot_name, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    record.contact_id,
                    record.application_number,
                    record.display_name,
                    record.received_message,
                    record.response,
                    record.message_type,
                    record.media_type,
                    record.category,
                    record.confidence,
                    record.faq_question,
                    record.bot_name,
                    record.timestamp.timestamp_millis(),
                ],
            )
            .map_err(storage_err("Failed to log conversation"))?;
            Ok(())
        })
    }

    /// Most recent turns for a contact, newest first.
    pub fn history(&self, contact_id: &str, limit: usize) -> Result<Vec<HistoryEntry>, UnibotError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT received_message, response, message_type, category, confidence, timestamp
                     FROM conversation_log
                     WHERE contact_id = ?1
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?2",
                )
                .map_err(lookup_err("Failed to prepare history query"))?;

            let rows = stmt
                .query_map(rusqlite::params![contact_id, limit as i64], |row| {
                    let millis: i64 = row.get(5)?;
                    Ok(HistoryEntry {
                        received_message: row.get(0)?,
                        response: row.get(1)?,
                        message_type: row.get(2)?,
                        category: row.get(3)?,
                        confidence: row.get(4)?,
                        timestamp: Utc
                            .timestamp_millis_opt(millis)
                            .single()
                            .unwrap_or_default(),
                    })
                })
                .map_err(lookup_err("Failed to query history"))?;

            rows.collect::<Result<Vec<_>, _>>()
                .map_err(lookup_err("Failed to read history row"))
        })
    }
}

#[async_trait]
impl StudentDirectory for SqliteDirectory {
    async fn lookup_profile(
        &self,
        contact_id: &str,
        display_name: &str,
    ) -> Result<StudentProfile, UnibotError> {
        self.find_profile(contact_id, display_name)
    }

    async fn lookup_invoices(&self, application_number: &str) -> Result<Option<InvoiceSet>, UnibotError> {
        self.find_invoices(application_number)
    }

    async fn lookup_academic(&self, application_number: &str) -> Result<Option<AcademicSet>, UnibotError> {
        self.find_academic(application_number)
    }

    async fn append_conversation_turn(&self, record: &ConversationTurnRecord) -> Result<(), UnibotError> {
        self.append_turn(record)
    }

    async fn conversation_history(
        &self,
        contact_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, UnibotError> {
        self.history(contact_id, limit)
    }
}
