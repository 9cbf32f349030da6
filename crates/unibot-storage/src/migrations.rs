//! Database schema migrations.
//!
//! Version 1 creates the student projections (details, invoice lines,
//! academic enrollments) and the conversation log.

use rusqlite::Connection;
use tracing::info;

use unibot_core::error::UnibotError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), UnibotError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| UnibotError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| UnibotError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), UnibotError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS student_details (
            application_number  TEXT PRIMARY KEY NOT NULL,
            contact_number      TEXT NOT NULL DEFAULT '',
            salutation          TEXT,
            full_name           TEXT NOT NULL DEFAULT '',
            email               TEXT NOT NULL DEFAULT '',
            program_name        TEXT NOT NULL DEFAULT '',
            status              TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_student_details_contact
            ON student_details (contact_number);

        CREATE TABLE IF NOT EXISTS invoice_lines (
            invoice_number      TEXT PRIMARY KEY NOT NULL,
            application_number  TEXT NOT NULL,
            invoice_date        TEXT NOT NULL,
            total_amount        REAL NOT NULL DEFAULT 0.0,
            paid_amount         REAL NOT NULL DEFAULT 0.0,
            balance_amount      REAL NOT NULL DEFAULT 0.0,
            due_date            TEXT NOT NULL DEFAULT '',
            status              TEXT NOT NULL DEFAULT '',
            payment_method      TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_invoice_lines_app
            ON invoice_lines (application_number, invoice_date DESC);

        CREATE TABLE IF NOT EXISTS academic_details (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            application_number  TEXT NOT NULL,
            course_name         TEXT NOT NULL,
            course_code         TEXT NOT NULL DEFAULT '',
            enrollment_date     TEXT NOT NULL DEFAULT '',
            status              TEXT NOT NULL DEFAULT '',
            grade               TEXT,
            credits             REAL,
            mentor              TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_academic_details_app
            ON academic_details (application_number, enrollment_date DESC);

        CREATE TABLE IF NOT EXISTS conversation_log (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            contact_id          TEXT NOT NULL,
            application_number  TEXT NOT NULL DEFAULT '',
            display_name        TEXT NOT NULL DEFAULT '',
            received_message    TEXT NOT NULL DEFAULT '',
            response            TEXT NOT NULL DEFAULT '',
            message_type        TEXT NOT NULL,
            media_type          TEXT NOT NULL DEFAULT 'text',
            category            TEXT NOT NULL,
            confidence          REAL NOT NULL DEFAULT 0.0,
            faq_question        TEXT NOT NULL DEFAULT '',
            bot_name            TEXT NOT NULL DEFAULT '',
            timestamp           INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conversation_log_contact
            ON conversation_log (contact_id, timestamp DESC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| UnibotError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn test_migrations_run_once() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_all_tables_exist() {
        let conn = open_test_conn();
        for table in [
            "student_details",
            "invoice_lines",
            "academic_details",
            "conversation_log",
        ] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn test_conversation_log_defaults() {
        let conn = open_test_conn();
        conn.execute(
            "INSERT INTO conversation_log (contact_id, message_type, category, timestamp)
             VALUES ('APP-1', 'greeting', 'greeting', 0)",
            [],
        )
        .unwrap();
        let media: String = conn
            .query_row("SELECT media_type FROM conversation_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(media, "text");
    }
}
