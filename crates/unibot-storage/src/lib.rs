//! Unibot Storage crate - SQLite persistence for student records and the
//! conversation log.
//!
//! Provides a WAL-mode SQLite database with migrations and a
//! `StudentDirectory` implementation over it.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{contact_digits, SqliteDirectory};
