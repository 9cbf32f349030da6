//! Unibot API crate - axum status and control surface for the bot fleet.
//!
//! Exposes health, per-bot status snapshots, lifecycle operations that go
//! through the `BotManager`, and keyword maintenance.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
