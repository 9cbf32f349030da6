//! Route handler functions.
//!
//! Lifecycle handlers are thin: they resolve the identity, call the
//! `BotManager` and return the resulting snapshot.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use unibot_bot::{BotSnapshot, BotStatus};
use unibot_chat::KeywordConfig;
use unibot_core::config::BotConfig;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub bots_running: usize,
    pub knowledge_ready: bool,
    pub knowledge_chunks: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfiguredBot {
    pub name: String,
    pub enabled: bool,
    /// `None` until the identity has been started once.
    pub status: Option<BotStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BotsResponse {
    pub configured: Vec<ConfiguredBot>,
    pub bots: Vec<BotSnapshot>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StopParams {
    /// Overrides the configured graceful-stop bound.
    pub timeout_secs: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KeywordsResponse {
    pub path: Option<String>,
    pub keywords: KeywordConfig,
}

#[derive(Debug, Deserialize)]
pub struct AddKeywordsRequest {
    pub phrases: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddKeywordsResponse {
    pub category: String,
    pub added: usize,
    pub total: usize,
}

// =============================================================================
// Health
// =============================================================================

/// GET /health - liveness plus a coarse view of the fleet and knowledge base.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        bots_running: state
            .manager
            .get_all_statuses()
            .iter()
            .filter(|s| s.status == BotStatus::Running)
            .count(),
        knowledge_ready: state.knowledge.is_ready(),
        knowledge_chunks: state.knowledge.chunk_count(),
    })
}

// =============================================================================
// Bots
// =============================================================================

/// GET /bots - configured identities and every known record.
pub async fn list_bots(State(state): State<AppState>) -> Json<BotsResponse> {
    let bots = state.manager.get_all_statuses();
    let configured = state
        .bots
        .iter()
        .map(|b| ConfiguredBot {
            name: b.name.clone(),
            enabled: b.enabled,
            status: bots.iter().find(|s| s.identity == b.name).map(|s| s.status),
        })
        .collect();
    Json(BotsResponse { configured, bots })
}

/// GET /bots/{id}
pub async fn get_bot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BotSnapshot>, ApiError> {
    Ok(Json(state.manager.get_status(&id)?))
}

fn configured(state: &AppState, id: &str) -> Result<BotConfig, ApiError> {
    state
        .bot_config(id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("No configured bot named '{}'", id)))
}

/// POST /bots/{id}/start
pub async fn start_bot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BotSnapshot>, ApiError> {
    let bot = configured(&state, &id)?;
    state.manager.start(&bot).await?;
    tracing::info!(bot = %id, "Started via API");
    Ok(Json(state.manager.get_status(&id)?))
}

/// POST /bots/{id}/stop
pub async fn stop_bot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<StopParams>,
) -> Result<Json<BotSnapshot>, ApiError> {
    let timeout = match params.timeout_secs {
        Some(secs) if secs.is_finite() && secs > 0.0 => Duration::from_secs_f64(secs),
        Some(secs) => {
            return Err(ApiError::BadRequest(format!(
                "'timeout_secs' must be positive, got {}",
                secs
            )))
        }
        None => state.manager.stop_timeout(),
    };
    state.manager.stop(&id, timeout).await?;
    tracing::info!(bot = %id, "Stopped via API");
    Ok(Json(state.manager.get_status(&id)?))
}

/// POST /bots/{id}/restart
pub async fn restart_bot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BotSnapshot>, ApiError> {
    let bot = configured(&state, &id)?;
    state.manager.restart(&bot).await?;
    tracing::info!(bot = %id, "Restarted via API");
    Ok(Json(state.manager.get_status(&id)?))
}

// =============================================================================
// Keywords
// =============================================================================

fn keywords_response(state: &AppState) -> KeywordsResponse {
    KeywordsResponse {
        path: state.keywords.path().map(|p| p.display().to_string()),
        keywords: state.keywords.snapshot().config().clone(),
    }
}

/// GET /keywords - the active keyword lists.
pub async fn get_keywords(State(state): State<AppState>) -> Json<KeywordsResponse> {
    Json(keywords_response(&state))
}

/// POST /keywords/reload - re-read the keyword file. A malformed file keeps
/// the current lists and returns 422.
pub async fn reload_keywords(
    State(state): State<AppState>,
) -> Result<Json<KeywordsResponse>, ApiError> {
    if state.keywords.path().is_none() {
        return Err(ApiError::BadRequest(
            "Keyword store has no backing file".to_string(),
        ));
    }
    state.keywords.reload()?;
    Ok(Json(keywords_response(&state)))
}

/// POST /keywords/{category} - append phrases to a category and persist.
pub async fn add_keywords(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Json(body): Json<AddKeywordsRequest>,
) -> Result<Json<AddKeywordsResponse>, ApiError> {
    if body.phrases.iter().all(|p| p.trim().is_empty()) {
        return Err(ApiError::BadRequest(
            "'phrases' must contain at least one non-empty phrase".to_string(),
        ));
    }
    let added = state.keywords.add_keywords(&category, body.phrases)?;
    let total = state.keywords.snapshot().phrases(&category).len();
    Ok(Json(AddKeywordsResponse {
        category,
        added,
        total,
    }))
}
