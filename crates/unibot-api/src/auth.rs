//! Bearer-token authentication for the control routes.
//!
//! The token lives in a file under the data directory and is created on first
//! run. Requests to protected routes must carry `Authorization: Bearer <token>`.

use std::path::Path;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::Rng;

use crate::error::ErrorBody;
use crate::state::AppState;

/// Random 32-character hex token.
pub fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    hex::encode(bytes)
}

/// Read the token at `token_path`, or create and persist a new one.
///
/// A token that cannot be written is still returned so the server can run;
/// it just won't survive a restart.
pub fn load_or_generate_token(token_path: &Path) -> String {
    if let Ok(contents) = std::fs::read_to_string(token_path) {
        let token = contents.trim();
        if !token.is_empty() {
            tracing::info!(path = %token_path.display(), "API token loaded");
            return token.to_string();
        }
    }

    let token = generate_token();
    if let Some(parent) = token_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::write(token_path, &token) {
        Ok(()) => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ =
                    std::fs::set_permissions(token_path, std::fs::Permissions::from_mode(0o600));
            }
            tracing::info!(path = %token_path.display(), "API token generated");
        }
        Err(e) => {
            tracing::warn!(error = %e, path = %token_path.display(), "Failed to save API token");
        }
    }
    token
}

/// Why a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Missing,
    BadEncoding,
    Invalid,
}

impl Rejection {
    fn message(self) -> &'static str {
        match self {
            Rejection::Missing => "Missing Authorization header",
            Rejection::BadEncoding => "Invalid Authorization header encoding",
            Rejection::Invalid => "Invalid bearer token",
        }
    }
}

fn check_bearer(headers: &HeaderMap, expected: &str) -> Result<(), Rejection> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(Rejection::Missing)?
        .to_str()
        .map_err(|_| Rejection::BadEncoding)?;
    match value.strip_prefix("Bearer ") {
        Some(token) if !expected.is_empty() && token.trim() == expected => Ok(()),
        _ => Err(Rejection::Invalid),
    }
}

/// Middleware that rejects requests without the configured bearer token.
pub async fn require_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    match check_bearer(req.headers(), &state.api_token) {
        Ok(()) => next.run(req).await,
        Err(rejection) => {
            tracing::debug!(reason = rejection.message(), uri = %req.uri(), "Rejected request");
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody {
                    error: "unauthorized".to_string(),
                    message: rejection.message().to_string(),
                    details: None,
                }),
            )
                .into_response()
        }
    }
}
