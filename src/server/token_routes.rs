use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::cache::token::RefreshParams;
use crate::server::server::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub visitor_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub token_type: String,
    pub token: Option<String>,
    pub needs_refresh: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RefreshResponse {
    pub accepted: bool,
    pub success: bool,
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct VisitorResponse {
    pub visitor_id: String,
    /// sorted
    pub active_token_types: Vec<String>,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct BackupResponse {
    pub written: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tokens/{token_type}", get(get_token))
        .route("/tokens/{token_type}/refresh", post(refresh_token))
        .route("/tokens/{token_type}/params", put(set_refresh_params))
        .route("/visitors/{visitor_id}", get(get_visitor).delete(unregister_visitor))
        .route("/backup", post(force_backup))
}

async fn get_token(
    State(state): State<AppState>,
    Path(token_type): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Response {
    let Some(visitor_id) = query.visitor_id.filter(|v| !v.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "visitor_id query parameter is required").into_response();
    };

    let token = state.registry.get_token(&visitor_id, &token_type);
    let needs_refresh = state.registry.needs_refresh(&token_type);
    Json(TokenResponse { token_type, token, needs_refresh }).into_response()
}

/// Joins (or starts) the refresh for the token type and answers once it settles.
async fn refresh_token(State(state): State<AppState>, Path(token_type): Path<String>) -> Response {
    let (tx, rx) = oneshot::channel();
    let accepted = state.registry.refresh_token(
        &token_type,
        Some(Box::new(move |success, token| {
            // receiver may be gone if the client disconnected
            let _ = tx.send((success, token));
        })),
    );

    if !accepted {
        debug!(token_type = %token_type, "refresh rejected");
        let body = RefreshResponse { accepted, success: false, token: None };
        return (StatusCode::CONFLICT, Json(body)).into_response();
    }

    match rx.await {
        Ok((success, token)) => Json(RefreshResponse { accepted, success, token }).into_response(),
        Err(e) => {
            error!(token_type = %token_type, error = %e, "refresh listener dropped");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn set_refresh_params(
    State(state): State<AppState>,
    Path(token_type): Path<String>,
    Json(params): Json<RefreshParams>,
) -> StatusCode {
    state.registry.set_refresh_params(&token_type, params);
    StatusCode::NO_CONTENT
}

async fn get_visitor(State(state): State<AppState>, Path(visitor_id): Path<String>) -> Response {
    let ledger = state.registry.ledger();
    let (Some(types), Some(last_activity_at)) =
        (ledger.active_token_types(&visitor_id), ledger.last_activity_at(&visitor_id))
    else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let mut active_token_types: Vec<String> = types.into_iter().collect();
    active_token_types.sort();
    Json(VisitorResponse { visitor_id, active_token_types, last_activity_at }).into_response()
}

async fn unregister_visitor(State(state): State<AppState>, Path(visitor_id): Path<String>) -> StatusCode {
    state.registry.unregister_visitor(&visitor_id);
    StatusCode::NO_CONTENT
}

async fn force_backup(State(state): State<AppState>) -> impl IntoResponse {
    Json(BackupResponse { written: state.registry.force_backup(None).await })
}
