//! Request/response endpoints
//!
//! Every handler answers with status 200 and a JSON body: either the payload
//! or `{"error": "<message>"}`. Failures never surface at the transport level.

mod views;

pub use views::{
    AlertFeed, ComponentBreakdown, EpisodeHistory, RewardHistory, ALERT_WINDOW,
    DEFAULT_EPISODE_WINDOW, DEFAULT_STEP_WINDOW,
};

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;
use crate::server::AppState;

/// `?n=` window parameter
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct WindowQuery {
    pub n: Option<usize>,
}

/// Body returned for any failed query
pub fn error_body(message: impl std::fmt::Display) -> Json<Value> {
    Json(json!({ "error": message.to_string() }))
}

fn respond<T: Serialize>(endpoint: &str, result: Result<T>) -> Json<Value> {
    match result.and_then(|payload| Ok(serde_json::to_value(payload)?)) {
        Ok(value) => Json(value),
        Err(e) => {
            tracing::warn!(endpoint, kind = e.kind(), "Query failed: {}", e);
            error_body(e)
        }
    }
}

fn window(
    query: std::result::Result<Query<WindowQuery>, QueryRejection>,
    default: usize,
) -> std::result::Result<usize, Json<Value>> {
    match query {
        Ok(Query(WindowQuery { n })) => Ok(n.unwrap_or(default)),
        Err(rejection) => Err(error_body(rejection.body_text())),
    }
}

/// GET /api/reward-history
pub async fn reward_history(
    State(state): State<AppState>,
    query: std::result::Result<Query<WindowQuery>, QueryRejection>,
) -> Json<Value> {
    let n = match window(query, DEFAULT_STEP_WINDOW) {
        Ok(n) => n,
        Err(body) => return body,
    };
    let result = state
        .recent_steps(n)
        .await
        .map(|steps| RewardHistory::from_steps(&steps));
    respond("reward-history", result)
}

/// GET /api/component-breakdown
pub async fn component_breakdown(
    State(state): State<AppState>,
    query: std::result::Result<Query<WindowQuery>, QueryRejection>,
) -> Json<Value> {
    let n = match window(query, DEFAULT_STEP_WINDOW) {
        Ok(n) => n,
        Err(body) => return body,
    };
    let result = state
        .recent_steps(n)
        .await
        .map(|steps| ComponentBreakdown::from_steps(&steps));
    respond("component-breakdown", result)
}

/// GET /api/episode-history
pub async fn episode_history(
    State(state): State<AppState>,
    query: std::result::Result<Query<WindowQuery>, QueryRejection>,
) -> Json<Value> {
    let n = match window(query, DEFAULT_EPISODE_WINDOW) {
        Ok(n) => n,
        Err(body) => return body,
    };
    let result = state
        .recent_episodes(n)
        .await
        .map(|episodes| EpisodeHistory::from_episodes(&episodes));
    respond("episode-history", result)
}

/// GET /api/alerts
pub async fn alerts(State(state): State<AppState>) -> Json<Value> {
    let result = state
        .recent_episodes(ALERT_WINDOW)
        .await
        .map(|episodes| AlertFeed::from_episodes(&episodes));
    respond("alerts", result)
}

/// GET /api/run
pub async fn run_info(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "run_name": state.run_name(),
        "store": state.store_description(),
    }))
}

/// GET /api/sessions
pub async fn sessions(State(state): State<AppState>) -> Json<Value> {
    let sessions = state.sessions().sessions();
    Json(json!({
        "count": sessions.len(),
        "sessions": sessions,
    }))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "store_available": state.has_store(),
        "sessions": state.sessions().session_count(),
    }))
}
