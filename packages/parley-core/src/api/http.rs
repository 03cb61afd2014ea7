//! HTTP route handlers for the control API.
//!
//! All handlers are thin - they delegate to the orchestrator and the
//! repositories.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::{ParleyError, ParleyResult};
use crate::model::{Session, Transcript};
use crate::protocol_constants::{APP_NAME, SERVICE_ID};
use crate::session::StopReceipt;

/// Request body for `POST /api/sessions`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionRequest {
    deck_id: String,
    #[serde(default)]
    title: Option<String>,
}

/// Response body for `POST /api/sessions`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionResponse {
    session_id: String,
    /// Opaque token for the attach channel; verification is the identity
    /// layer's concern.
    attach_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionListQuery {
    deck_id: String,
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "service": SERVICE_ID,
        "name": APP_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn start_session(
    State(state): State<AppState>,
    Json(body): Json<StartSessionRequest>,
) -> ParleyResult<Json<StartSessionResponse>> {
    let session = state
        .orchestrator
        .start_session(&body.deck_id, body.title)
        .await?;
    Ok(Json(StartSessionResponse {
        session_id: session.id,
        attach_token: uuid::Uuid::new_v4().to_string(),
    }))
}

async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ParleyResult<Json<StopReceipt>> {
    let receipt = state.orchestrator.stop(&session_id).await?;
    Ok(Json(receipt))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ParleyResult<Json<Session>> {
    let session = state
        .orchestrator
        .repos()
        .sessions
        .get(&session_id)
        .await?
        .ok_or(ParleyError::SessionNotFound(session_id))?;
    Ok(Json(session))
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionListQuery>,
) -> ParleyResult<Json<Vec<Session>>> {
    let sessions = state
        .orchestrator
        .repos()
        .sessions
        .list_for_deck(&query.deck_id)
        .await?;
    Ok(Json(sessions))
}

async fn get_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ParleyResult<Json<Vec<Transcript>>> {
    // Validate existence so unknown ids 404 instead of returning []
    state
        .orchestrator
        .repos()
        .sessions
        .get(&session_id)
        .await?
        .ok_or_else(|| ParleyError::SessionNotFound(session_id.clone()))?;
    let transcript = state
        .orchestrator
        .repos()
        .transcripts
        .list_for_session(&session_id)
        .await?;
    Ok(Json(transcript))
}

async fn mark_question_answered(
    State(state): State<AppState>,
    Path((session_id, question_id)): Path<(String, String)>,
) -> ParleyResult<Json<serde_json::Value>> {
    state
        .orchestrator
        .mark_answered(&session_id, &question_id)
        .await?;
    Ok(Json(json!({"ok": true})))
}

async fn delete_question(
    State(state): State<AppState>,
    Path((session_id, question_id)): Path<(String, String)>,
) -> ParleyResult<Json<serde_json::Value>> {
    state
        .orchestrator
        .delete_question(&session_id, &question_id)
        .await?;
    Ok(Json(json!({"ok": true})))
}

/// Builds the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/sessions", post(start_session).get(list_sessions))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/stop", post(stop_session))
        .route("/api/sessions/{id}/transcript", get(get_transcript))
        .route(
            "/api/sessions/{id}/questions/{qid}/answered",
            post(mark_question_answered),
        )
        .route(
            "/api/sessions/{id}/questions/{qid}",
            delete(delete_question),
        )
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
