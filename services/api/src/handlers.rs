//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling interview turns and session
//! inspection. It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64::{Engine, prelude::BASE64_STANDARD};
use interviewer_core::{
    interviewer::START_SENTINEL,
    speech::{synthesize_or_silence, transcribe_or_placeholder},
};
use std::sync::Arc;
use tracing::info;

use crate::{
    models::{
        DEFAULT_SESSION_ID, ErrorResponse, InterviewMode, InterviewRequest, InterviewResponse,
        SessionView,
    },
    state::AppState,
};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
        }
    }
}

/// Run one interview turn.
///
/// Audio, when present, is transcribed and takes precedence over `text`.
/// Empty input (re)starts the interview.
#[utoipa::path(
    post,
    path = "/api/interview",
    request_body = InterviewRequest,
    responses(
        (status = 200, description = "The interviewer's reply", body = InterviewResponse),
        (status = 400, description = "Bad request", body = ErrorResponse)
    )
)]
pub async fn interview(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<InterviewRequest>,
) -> Result<Json<InterviewResponse>, ApiError> {
    let session_id = payload
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());

    let mut user_text = payload.text.unwrap_or_default();
    if let Some(encoded) = payload.audio.filter(|a| !a.is_empty()) {
        let audio = BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| ApiError::BadRequest(format!("`audio` is not valid base64: {}", e)))?;
        let stt = state.stt.as_ref().ok_or_else(|| {
            ApiError::BadRequest("Speech-to-text is not configured on this server".to_string())
        })?;
        let file_name = payload
            .audio_filename
            .unwrap_or_else(|| "answer.wav".to_string());
        user_text = transcribe_or_placeholder(stt.as_ref(), audio, &file_name).await;
    }

    if user_text.trim().is_empty() {
        user_text = START_SENTINEL.to_string();
    }
    info!(session_id = %session_id, mode = %payload.mode, "Interview request received");

    let (user_text, ai_text) = match payload.mode {
        InterviewMode::Guided => {
            let outcome = state
                .interviewer
                .handle_turn(&session_id, &state.config.guided_model, &user_text)
                .await;
            (outcome.corrected_user_text, outcome.reply)
        }
        InterviewMode::Direct => {
            let reply = state
                .interviewer
                .direct_turn(&session_id, &state.config.direct_model, &user_text)
                .await;
            (user_text, reply)
        }
    };

    let audio = match &state.tts {
        Some(tts) => BASE64_STANDARD.encode(synthesize_or_silence(tts.as_ref(), &ai_text).await),
        None => String::new(),
    };

    Ok(Json(InterviewResponse {
        user_text,
        ai_text,
        audio,
    }))
}

/// Get the current state of an interview session.
#[utoipa::path(
    get,
    path = "/api/sessions/{id}",
    responses(
        (status = 200, description = "Session details", body = SessionView),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Session ID")
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let snapshot = state
        .interviewer
        .snapshot(&id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session with id '{}' not found", id)))?;
    Ok(Json(SessionView::from(snapshot)))
}
