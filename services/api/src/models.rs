//! API Models
//!
//! Request and response bodies of the interview API, annotated for OpenAPI
//! documentation with `utoipa`.

use chrono::{DateTime, Utc};
use interviewer_core::session::SessionSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Session used when a request does not name one.
pub const DEFAULT_SESSION_ID: &str = "test-session";

/// How a turn is answered.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InterviewMode {
    /// Graph- and outline-guided interview with answer evaluation.
    #[default]
    Guided,
    /// Free-form interview against a fine-tuned model.
    Direct,
}

impl fmt::Display for InterviewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterviewMode::Guided => write!(f, "guided"),
            InterviewMode::Direct => write!(f, "direct"),
        }
    }
}

#[derive(Deserialize, ToSchema, Debug, Default)]
pub struct InterviewRequest {
    #[schema(example = "candidate-42")]
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub mode: InterviewMode,
    /// Typed input. Ignored when `audio` is present.
    #[schema(example = "START")]
    #[serde(default)]
    pub text: Option<String>,
    /// Base64-encoded recording of the candidate's answer.
    #[serde(default)]
    pub audio: Option<String>,
    #[schema(example = "answer.wav")]
    #[serde(default)]
    pub audio_filename: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct InterviewResponse {
    /// The candidate's input after speech correction.
    pub user_text: String,
    /// The interviewer's reply.
    pub ai_text: String,
    /// Base64-encoded speech of `ai_text`; empty when synthesis is unavailable.
    pub audio: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct SessionView {
    #[schema(value_type = String, example = "looping")]
    pub stage: String,
    pub outline: Vec<String>,
    pub outline_index: usize,
    pub used_question_ids: Vec<String>,
    pub outline_keywords_handled: usize,
    pub last_question: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl From<SessionSnapshot> for SessionView {
    fn from(snapshot: SessionSnapshot) -> Self {
        let stage = serde_json::to_value(snapshot.stage)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            stage,
            outline: snapshot.outline,
            outline_index: snapshot.outline_index,
            used_question_ids: snapshot.used_question_ids,
            outline_keywords_handled: snapshot.outline_keywords_handled,
            last_question: snapshot.last_question,
            created_at: snapshot.created_at,
            last_active: snapshot.last_active,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use interviewer_core::session::Stage;

    #[test]
    fn test_mode_deserialization_and_default() {
        let direct: InterviewMode = serde_json::from_str("\"direct\"").unwrap();
        assert_eq!(direct, InterviewMode::Direct);
        assert_eq!(InterviewMode::default(), InterviewMode::Guided);
        assert_eq!(format!("{}", InterviewMode::Direct), "direct");
    }

    #[test]
    fn test_request_defaults() {
        let request: InterviewRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.session_id, None);
        assert_eq!(request.mode, InterviewMode::Guided);
        assert!(request.text.is_none());
        assert!(request.audio.is_none());

        let request: InterviewRequest =
            serde_json::from_str(r#"{"session_id": "abc", "mode": "direct", "text": "hi"}"#)
                .unwrap();
        assert_eq!(request.session_id.as_deref(), Some("abc"));
        assert_eq!(request.mode, InterviewMode::Direct);
        assert_eq!(request.text.as_deref(), Some("hi"));
    }

    #[test]
    fn test_session_view_from_snapshot() {
        let now = Utc::now();
        let view = SessionView::from(SessionSnapshot {
            stage: Stage::AwaitingBackground,
            outline: vec!["JVM".to_string()],
            outline_index: 0,
            used_question_ids: vec![],
            outline_keywords_handled: 0,
            last_question: "Hello".to_string(),
            created_at: now,
            last_active: now,
        });
        assert_eq!(view.stage, "awaiting_background");
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains("\"outline\":[\"JVM\"]"));
    }
}
