//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the interview API and OpenAPI documentation.

use crate::{
    handlers,
    models::{ErrorResponse, InterviewMode, InterviewRequest, InterviewResponse, SessionView},
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::interview,
        handlers::get_session,
    ),
    components(
        schemas(InterviewRequest, InterviewResponse, InterviewMode, SessionView, ErrorResponse)
    ),
    tags(
        (name = "Interviewer API", description = "Graph-guided technical interview sessions")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/api/interview", post(handlers::interview))
        .route("/api/sessions/{id}", get(handlers::get_session))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_interview_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/interview"));
        assert!(doc.paths.paths.contains_key("/api/sessions/{id}"));
    }
}
