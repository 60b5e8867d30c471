use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use crate::{
    dto::game::{CreateSessionRequest, SessionSummary},
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Routes handling session bootstrap operations (creation & lookup).
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{code}", get(get_session_by_code))
}

/// Create a fresh session with its riddle list and persist it.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created", body = SessionSummary),
        (status = 400, description = "Invalid creation request"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = session_service::create_session(&state, payload).await?;
    Ok(Json(summary))
}

/// Look a session up by its six-character join code.
#[utoipa::path(
    get,
    path = "/sessions/{code}",
    tag = "sessions",
    params(("code" = String, Path, description = "Six-character join code")),
    responses(
        (status = 200, description = "Session found", body = SessionSummary),
        (status = 404, description = "No session with that code")
    )
)]
pub async fn get_session_by_code(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = session_service::find_by_code(&state, &code).await?;
    Ok(Json(summary))
}
