use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::health::HealthResponse, services::health_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/healthcheck",
    tag = "health",
    responses((
        status = 200,
        description = "Coordinator status, storage backend, and live session count",
        body = HealthResponse
    ))
)]
/// Report whether the coordinator can persist sessions and how many
/// sessions currently hold live sockets.
pub async fn healthcheck(State(state): State<SharedState>) -> Json<HealthResponse> {
    let report = health_service::health_status(&state).await;
    Json(report)
}

/// Configure the health routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/healthcheck", get(healthcheck))
}
