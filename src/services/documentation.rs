use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Riddle Rumble.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::create_session,
        crate::routes::session::get_session_by_code,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::CreateSessionRequest,
            crate::dto::game::RiddleInput,
            crate::dto::game::SessionSummary,
            crate::dto::game::ParticipantSummary,
            crate::dto::game::RiddleSnapshot,
            crate::dto::game::LeaderboardEntry,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerEvent,
            crate::dto::ws::BattleEffect,
            crate::dao::models::SpriteKind,
            crate::dao::models::BattleAction,
            crate::dao::models::SessionStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Session creation and lookup"),
        (name = "game", description = "WebSocket operations for game clients"),
    )
)]
pub struct ApiDoc;
