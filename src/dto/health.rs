use serde::Serialize;
use utoipa::ToSchema;

/// Payload of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"`, or `"degraded"` while the session store is unreachable.
    pub status: String,
    /// Backend currently persisting sessions (`"mongodb"`, `"memory"`,
    /// or `"unavailable"`).
    pub storage: String,
    /// Sessions with at least one live socket on this instance.
    pub sessions_online: usize,
}

impl HealthResponse {
    /// Healthy report for the given backend.
    pub fn ok(storage: &str, sessions_online: usize) -> Self {
        Self {
            status: "ok".to_string(),
            storage: storage.to_string(),
            sessions_online,
        }
    }

    /// Degraded-mode report for the given backend.
    pub fn degraded(storage: &str, sessions_online: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            storage: storage.to_string(),
            sessions_online,
        }
    }
}
