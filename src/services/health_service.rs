use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Build the health payload, probing the storage backend on the way.
///
/// A failed probe is logged but does not flip the degraded flag by itself;
/// the storage supervisor owns that transition.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let storage = match state.session_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health probe failed");
            }
            store.backend_name()
        }
        None => {
            warn!("health probed while storage is unavailable");
            "unavailable"
        }
    };

    let sessions_online = state.registry().active_sessions();
    if state.is_degraded().await {
        HealthResponse::degraded(storage, sessions_online)
    } else {
        HealthResponse::ok(storage, sessions_online)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::AppConfig;
    use crate::dao::session_store::memory::InMemorySessionStore;
    use crate::state::AppState;

    #[tokio::test]
    async fn reports_backend_and_live_session_count() {
        let state = AppState::new(AppConfig::default());
        state
            .set_session_store(Arc::new(InMemorySessionStore::new()))
            .await;

        let report = health_status(&state).await;
        assert_eq!(report.status, "ok");
        assert_eq!(report.storage, "memory");
        assert_eq!(report.sessions_online, 0);
    }

    #[tokio::test]
    async fn reports_degraded_without_a_store() {
        let state = AppState::new(AppConfig::default());
        state.update_degraded(true).await;

        let report = health_status(&state).await;
        assert_eq!(report.status, "degraded");
        assert_eq!(report.storage, "unavailable");
    }
}
