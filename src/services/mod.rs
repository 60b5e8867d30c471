/// Battle-action resolution and answer scoring arithmetic.
pub mod battle;
/// Bot participant behavior.
pub mod bot;
/// WebSocket game coordination: joins, rounds, battle actions.
pub mod coordinator;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Answer judging with normalization and typo tolerance.
pub mod judge;
/// Session creation and lookup.
pub mod session_service;
/// Storage connection supervisor with reconnect and degraded mode.
pub mod storage_supervisor;
