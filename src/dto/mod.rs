//! Wire payloads exchanged over REST and WebSocket.

use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Session bootstrap payloads and summaries.
pub mod game;
/// Health check payload.
pub mod health;
/// Validation helpers for DTOs.
pub mod validation;
/// WebSocket message catalogue.
pub mod ws;

pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

/// RFC 3339 timestamp for "now", stamped onto every outbound event.
pub(crate) fn now_timestamp() -> String {
    format_system_time(SystemTime::now())
}
