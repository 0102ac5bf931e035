//! WebSocket transport
//!
//! A pure observer of the orchestrator: streams activity events out,
//! never drives the state machine.

pub mod events;

use axum::routing::get;
use axum::Router;

use crate::server::AppState;

/// Assemble the WebSocket routes
pub fn router() -> Router<AppState> {
    Router::new().route("/ws/events", get(events::events_handler))
}
