//! The C7 Signaling Hub: a pub/sub room router over WebSocket that enforces
//! office join/leave rules and forwards point-to-point tool-call traffic
//! between Agents and Computers.

pub mod error;
pub mod hub;
pub mod outgoing;
pub mod rooms;
pub mod session;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

pub use error::HubError;
pub use hub::Hub;

/// Builds the axum router serving the hub's single WebSocket endpoint.
/// Callers own binding the listener and running `axum::serve`.
pub fn router(hub: Arc<Hub>) -> Router {
    Router::new().route("/socket.io", get(ws::ws_handler)).layer(TraceLayer::new_for_http()).with_state(hub)
}
