//! Health probe. Always available, never authenticated.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::http::endpoint::EndpointState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub transport: &'static str,
    /// Live sessions; always 0 in stateless mode.
    pub sessions: usize,
}

pub async fn health(State(state): State<EndpointState>) -> Json<HealthStatus> {
    let sessions = if state.session.mode.is_stateless() {
        0
    } else {
        state.registry.len()
    };
    Json(HealthStatus {
        status: "ok",
        transport: "streamable-http",
        sessions,
    })
}
