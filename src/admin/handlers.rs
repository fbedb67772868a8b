use axum::{extract::State, Json};
use serde::Serialize;

use crate::config::RouteConfig;
use crate::http::server::AppState;
use crate::resilience::BreakerSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub routes: usize,
    pub breakers: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        routes: state.engine.routes().len(),
        breakers: state.engine.breakers().len(),
    })
}

/// Routes as configured, in match order.
pub async fn get_routes(State(state): State<AppState>) -> Json<Vec<RouteConfig>> {
    Json(state.config.routes.clone())
}

pub async fn get_breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.engine.breakers().snapshots())
}
