pub mod config;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::SourceInfo;
use crate::error::Result;
use crate::relay::SessionInfo;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_sessions: usize,
    pub transcoders_launched: u64,
    /// Clients attached to the event feed
    pub event_listeners: usize,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.relay.registry().len(),
        transcoders_launched: state.relay.launch_count(),
        event_listeners: state.events.subscriber_count(),
    })
}

#[derive(Serialize)]
pub struct SessionsResponse {
    pub success: bool,
    pub sessions: Vec<SessionInfo>,
}

/// Active relay sessions, oldest first
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionsResponse> {
    Json(SessionsResponse {
        success: true,
        sessions: state.relay.sessions(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcesQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    100
}

#[derive(Serialize)]
pub struct SourcesResponse {
    pub success: bool,
    pub page: u32,
    pub sources: Vec<SourceInfo>,
}

/// Camera sources from the catalog
pub async fn list_sources(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SourcesQuery>,
) -> Result<Json<SourcesResponse>> {
    let sources = state
        .catalog()
        .list_sources(query.page, query.per_page)
        .await?;
    Ok(Json(SourcesResponse {
        success: true,
        page: query.page,
        sources,
    }))
}
