use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use super::{ApiResult, ApiState};
use crate::database::models::DbService;

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/api/templates", get(list_templates))
        .route("/api/ports", get(pool_stats))
}

#[derive(Debug, Serialize)]
struct TemplateList {
    templates: Vec<DbService>,
    total: usize,
}

async fn list_templates(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    let templates = state.orchestrator.list_templates().await?;
    Ok(Json(TemplateList {
        total: templates.len(),
        templates,
    }))
}

/// Pool occupancy: total ports and how many are free.
async fn pool_stats(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.pool_stats().await?))
}
