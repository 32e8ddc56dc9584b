use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ApiResult, ApiState};
use crate::database::models::{DbInstance, InstanceFilter};
use crate::orchestrator::CreateInstanceRequest;

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/api/instances", post(create_instance).get(list_instances))
        .route("/api/instances/:id", get(get_instance).delete(delete_instance))
        .route("/api/instances/:id/status", get(instance_status))
        .route("/api/instances/:id/logs", get(instance_logs))
        .route("/api/instances/:id/stop", post(stop_instance))
        .route("/api/instances/:id/start", post(start_instance))
        .route("/api/instances/:id/restart", post(restart_instance))
        .route("/api/instances/:id/redeploy", post(redeploy_instance))
        .route("/api/instances/:id/backup", post(backup_instance))
        .route("/api/instances/:id/repoint", post(repoint_instance))
}

#[derive(Debug, Serialize)]
struct InstanceList {
    instances: Vec<DbInstance>,
    total: usize,
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    lines: Option<usize>,
}

#[derive(Debug, Serialize)]
struct LogsResponse {
    identifier: String,
    logs: String,
}

async fn create_instance(
    State(state): State<ApiState>,
    payload: Result<Json<CreateInstanceRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    debug!("Create instance request: {:?}", request);
    let created = state.orchestrator.create_instance(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_instances(
    State(state): State<ApiState>,
    Query(filter): Query<InstanceFilter>,
) -> ApiResult<impl IntoResponse> {
    let instances = state.orchestrator.list_instances(&filter).await?;
    Ok(Json(InstanceList {
        total: instances.len(),
        instances,
    }))
}

async fn get_instance(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.get_instance(&id).await?))
}

async fn instance_status(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.instance_status(&id).await?))
}

async fn instance_logs(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<impl IntoResponse> {
    let logs = state.orchestrator.instance_logs(&id, query.lines).await?;
    Ok(Json(LogsResponse { identifier: id, logs }))
}

async fn stop_instance(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.stop_instance(&id).await?))
}

async fn start_instance(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.start_instance(&id).await?))
}

async fn restart_instance(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.restart_instance(&id).await?))
}

async fn redeploy_instance(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    info!("Redeploying instance {}", id);
    Ok(Json(state.orchestrator.redeploy_instance(&id).await?))
}

async fn backup_instance(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let backup = state.orchestrator.backup_instance(&id).await?;
    Ok((StatusCode::CREATED, Json(backup)))
}

async fn repoint_instance(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.repoint_instance(&id).await?))
}

async fn delete_instance(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.delete_instance(&id).await?))
}
