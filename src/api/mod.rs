//! HTTP surface over the orchestrator.

pub mod instances;
pub mod templates;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use crate::error::{ErrorKind, TenantBoxError};
use crate::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            started_at: Instant::now(),
        }
    }
}

/// All routes, state attached.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(instances::routes())
        .merge(templates::routes())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
    database: &'static str,
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let database = match state.orchestrator.database().health_check().await {
        Ok(()) => "ok",
        Err(e) => {
            error!("Catalog health check failed: {}", e);
            "unavailable"
        }
    };
    let status = if database == "ok" { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        database,
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::PoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Handler error: a crate error rendered as `{"error": {"kind", "message"}}`.
pub struct ApiError(pub TenantBoxError);

impl From<TenantBoxError> for ApiError {
    fn from(err: TenantBoxError) -> Self {
        Self(err)
    }
}

/// Undecodable or incomplete bodies are invalid input, not 422.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(TenantBoxError::invalid_input(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        (
            status,
            Json(ErrorResponse {
                error: ErrorDetail {
                    kind,
                    message: self.0.to_string(),
                },
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::AlreadyExists), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::PoolExhausted), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorKind::ProxyFailure), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_compensated_error_keeps_primary_status() {
        let err = TenantBoxError::Compensated {
            step: "create_proxy_site",
            source: Box::new(TenantBoxError::PoolExhausted),
            cleanup_errors: vec![TenantBoxError::internal("release failed")],
        };
        let response = ApiError(err).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
