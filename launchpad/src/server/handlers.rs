//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use launchpad_models::{
    DeploymentListResponse, DeploymentRequest, ErrorResponse, HealthResponse, NotFoundResponse,
    VersionResponse,
};
use tracing::{error, warn};

use crate::errors::DeployError;
use crate::query::DeploymentLookup;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// A [`DeployError`] rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub DeployError);

impl From<DeployError> for ApiError {
    fn from(err: DeployError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            DeployError::ValidationError(_) => StatusCode::BAD_REQUEST,
            DeployError::TemplateNotFound { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            DeployError::AlreadyInProgress(_) => StatusCode::CONFLICT,
            DeployError::NotFound(_) => StatusCode::NOT_FOUND,
            DeployError::ReconcileQueryError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "launchpad".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Start a deployment; answers once the `in_progress` record is stored
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<DeploymentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body.map_err(|rejection| DeployError::ValidationError(rejection.body_text()))?;
    let record = state.orchestrator.orchestrate(request).await?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

/// List every known deployment
pub async fn list_handler(State(state): State<Arc<ServerState>>) -> Result<impl IntoResponse, ApiError> {
    let deployments = state.query.list_deployments().await?;
    let total = deployments.len();
    Ok(Json(DeploymentListResponse { deployments, total }))
}

/// Status of one deployment
pub async fn status_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_name): Path<String>,
) -> Result<Response, ApiError> {
    Ok(match state.query.get_deployment_status(&project_name).await? {
        DeploymentLookup::Found(record) => Json(record).into_response(),
        DeploymentLookup::NotFound(project_name) => {
            (StatusCode::NOT_FOUND, Json(NotFoundResponse::new(project_name))).into_response()
        }
    })
}

/// Reconcile one deployment against the control plane now
pub async fn refresh_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.query.refresh(&project_name).await?;
    Ok(Json(record))
}
