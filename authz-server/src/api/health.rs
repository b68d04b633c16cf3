use crate::openapi::HEALTH_TAG;
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::warn;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Health {
    status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// Reports whether the storage backend answers
#[utoipa::path(
    get,
    path = "/health",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is healthy", body = Health),
        (status = 503, description = "Storage backend is unavailable", body = Health)
    )
)]
async fn health_check(State(state): State<AppState>) -> Response {
    match state.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(Health {
                status: "ok".to_string(),
                detail: None,
            }),
        )
            .into_response(),
        Err(detail) => {
            warn!("Health check failed: {}", detail);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(Health {
                    status: "unavailable".to_string(),
                    detail: Some(detail),
                }),
            )
                .into_response()
        }
    }
}

pub(super) fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(health_check))
}
