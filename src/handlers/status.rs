use axum::{Json, extract::State};

use crate::{
    error::ApiError,
    state::AppState,
    types::{GatewayStatusResponse, ListBreakersResponse},
};

pub async fn status_handler(
    State(state): State<AppState>,
) -> Result<Json<GatewayStatusResponse>, ApiError> {
    let services = state.registry.list_services().await.map_err(|err| {
        tracing::warn!(error = %err, "failed to list services from registry");
        ApiError::ServiceUnavailable("error fetching services from registry".to_string())
    })?;

    Ok(Json(GatewayStatusResponse {
        status: "Gateway is running".to_string(),
        services,
    }))
}

pub async fn list_breakers_handler(State(state): State<AppState>) -> Json<ListBreakersResponse> {
    Json(ListBreakersResponse {
        breakers: state
            .dispatcher
            .breakers()
            .iter()
            .map(|breaker| breaker.snapshot())
            .collect(),
    })
}
