use axum::{
    body::{Body, Bytes},
    extract::{OriginalUri, State},
    http::{Method, StatusCode, header::CONTENT_TYPE},
    response::Response,
};
use serde_json::Value;

use crate::{
    dispatcher::{DownstreamRequest, DownstreamResponse},
    error::ApiError,
    state::AppState,
};

pub async fn proxy_users_handler(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> Result<Response, ApiError> {
    let service = state.saga_config.user_service.clone();
    forward(&state, &service, method, &uri, &body).await
}

pub async fn proxy_posts_handler(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> Result<Response, ApiError> {
    let service = state.saga_config.post_service.clone();
    forward(&state, &service, method, &uri, &body).await
}

/// Sends the request, path and query unchanged, to a healthy replica of
/// `service` and relays the replica's status and body.
async fn forward(
    state: &AppState,
    service: &str,
    method: Method,
    uri: &axum::http::Uri,
    body: &[u8],
) -> Result<Response, ApiError> {
    let path = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());
    let body = parse_body(body)?;
    let request = DownstreamRequest::new(method, path, body);

    let response = state
        .dispatcher
        .dispatch_with_deadline(service, &request)
        .await?;

    relay(response)
}

/// Rebuilds the replica's answer, keeping its status and content type.
fn relay(response: DownstreamResponse) -> Result<Response, ApiError> {
    let status = StatusCode::from_u16(response.status).map_err(|_| {
        ApiError::BadGateway(format!("replica returned invalid status {}", response.status))
    })?;
    let content_type = response
        .content_type
        .unwrap_or_else(|| "application/json".to_string());

    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .body(Body::from(response.body))
        .map_err(|err| ApiError::BadGateway(format!("invalid replica response: {err}")))
}

fn parse_body(body: &[u8]) -> Result<Option<Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|err| ApiError::validation(format!("request body must be JSON: {err}")))
}
