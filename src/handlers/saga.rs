use axum::{Json, extract::State};
use uuid::Uuid;

use crate::{
    error::ApiError,
    extractors::{ValidJson, ValidPath},
    saga::{CREATE_POST_STEP, CREATE_USER_STEP, SagaError, StoreError, user_post_steps},
    state::AppState,
    types::{CreateSagaRequest, CreateSagaResponse, GetSagaResponse},
};

pub async fn create_saga_handler(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<CreateSagaRequest>,
) -> Result<Json<CreateSagaResponse>, ApiError> {
    validate_request(&req)?;

    let steps = user_post_steps(
        state.dispatcher.clone(),
        &state.saga_config,
        req.user_data,
        req.post_data,
    );
    let outcome = state
        .sagas
        .run_saga(&steps)
        .await
        .map_err(map_saga_error)?;

    let user_id = outcome
        .entity_id(CREATE_USER_STEP)
        .ok_or_else(|| ApiError::Internal("saga produced no user".to_string()))?
        .to_string();
    let post_id = outcome
        .entity_id(CREATE_POST_STEP)
        .ok_or_else(|| ApiError::Internal("saga produced no post".to_string()))?
        .to_string();

    Ok(Json(CreateSagaResponse {
        saga_id: outcome.saga_id,
        user_id,
        post_id,
    }))
}

pub async fn get_saga_handler(
    State(state): State<AppState>,
    ValidPath(saga_id): ValidPath<String>,
) -> Result<Json<GetSagaResponse>, ApiError> {
    let saga_id = Uuid::parse_str(saga_id.trim())
        .map_err(|_| ApiError::validation("saga_id must be a UUID"))?;

    let saga = state
        .sagas
        .store()
        .get(saga_id)
        .await
        .map_err(map_store_error)?;

    Ok(Json(GetSagaResponse { saga }))
}

fn validate_request(req: &CreateSagaRequest) -> Result<(), ApiError> {
    if !req.user_data.is_object() {
        return Err(ApiError::validation("userData must be a JSON object"));
    }
    if !req.post_data.is_object() {
        return Err(ApiError::validation("postData must be a JSON object"));
    }
    Ok(())
}

fn map_saga_error(err: SagaError) -> ApiError {
    match err {
        SagaError::Persistence(_) => ApiError::Internal("failed to record saga".to_string()),
        SagaError::StepFailed { step, source, .. } => {
            ApiError::Internal(format!("saga failed at {step} and was rolled back: {source}"))
        }
        SagaError::Finalize { .. } => ApiError::Internal("failed to finalize saga".to_string()),
    }
}

fn map_store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::Conflict(message) => ApiError::Conflict(message),
        StoreError::Db(db) => ApiError::Db(db),
        StoreError::NotFound(message) => ApiError::NotFound(message),
        StoreError::Parse(message) => ApiError::Internal(message),
    }
}
