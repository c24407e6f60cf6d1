use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatcher::{DownstreamRequest, DownstreamResponse, FailoverDispatcher};
use crate::saga::{SagaConfig, SagaContext, SagaStep, StepError};

pub const CREATE_USER_STEP: &str = "create_user";
pub const CREATE_POST_STEP: &str = "create_post";

/// The create-user / create-post pipeline behind `POST /api/saga/create`.
pub fn user_post_steps(
    dispatcher: Arc<FailoverDispatcher>,
    config: &SagaConfig,
    user_data: Value,
    post_data: Value,
) -> Vec<Arc<dyn SagaStep>> {
    vec![
        Arc::new(CreateUserStep {
            dispatcher: dispatcher.clone(),
            service: config.user_service.clone(),
            user_data,
        }),
        Arc::new(CreatePostStep {
            dispatcher,
            service: config.post_service.clone(),
            post_data,
        }),
    ]
}

pub struct CreateUserStep {
    pub dispatcher: Arc<FailoverDispatcher>,
    pub service: String,
    pub user_data: Value,
}

#[async_trait]
impl SagaStep for CreateUserStep {
    fn name(&self) -> &str {
        CREATE_USER_STEP
    }

    async fn execute(&self, _ctx: &SagaContext) -> Result<String, StepError> {
        let request = DownstreamRequest::post("/api/users/register", self.user_data.clone());
        let response = self
            .dispatcher
            .dispatch_with_deadline(&self.service, &request)
            .await?;
        entity_id(&response)
    }

    async fn compensate(&self, entity_id: &str) -> Result<(), StepError> {
        let request = DownstreamRequest::delete(format!("/api/users/{entity_id}"));
        self.dispatcher
            .dispatch_with_deadline(&self.service, &request)
            .await?;
        Ok(())
    }
}

pub struct CreatePostStep {
    pub dispatcher: Arc<FailoverDispatcher>,
    pub service: String,
    pub post_data: Value,
}

#[async_trait]
impl SagaStep for CreatePostStep {
    fn name(&self) -> &str {
        CREATE_POST_STEP
    }

    async fn execute(&self, ctx: &SagaContext) -> Result<String, StepError> {
        let user_id = ctx
            .entity_id(CREATE_USER_STEP)
            .ok_or_else(|| StepError::Rejected("post requires a created user".to_string()))?;
        let Value::Object(mut body) = self.post_data.clone() else {
            return Err(StepError::Rejected("postData must be a JSON object".to_string()));
        };
        let user_id = user_id
            .parse::<i64>()
            .map_or_else(|_| Value::String(user_id.to_string()), Value::from);
        body.insert("user_id".to_string(), user_id);

        let request = DownstreamRequest::post("/api/posts/", Value::Object(body));
        let response = self
            .dispatcher
            .dispatch_with_deadline(&self.service, &request)
            .await?;
        entity_id(&response)
    }

    async fn compensate(&self, entity_id: &str) -> Result<(), StepError> {
        let request = DownstreamRequest::delete(format!("/api/posts/{entity_id}"));
        self.dispatcher
            .dispatch_with_deadline(&self.service, &request)
            .await?;
        Ok(())
    }
}

/// Reads the `id` of the created entity; services return it as a number or string.
fn entity_id(response: &DownstreamResponse) -> Result<String, StepError> {
    let body = response
        .json()
        .map_err(|err| StepError::InvalidResponse(format!("body is not JSON: {err}")))?;
    match body.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(StepError::InvalidResponse("response has no id".to_string())),
    }
}
