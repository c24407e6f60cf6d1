use serde::{Deserialize, Serialize};
use specta::Type;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct SagaRecord {
    pub saga_id: Uuid,
    pub status: SagaStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    Started,
    Completed,
    Failed,
}

impl SagaStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SagaStatus::Started)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct CreateSagaRequest {
    #[serde(rename = "userData")]
    pub user_data: serde_json::Value,
    #[serde(rename = "postData")]
    pub post_data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct CreateSagaResponse {
    #[serde(rename = "sagaId")]
    pub saga_id: Uuid,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "postId")]
    pub post_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct GetSagaResponse {
    pub saga: SagaRecord,
}
