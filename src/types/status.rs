use serde::{Deserialize, Serialize};
use specta::Type;

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct GatewayStatusResponse {
    pub status: String,
    pub services: Vec<String>,
}
