#[derive(Debug, Clone)]
pub struct SagaConfig {
    pub user_service: String,
    pub post_service: String,
}

impl SagaConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("USER_SERVICE_NAME")
            && !value.trim().is_empty()
        {
            config.user_service = value.trim().to_string();
        }
        if let Ok(value) = std::env::var("POST_SERVICE_NAME")
            && !value.trim().is_empty()
        {
            config.post_service = value.trim().to_string();
        }

        config
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            user_service: "user-service".to_string(),
            post_service: "recommendation-service".to_string(),
        }
    }
}
