use std::time::Duration;

use crate::types::SelfDescriptor;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub self_descriptor: SelfDescriptor,
}

impl RegistryConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("CONSUL_HOST")
            && !value.trim().is_empty()
        {
            config.host = value.trim().to_string();
        }
        if let Ok(value) = std::env::var("CONSUL_PORT")
            && let Ok(parsed) = value.parse::<u16>()
        {
            config.port = parsed;
        }
        if let Ok(value) = std::env::var("REGISTRY_TIMEOUT_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.request_timeout = Duration::from_millis(parsed.max(1));
        }
        if let Ok(value) = std::env::var("GATEWAY_SERVICE_NAME")
            && !value.trim().is_empty()
        {
            config.self_descriptor.name = value.trim().to_string();
        }
        if let Ok(value) = std::env::var("GATEWAY_SERVICE_ID")
            && !value.trim().is_empty()
        {
            config.self_descriptor.id = value.trim().to_string();
        }
        if let Ok(value) = std::env::var("GATEWAY_ADVERTISE_ADDRESS")
            && !value.trim().is_empty()
        {
            config.self_descriptor.address = value.trim().to_string();
        }
        if let Ok(value) = std::env::var("GATEWAY_ADVERTISE_PORT")
            && let Ok(parsed) = value.parse::<u16>()
        {
            config.self_descriptor.port = parsed;
        }

        config
    }

    /// Agent API root, e.g. `http://consul:8500/v1`.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/v1", self.host, self.port)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: "consul".to_string(),
            port: 8500,
            request_timeout: Duration::from_millis(2_000),
            self_descriptor: SelfDescriptor {
                name: "gateway".to_string(),
                id: "gateway".to_string(),
                address: "gateway".to_string(),
                port: 3000,
                tags: vec!["api-gateway".to_string()],
            },
        }
    }
}
