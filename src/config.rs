use crate::breaker::BreakerConfig;
use crate::dispatcher::DispatcherConfig;
use crate::monitor::MonitorConfig;
use crate::registry::RegistryConfig;
use crate::saga::SagaConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub admin_api_token: Option<String>,
    pub log_format: LogFormat,
    pub registry: RegistryConfig,
    pub breaker: BreakerConfig,
    pub dispatcher: DispatcherConfig,
    pub saga: SagaConfig,
    pub monitor: MonitorConfig,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let bind_addr = std::env::var("GATEWAY_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:gateway.db".to_string());
        let admin_api_token = std::env::var("GATEWAY_ADMIN_API_TOKEN")
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        let log_format = match std::env::var("GATEWAY_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let dispatcher = DispatcherConfig::from_env();

        Self {
            bind_addr,
            database_url,
            admin_api_token,
            log_format,
            registry: RegistryConfig::from_env(),
            breaker: BreakerConfig::from_env().fit_retry_budget(dispatcher.max_retries),
            dispatcher,
            saga: SagaConfig::from_env(),
            monitor: MonitorConfig::from_env(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let dispatcher = DispatcherConfig::default();

        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            database_url: "sqlite:gateway.db".to_string(),
            admin_api_token: None,
            log_format: LogFormat::Pretty,
            registry: RegistryConfig::default(),
            breaker: BreakerConfig::default().fit_retry_budget(dispatcher.max_retries),
            dispatcher,
            saga: SagaConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}
