use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::dispatcher::{Downstream, FailoverDispatcher};
use crate::monitor::RequestRateMonitor;
use crate::registry::ServiceRegistry;
use crate::saga::{SagaConfig, SagaCoordinator, SagaStore};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn ServiceRegistry>,
    pub dispatcher: Arc<FailoverDispatcher>,
    pub sagas: Arc<SagaCoordinator>,
    pub saga_config: SagaConfig,
    pub rate_monitor: Arc<RequestRateMonitor>,
    pub admin_api_token: Option<String>,
}

impl AppState {
    /// Wires the gateway components from configuration. Background tasks
    /// (transition logging, rate ticks) are left to the caller.
    pub fn from_config(
        config: &GatewayConfig,
        registry: Arc<dyn ServiceRegistry>,
        downstream: Arc<dyn Downstream>,
        store: Arc<dyn SagaStore>,
    ) -> Self {
        let dispatcher = Arc::new(FailoverDispatcher::new(
            registry.clone(),
            downstream,
            config.breaker.clone(),
            config.dispatcher.clone(),
        ));
        // Known services show up in `/internal/breakers` before their first call.
        for service in [&config.saga.user_service, &config.saga.post_service] {
            dispatcher.breaker(service);
        }

        Self {
            registry,
            dispatcher,
            sagas: Arc::new(SagaCoordinator::new(store)),
            saga_config: config.saga.clone(),
            rate_monitor: Arc::new(RequestRateMonitor::new(config.monitor.clone())),
            admin_api_token: config.admin_api_token.clone(),
        }
    }
}
