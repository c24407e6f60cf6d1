use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use thiserror::Error;
use tokio::sync::broadcast;

use crate::breaker::{BreakerConfig, BreakerError, CircuitBreaker, CircuitTransition};
use crate::dispatcher::{
    Downstream, DownstreamError, DownstreamRequest, DownstreamResponse, DispatcherConfig,
};
use crate::registry::{RegistryError, ServiceRegistry};
use crate::types::ServiceInstance;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no healthy replica of {service}")]
    NoHealthyReplica { service: String },
    #[error("service registry unavailable: {0}")]
    RegistryUnavailable(#[from] RegistryError),
    #[error("all replicas of {service} failed after {attempts} attempts")]
    AllReplicasExhausted { service: String, attempts: u32 },
    #[error("request deadline of {}ms exceeded", after.as_millis())]
    DeadlineExceeded { after: Duration },
}

enum ReplicaOutcome {
    Success(DownstreamResponse),
    /// Every attempt failed without tripping the breaker.
    Exhausted,
    /// A failure on this replica tripped the service breaker.
    Tripped,
    /// The breaker refused the call before the replica was contacted.
    Rejected,
}

/// Routes a request to the healthy replicas of one logical service, one at a
/// time in registry order. Each logical service gets its own circuit breaker,
/// shared by all of its replicas.
pub struct FailoverDispatcher {
    registry: Arc<dyn ServiceRegistry>,
    downstream: Arc<dyn Downstream>,
    breaker_config: BreakerConfig,
    breakers: Mutex<BTreeMap<String, Arc<CircuitBreaker>>>,
    transitions: broadcast::Sender<CircuitTransition>,
    config: DispatcherConfig,
}

impl FailoverDispatcher {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        downstream: Arc<dyn Downstream>,
        breaker_config: BreakerConfig,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            registry,
            downstream,
            breaker_config,
            breakers: Mutex::new(BTreeMap::new()),
            transitions: CircuitBreaker::transition_channel(),
            config,
        }
    }

    /// The breaker guarding `service`, created on first use.
    pub fn breaker(&self, service: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::with_events(
                    service,
                    self.breaker_config.clone(),
                    self.transitions.clone(),
                ))
            })
            .clone()
    }

    /// Every breaker created so far, ordered by service name.
    pub fn breakers(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Transitions of every breaker this dispatcher owns.
    pub fn subscribe(&self) -> broadcast::Receiver<CircuitTransition> {
        self.transitions.subscribe()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// `dispatch` bounded by the configured request deadline. Dropping the
    /// inner future abandons any retry still in progress.
    pub async fn dispatch_with_deadline(
        &self,
        service: &str,
        request: &DownstreamRequest,
    ) -> Result<DownstreamResponse, DispatchError> {
        let after = self.config.request_deadline;
        match tokio::time::timeout(after, self.dispatch(service, request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(service, path = %request.path, "dispatch deadline exceeded");
                Err(DispatchError::DeadlineExceeded { after })
            }
        }
    }

    pub async fn dispatch(
        &self,
        service: &str,
        request: &DownstreamRequest,
    ) -> Result<DownstreamResponse, DispatchError> {
        let mut replicas: VecDeque<ServiceInstance> =
            self.registry.list_healthy_instances(service).await?.into();
        if replicas.is_empty() {
            tracing::warn!(service, "no healthy replicas registered");
            return Err(DispatchError::NoHealthyReplica {
                service: service.to_string(),
            });
        }

        let breaker = self.breaker(service);
        let mut tried: Vec<ServiceInstance> = Vec::new();
        let mut attempts = 0u32;

        while let Some(replica) = replicas.pop_front() {
            tried.push(replica.clone());
            match self
                .try_replica(&breaker, &replica, request, &mut attempts)
                .await
            {
                ReplicaOutcome::Success(response) => return Ok(response),
                ReplicaOutcome::Exhausted => {
                    self.deregister(&replica).await;
                }
                ReplicaOutcome::Tripped => {
                    self.deregister(&replica).await;
                    replicas = self.requery(service, &tried, replicas).await;
                }
                ReplicaOutcome::Rejected => {
                    replicas = self.requery(service, &tried, replicas).await;
                }
            }
        }

        tracing::error!(service, attempts, replicas = tried.len(), "all replicas failed");
        Err(DispatchError::AllReplicasExhausted {
            service: service.to_string(),
            attempts,
        })
    }

    async fn try_replica(
        &self,
        breaker: &CircuitBreaker,
        replica: &ServiceInstance,
        request: &DownstreamRequest,
        attempts: &mut u32,
    ) -> ReplicaOutcome {
        let max_retries = self.config.max_retries.max(1);

        for attempt in 1..=max_retries {
            let result = breaker
                .execute(|| self.downstream.call(replica, request))
                .await;

            match result {
                Ok(response) => {
                    *attempts += 1;
                    tracing::debug!(
                        service = %replica.service_name,
                        replica = %replica.endpoint(),
                        attempt,
                        "request attempt succeeded"
                    );
                    return ReplicaOutcome::Success(response);
                }
                Err(BreakerError::Open) => {
                    tracing::warn!(
                        service = %replica.service_name,
                        replica = %replica.endpoint(),
                        "circuit open, skipping replica"
                    );
                    return ReplicaOutcome::Rejected;
                }
                Err(err) => {
                    *attempts += 1;
                    log_attempt_failure(replica, attempt, &err);
                    if err.tripped() {
                        return ReplicaOutcome::Tripped;
                    }
                    if attempt < max_retries {
                        let delay = self.config.backoff_delay(attempt);
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        ReplicaOutcome::Exhausted
    }

    /// Fresh healthy list minus replicas already tried. Falls back to the
    /// remaining list when the registry cannot be reached.
    async fn requery(
        &self,
        service: &str,
        tried: &[ServiceInstance],
        remaining: VecDeque<ServiceInstance>,
    ) -> VecDeque<ServiceInstance> {
        match self.registry.list_healthy_instances(service).await {
            Ok(replicas) => replicas
                .into_iter()
                .filter(|replica| !tried.iter().any(|seen| seen.is_same_replica(replica)))
                .collect(),
            Err(err) => {
                tracing::warn!(service, error = %err, "re-query failed, keeping remaining replicas");
                remaining
            }
        }
    }

    async fn deregister(&self, replica: &ServiceInstance) {
        if let Err(err) = self
            .registry
            .deregister(&replica.service_name, &replica.address, replica.port)
            .await
        {
            tracing::warn!(
                service = %replica.service_name,
                replica = %replica.endpoint(),
                error = %err,
                "failed to deregister replica"
            );
        }
    }
}

fn log_attempt_failure(replica: &ServiceInstance, attempt: u32, err: &BreakerError<DownstreamError>) {
    tracing::warn!(
        service = %replica.service_name,
        replica = %replica.endpoint(),
        attempt,
        tripped = err.tripped(),
        error = %err,
        "request attempt failed"
    );
}
