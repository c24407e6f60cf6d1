use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::RegistryConfig;
use crate::types::{HealthStatus, SelfDescriptor, ServiceInstance};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to build registry client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("registry unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("registry returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid registry response: {0}")]
    Decode(String),
    #[error("invalid registry url {0}")]
    InvalidUrl(String),
}

/// Service discovery seen from the gateway. Implementations keep no state
/// between calls; every lookup goes back to the registry.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Idempotent upsert of the gateway's own entry.
    async fn register(&self, descriptor: &SelfDescriptor) -> Result<(), RegistryError>;

    /// Replicas of `service_name` whose checks all pass, in registry order.
    /// An empty list means the registry answered but nothing qualifies.
    async fn list_healthy_instances(
        &self,
        service_name: &str,
    ) -> Result<Vec<ServiceInstance>, RegistryError>;

    /// Removes the replica matching service name, address and port.
    /// Returns `false` when no registry entry matched.
    async fn deregister(
        &self,
        service_name: &str,
        address: &str,
        port: u16,
    ) -> Result<bool, RegistryError>;

    /// Distinct names of every registered service, sorted.
    async fn list_services(&self) -> Result<Vec<String>, RegistryError>;
}

/// Registers the gateway, logging instead of failing so startup is never
/// blocked by the registry.
pub async fn register_self(registry: &dyn ServiceRegistry, descriptor: &SelfDescriptor) {
    match registry.register(descriptor).await {
        Ok(()) => tracing::info!(
            service = %descriptor.name,
            id = %descriptor.id,
            "gateway registered with service registry"
        ),
        Err(err) => tracing::error!(
            service = %descriptor.name,
            error = %err,
            "failed to register gateway with service registry"
        ),
    }
}

/// `ServiceRegistry` over the Consul agent HTTP API.
#[derive(Debug, Clone)]
pub struct ConsulRegistry {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl ConsulRegistry {
    pub fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        Self::with_base_url(config.base_url(), config.request_timeout)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let base_url = base_url.into();
        let base_url = reqwest::Url::parse(&base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or(RegistryError::InvalidUrl(base_url))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(RegistryError::Client)?;

        Ok(Self {
            client,
            base_url,
        })
    }

    /// Appends `segments` to the base URL, percent-encoding each one so a
    /// name containing `/`, `?` or spaces stays a single path segment.
    fn url(&self, segments: &[&str]) -> Result<reqwest::Url, RegistryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RegistryError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn agent_services(&self) -> Result<BTreeMap<String, AgentService>, RegistryError> {
        let response = self
            .client
            .get(self.url(&["agent", "services"])?)
            .send()
            .await
            .map_err(RegistryError::Unreachable)?;
        let response = ensure_success(response).await?;
        response
            .json::<BTreeMap<String, AgentService>>()
            .await
            .map_err(|err| RegistryError::Decode(format!("agent services: {err}")))
    }
}

#[async_trait]
impl ServiceRegistry for ConsulRegistry {
    async fn register(&self, descriptor: &SelfDescriptor) -> Result<(), RegistryError> {
        let body = RegisterBody {
            name: &descriptor.name,
            id: &descriptor.id,
            address: &descriptor.address,
            port: descriptor.port,
            tags: &descriptor.tags,
        };
        let response = self
            .client
            .put(self.url(&["agent", "service", "register"])?)
            .json(&body)
            .send()
            .await
            .map_err(RegistryError::Unreachable)?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn list_healthy_instances(
        &self,
        service_name: &str,
    ) -> Result<Vec<ServiceInstance>, RegistryError> {
        let response = self
            .client
            .get(self.url(&["health", "service", service_name])?)
            .send()
            .await
            .map_err(RegistryError::Unreachable)?;
        let response = ensure_success(response).await?;
        let entries = response
            .json::<Vec<HealthEntry>>()
            .await
            .map_err(|err| RegistryError::Decode(format!("health entries: {err}")))?;

        let total = entries.len();
        let healthy: Vec<ServiceInstance> = entries
            .into_iter()
            .filter(HealthEntry::all_passing)
            .map(|entry| ServiceInstance {
                service_name: service_name.to_string(),
                address: entry.service.address,
                port: entry.service.port,
                health_status: HealthStatus::Passing,
            })
            .collect();

        tracing::debug!(
            service = service_name,
            total,
            healthy = healthy.len(),
            "queried registry health"
        );
        Ok(healthy)
    }

    async fn deregister(
        &self,
        service_name: &str,
        address: &str,
        port: u16,
    ) -> Result<bool, RegistryError> {
        let services = self.agent_services().await?;
        let Some(id) = services.into_iter().find_map(|(id, service)| {
            (service.service == service_name && service.address == address && service.port == port)
                .then_some(id)
        }) else {
            tracing::info!(
                service = service_name,
                replica = %format!("{address}:{port}"),
                "no registry entry to deregister"
            );
            return Ok(false);
        };

        let response = self
            .client
            .put(self.url(&["agent", "service", "deregister", id.as_str()])?)
            .send()
            .await
            .map_err(RegistryError::Unreachable)?;
        ensure_success(response).await?;

        tracing::warn!(
            service = service_name,
            replica = %format!("{address}:{port}"),
            id = %id,
            "deregistered replica"
        );
        Ok(true)
    }

    async fn list_services(&self) -> Result<Vec<String>, RegistryError> {
        let mut names: Vec<String> = self
            .agent_services()
            .await?
            .into_values()
            .map(|service| service.service)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, RegistryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RegistryError::Status {
        status: status.as_u16(),
        body,
    })
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Address")]
    address: &'a str,
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Tags")]
    tags: &'a [String],
}

#[derive(Deserialize)]
struct AgentService {
    #[serde(rename = "Service")]
    service: String,
    #[serde(rename = "Address", default)]
    address: String,
    #[serde(rename = "Port", default)]
    port: u16,
}

#[derive(Deserialize)]
struct HealthEntry {
    #[serde(rename = "Service")]
    service: HealthService,
    #[serde(rename = "Checks", default)]
    checks: Vec<HealthCheck>,
}

impl HealthEntry {
    /// An entry with no checks has never passed one and is not eligible.
    fn all_passing(&self) -> bool {
        !self.checks.is_empty()
            && self
                .checks
                .iter()
                .all(|check| HealthStatus::from_check(&check.status) == HealthStatus::Passing)
    }
}

#[derive(Deserialize)]
struct HealthService {
    #[serde(rename = "Address", default)]
    address: String,
    #[serde(rename = "Port", default)]
    port: u16,
}

#[derive(Deserialize)]
struct HealthCheck {
    #[serde(rename = "Status")]
    status: String,
}
