use serde::{Deserialize, Serialize};
use specta::Type;

/// One replica of a logical backend service as last reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
pub struct ServiceInstance {
    pub service_name: String,
    pub address: String,
    pub port: u16,
    pub health_status: HealthStatus,
}

impl ServiceInstance {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }

    pub fn is_same_replica(&self, other: &ServiceInstance) -> bool {
        self.service_name == other.service_name
            && self.address == other.address
            && self.port == other.port
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Passing,
    Warning,
    Critical,
}

impl HealthStatus {
    /// Parses a registry check status. Unknown values are treated as critical.
    pub fn from_check(status: &str) -> Self {
        match status {
            "passing" => Self::Passing,
            "warning" => Self::Warning,
            _ => Self::Critical,
        }
    }
}

/// Descriptor the gateway uses to register itself.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct SelfDescriptor {
    pub name: String,
    pub id: String,
    pub address: String,
    pub port: u16,
    pub tags: Vec<String>,
}
