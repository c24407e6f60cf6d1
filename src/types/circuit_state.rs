use serde::{Deserialize, Serialize};
use specta::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitStatus::Closed => "closed",
            CircuitStatus::Open => "open",
            CircuitStatus::HalfOpen => "half_open",
        }
    }
}

/// Point-in-time view of a breaker, for inspection endpoints and logs.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitStatus,
    pub consecutive_failures: u32,
    pub window_successes: u32,
    pub window_failures: u32,
    /// RFC3339 time the breaker last opened; None while it has never tripped.
    pub opened_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ListBreakersResponse {
    pub breakers: Vec<CircuitSnapshot>,
}
