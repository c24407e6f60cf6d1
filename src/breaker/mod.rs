mod circuit;
mod config;

pub use circuit::{BreakerError, CircuitBreaker, CircuitTransition, spawn_transition_logger};
pub use config::BreakerConfig;
