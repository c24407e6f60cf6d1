mod client;
mod config;

pub use client::{ConsulRegistry, RegistryError, ServiceRegistry, register_self};
pub use config::RegistryConfig;
