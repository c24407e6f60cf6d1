pub mod auth;
pub mod breaker;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod monitor;
pub mod registry;
pub mod router;
pub mod saga;
pub mod state;
pub mod types;
