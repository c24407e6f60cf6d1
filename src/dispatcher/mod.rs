mod config;
mod downstream;
mod failover;

pub use config::DispatcherConfig;
pub use downstream::{Downstream, DownstreamError, DownstreamRequest, DownstreamResponse, HttpDownstream};
pub use failover::{DispatchError, FailoverDispatcher};
