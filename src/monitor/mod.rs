mod config;
mod rate;

pub use config::MonitorConfig;
pub use rate::{RequestRateMonitor, WindowReport, count_requests};
