use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tokio::task::JoinHandle;

use crate::monitor::MonitorConfig;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowReport {
    pub count: u64,
    pub alert: bool,
}

/// Fixed-window request counter. Observability only: it never rejects a request.
#[derive(Debug)]
pub struct RequestRateMonitor {
    count: AtomicU64,
    config: MonitorConfig,
}

impl RequestRateMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            count: AtomicU64::new(0),
            config,
        }
    }

    pub fn record(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn current(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Closes the current window: reports its count and starts a new one at zero.
    pub fn tick(&self) -> WindowReport {
        let count = self.count.swap(0, Ordering::Relaxed);
        let alert = count > self.config.threshold;
        if alert {
            tracing::warn!(
                count,
                threshold = self.config.threshold,
                window_ms = self.config.window.as_millis() as u64,
                "high request load detected"
            );
        } else {
            tracing::trace!(count, "request window closed");
        }
        WindowReport { count, alert }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.window);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                self.tick();
            }
        })
    }
}

pub async fn count_requests(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    state.rate_monitor.record();
    next.run(req).await
}
