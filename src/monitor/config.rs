use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub window: Duration,
    /// Alert when a window sees more requests than this.
    pub threshold: u64,
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("RATE_MONITOR_WINDOW_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.window = Duration::from_millis(parsed.max(1));
        }
        if let Ok(value) = std::env::var("RATE_MONITOR_THRESHOLD")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.threshold = parsed;
        }

        config
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(100),
            threshold: 5,
        }
    }
}
