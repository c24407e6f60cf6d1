use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub call_timeout: Duration,
    /// Percentage (1..=100) of failed calls in the window that trips the breaker.
    pub error_threshold_percentage: u32,
    /// Minimum number of outcomes in the window before the rate is evaluated.
    pub volume_threshold: u32,
    pub rolling_window_size: usize,
    pub rolling_window_duration: Duration,
    pub reset_timeout: Duration,
}

impl BreakerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("BREAKER_CALL_TIMEOUT_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.call_timeout = Duration::from_millis(parsed.max(1));
        }
        if let Ok(value) = std::env::var("BREAKER_ERROR_THRESHOLD_PERCENTAGE")
            && let Ok(parsed) = value.parse::<u32>()
        {
            config.error_threshold_percentage = parsed.clamp(1, 100);
        }
        if let Ok(value) = std::env::var("BREAKER_VOLUME_THRESHOLD")
            && let Ok(parsed) = value.parse::<u32>()
        {
            config.volume_threshold = parsed.max(1);
        }
        if let Ok(value) = std::env::var("BREAKER_ROLLING_WINDOW_SIZE")
            && let Ok(parsed) = value.parse::<usize>()
        {
            config.rolling_window_size = parsed.max(1);
        }
        if let Ok(value) = std::env::var("BREAKER_ROLLING_WINDOW_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.rolling_window_duration = Duration::from_millis(parsed.max(1));
        }
        if let Ok(value) = std::env::var("BREAKER_RESET_TIMEOUT_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.reset_timeout = Duration::from_millis(parsed);
        }

        config.rolling_window_size = config
            .rolling_window_size
            .max(config.volume_threshold as usize);
        config
    }

    /// Raises the volume threshold above one replica's retry budget, so a
    /// single dead replica cannot trip the breaker for its whole service.
    pub fn fit_retry_budget(mut self, max_retries: u32) -> Self {
        self.volume_threshold = self.volume_threshold.max(max_retries.saturating_add(1));
        self.rolling_window_size = self
            .rolling_window_size
            .max(self.volume_threshold as usize);
        self
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(5_000),
            error_threshold_percentage: 50,
            volume_threshold: 10,
            rolling_window_size: 20,
            rolling_window_duration: Duration::from_millis(10_000),
            reset_timeout: Duration::from_millis(30_000),
        }
    }
}
