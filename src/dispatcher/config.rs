use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Attempts per replica before it is deregistered.
    pub max_retries: u32,
    /// First inter-attempt delay; zero disables backoff entirely.
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Overall budget for one inbound request, retries included.
    pub request_deadline: Duration,
}

impl DispatcherConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("DISPATCH_MAX_RETRIES")
            && let Ok(parsed) = value.parse::<u32>()
        {
            config.max_retries = parsed.max(1);
        }
        if let Ok(value) = std::env::var("DISPATCH_BACKOFF_BASE_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.backoff_base = Duration::from_millis(parsed);
        }
        if let Ok(value) = std::env::var("DISPATCH_BACKOFF_MAX_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.backoff_max = Duration::from_millis(parsed);
        }
        if let Ok(value) = std::env::var("DISPATCH_REQUEST_DEADLINE_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.request_deadline = Duration::from_millis(parsed.max(1));
        }

        config
    }

    /// Delay after the `attempt`-th failed attempt (1-based) on one replica:
    /// `base * 2^(attempt - 1)`, capped at `backoff_max`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if self.backoff_base.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(20);
        let base_ms = self.backoff_base.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay_ms).min(self.backoff_max)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(50),
            backoff_max: Duration::from_millis(1_000),
            request_deadline: Duration::from_millis(15_000),
        }
    }
}
