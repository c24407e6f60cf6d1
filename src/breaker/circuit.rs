use std::{
    collections::VecDeque,
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
    time::Instant,
};

use crate::breaker::BreakerConfig;
use crate::types::{CircuitSnapshot, CircuitStatus};

const TRANSITION_CHANNEL_CAPACITY: usize = 64;

/// A state change of one breaker, published to subscribers and returned to the
/// caller whose call caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitTransition {
    pub breaker: String,
    pub from: CircuitStatus,
    pub to: CircuitStatus,
}

#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit open")]
    Open,
    #[error("call timed out after {}ms", after.as_millis())]
    Timeout {
        after: Duration,
        transition: Option<CircuitTransition>,
    },
    #[error("call failed: {source}")]
    Inner {
        source: E,
        transition: Option<CircuitTransition>,
    },
}

impl<E> BreakerError<E> {
    pub fn transition(&self) -> Option<&CircuitTransition> {
        match self {
            BreakerError::Open => None,
            BreakerError::Timeout { transition, .. } | BreakerError::Inner { transition, .. } => {
                transition.as_ref()
            }
        }
    }

    /// True when this failure moved the breaker into `Open`.
    pub fn tripped(&self) -> bool {
        self.transition()
            .is_some_and(|transition| transition.to == CircuitStatus::Open)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    at: Instant,
    success: bool,
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitStatus,
    consecutive_failures: u32,
    window: VecDeque<Outcome>,
    opened_at: Option<Instant>,
    opened_at_wall: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

impl CircuitInner {
    fn new() -> Self {
        Self {
            state: CircuitStatus::Closed,
            consecutive_failures: 0,
            window: VecDeque::new(),
            opened_at: None,
            opened_at_wall: None,
            trial_in_flight: false,
        }
    }

    fn transition_to(&mut self, breaker: &str, to: CircuitStatus) -> CircuitTransition {
        let from = self.state;
        self.state = to;
        self.trial_in_flight = false;
        match to {
            CircuitStatus::Open => {
                self.opened_at = Some(Instant::now());
                self.opened_at_wall = Some(Utc::now());
            }
            CircuitStatus::Closed => {
                self.window.clear();
                self.consecutive_failures = 0;
            }
            CircuitStatus::HalfOpen => {}
        }
        CircuitTransition {
            breaker: breaker.to_string(),
            from,
            to,
        }
    }

    fn push(&mut self, config: &BreakerConfig, success: bool) {
        let now = Instant::now();
        self.window.push_back(Outcome { at: now, success });
        self.prune(config, now);
    }

    fn prune(&mut self, config: &BreakerConfig, now: Instant) {
        while let Some(oldest) = self.window.front() {
            if now.duration_since(oldest.at) > config.rolling_window_duration {
                self.window.pop_front();
            } else {
                break;
            }
        }
        while self.window.len() > config.rolling_window_size {
            self.window.pop_front();
        }
    }

    fn window_counts(&self) -> (u32, u32) {
        let failures = self.window.iter().filter(|outcome| !outcome.success).count() as u32;
        let successes = self.window.len() as u32 - failures;
        (successes, failures)
    }

    fn should_trip(&self, config: &BreakerConfig) -> bool {
        let total = self.window.len() as u64;
        if total < u64::from(config.volume_threshold) {
            return false;
        }
        let (_, failures) = self.window_counts();
        u64::from(failures) * 100 >= u64::from(config.error_threshold_percentage) * total
    }
}

/// Closed / open / half-open gate around one class of downstream call.
///
/// All mutable state sits behind one mutex. The lock is never held across an
/// `.await`; the protected call runs with the lock released.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<CircuitInner>,
    events: broadcast::Sender<CircuitTransition>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let (events, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Self::with_events(name, config, events)
    }

    /// A breaker publishing onto an existing channel, so several breakers can
    /// share one transition log.
    pub fn with_events(
        name: impl Into<String>,
        config: BreakerConfig,
        events: broadcast::Sender<CircuitTransition>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(CircuitInner::new()),
            events,
        }
    }

    pub fn transition_channel() -> broadcast::Sender<CircuitTransition> {
        broadcast::channel(TRANSITION_CHANNEL_CAPACITY).0
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CircuitTransition> {
        self.events.subscribe()
    }

    pub fn state(&self) -> CircuitStatus {
        self.lock().state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let mut inner = self.lock();
        inner.prune(&self.config, Instant::now());
        let (window_successes, window_failures) = inner.window_counts();
        CircuitSnapshot {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            window_successes,
            window_failures,
            opened_at: inner
                .opened_at_wall
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }

    /// Runs `call` under the breaker. While open, `call` is never invoked.
    ///
    /// A call exceeding `call_timeout` is dropped and counted as a failure.
    pub async fn execute<F, Fut, T, E>(&self, call: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(admission) = self.admit() else {
            tracing::debug!(breaker = %self.name, "call rejected, circuit open");
            return Err(BreakerError::Open);
        };

        let mut guard = TrialGuard {
            breaker: self,
            armed: admission == Admission::Trial,
        };
        let result = tokio::time::timeout(self.config.call_timeout, call()).await;
        guard.armed = false;

        match result {
            Ok(Ok(value)) => {
                self.record_success(admission);
                Ok(value)
            }
            Ok(Err(source)) => {
                let transition = self.record_failure(admission);
                Err(BreakerError::Inner { source, transition })
            }
            Err(_) => {
                let transition = self.record_failure(admission);
                Err(BreakerError::Timeout {
                    after: self.config.call_timeout,
                    transition,
                })
            }
        }
    }

    fn admit(&self) -> Option<Admission> {
        let mut inner = self.lock();
        let (admission, transition) = match inner.state {
            CircuitStatus::Closed => (Some(Admission::Normal), None),
            CircuitStatus::Open => {
                let elapsed = inner
                    .opened_at
                    .map_or(Duration::ZERO, |opened_at| opened_at.elapsed());
                if elapsed >= self.config.reset_timeout {
                    let transition = inner.transition_to(&self.name, CircuitStatus::HalfOpen);
                    inner.trial_in_flight = true;
                    (Some(Admission::Trial), Some(transition))
                } else {
                    (None, None)
                }
            }
            CircuitStatus::HalfOpen if inner.trial_in_flight => (None, None),
            CircuitStatus::HalfOpen => {
                inner.trial_in_flight = true;
                (Some(Admission::Trial), None)
            }
        };
        drop(inner);

        if let Some(transition) = transition {
            self.publish(transition);
        }
        admission
    }

    fn record_success(&self, admission: Admission) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        let transition = match (admission, inner.state) {
            (Admission::Trial, CircuitStatus::HalfOpen) => {
                Some(inner.transition_to(&self.name, CircuitStatus::Closed))
            }
            (_, CircuitStatus::Closed) => {
                inner.push(&self.config, true);
                None
            }
            _ => None,
        };
        drop(inner);

        if let Some(transition) = transition {
            self.publish(transition);
        }
    }

    fn record_failure(&self, admission: Admission) -> Option<CircuitTransition> {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        let transition = match (admission, inner.state) {
            (Admission::Trial, CircuitStatus::HalfOpen) => {
                Some(inner.transition_to(&self.name, CircuitStatus::Open))
            }
            (_, CircuitStatus::Closed) => {
                inner.push(&self.config, false);
                if inner.should_trip(&self.config) {
                    Some(inner.transition_to(&self.name, CircuitStatus::Open))
                } else {
                    None
                }
            }
            _ => None,
        };
        drop(inner);

        if let Some(transition) = &transition {
            self.publish(transition.clone());
        }
        transition
    }

    fn release_trial(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitStatus::HalfOpen {
            inner.trial_in_flight = false;
        }
    }

    fn publish(&self, transition: CircuitTransition) {
        // No subscribers is fine; the caller still sees the transition.
        let _ = self.events.send(transition);
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Frees the half-open trial slot when the trial future is dropped before it
/// finishes, so a cancelled request cannot wedge the breaker.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.release_trial();
        }
    }
}

/// Logs every published transition until all senders are dropped.
pub fn spawn_transition_logger(
    mut events: broadcast::Receiver<CircuitTransition>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(transition) if transition.to == CircuitStatus::Open => {
                    tracing::warn!(
                        breaker = %transition.breaker,
                        from = transition.from.as_str(),
                        to = transition.to.as_str(),
                        "circuit breaker tripped"
                    );
                }
                Ok(transition) => {
                    tracing::info!(
                        breaker = %transition.breaker,
                        from = transition.from.as_str(),
                        to = transition.to.as_str(),
                        "circuit breaker state changed"
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "circuit transition log lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
