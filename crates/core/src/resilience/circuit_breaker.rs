//! Circuit breaker for outbound calls that can fail in bursts: content
//! extraction fetches, video metadata lookups, LLM provider requests.
//! Three states (closed, open, half-open), with an optional Redis-backed
//! persisted copy of the state so a restarted process doesn't immediately
//! re-hammer a service it had just tripped on.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_duration: Duration,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_duration: Duration::from_secs(30),
            half_open_max_calls: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Upstream page/content fetches: moderate tolerance, medium recovery window.
    pub fn content_extractor() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_duration: Duration::from_secs(30),
            half_open_max_calls: 3,
        }
    }

    /// Video platform metadata/caption lookups: trips fast, recovers fast.
    pub fn video_api() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            timeout_duration: Duration::from_secs(10),
            half_open_max_calls: 2,
        }
    }

    /// LLM provider calls: slow and costly to retry, longer recovery window.
    pub fn llm_provider() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_duration: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    CircuitOpen { name: String },
    TooManyCalls { name: String },
    CallFailed(E),
}

impl<E: fmt::Display> fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitBreakerError::CircuitOpen { name } => {
                write!(f, "circuit breaker '{name}' is open")
            }
            CircuitBreakerError::TooManyCalls { name } => {
                write!(f, "circuit breaker '{name}' rejected call: too many half-open probes")
            }
            CircuitBreakerError::CallFailed(e) => write!(f, "{e}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for CircuitBreakerError<E> {}

#[derive(Debug, Clone)]
pub struct CircuitMetrics {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedCircuitState {
    state: String,
    failure_count: u32,
    success_count: u32,
    opened_at_unix: Option<u64>,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: RwLock<Inner>,
    half_open_in_flight: AtomicU32,
    redis: Option<Arc<RwLock<ConnectionManager>>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: RwLock::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            }),
            half_open_in_flight: AtomicU32::new(0),
            redis: None,
        }
    }

    /// Build a breaker that mirrors its state to Redis after every
    /// transition, and attempts to restore prior state on construction.
    /// Best-effort: a Redis hiccup degrades to purely in-memory behavior.
    pub async fn with_redis(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        conn: Arc<RwLock<ConnectionManager>>,
    ) -> Self {
        let breaker = Self {
            name: name.into(),
            config,
            inner: RwLock::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            }),
            half_open_in_flight: AtomicU32::new(0),
            redis: Some(conn),
        };
        breaker.load_state().await;
        breaker
    }

    fn redis_key(&self) -> String {
        format!("circuit_breaker:{}:state", self.name)
    }

    async fn persist_state(&self) {
        let Some(redis) = &self.redis else { return };

        let persisted = {
            let inner = self.inner.read().await;
            let state_str = match inner.state {
                CircuitState::Closed => "closed",
                CircuitState::Open => "open",
                CircuitState::HalfOpen => "half_open",
            }
            .to_string();
            let opened_at_unix = inner.opened_at.and_then(|opened_at| {
                let elapsed = opened_at.elapsed();
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .ok()
                    .map(|now| now.saturating_sub(elapsed).as_secs())
            });
            PersistedCircuitState {
                state: state_str,
                failure_count: inner.failure_count,
                success_count: inner.success_count,
                opened_at_unix,
            }
        };

        let Ok(json) = serde_json::to_string(&persisted) else {
            return;
        };
        let mut conn = redis.write().await;
        let result: Result<(), redis::RedisError> =
            conn.set_ex(self.redis_key(), json, 3600).await;
        if let Err(e) = result {
            warn!(circuit = %self.name, error = %e, "failed to persist circuit breaker state");
        }
    }

    async fn load_state(&self) {
        let Some(redis) = &self.redis else { return };

        let key = self.redis_key();
        let result: Result<Option<String>, redis::RedisError> = {
            let mut conn = redis.write().await;
            conn.get(&key).await
        };

        let json = match result {
            Ok(Some(json)) => json,
            Ok(None) => return,
            Err(e) => {
                warn!(circuit = %self.name, error = %e, "failed to load circuit breaker state, using defaults");
                return;
            }
        };

        let persisted: PersistedCircuitState = match serde_json::from_str(&json) {
            Ok(p) => p,
            Err(e) => {
                warn!(circuit = %self.name, error = %e, "failed to deserialize circuit breaker state");
                return;
            }
        };

        let mut inner = self.inner.write().await;
        inner.failure_count = persisted.failure_count;
        inner.success_count = persisted.success_count;
        inner.state = match persisted.state.as_str() {
            "open" => {
                let elapsed = persisted
                    .opened_at_unix
                    .and_then(|opened_unix| {
                        SystemTime::now()
                            .duration_since(UNIX_EPOCH)
                            .ok()
                            .map(|now| now.as_secs().saturating_sub(opened_unix))
                    })
                    .unwrap_or(0);
                inner.opened_at =
                    Instant::now().checked_sub(Duration::from_secs(elapsed));
                CircuitState::Open
            }
            "half_open" => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        };
        debug!(circuit = %self.name, state = %persisted.state, "restored circuit breaker state");
    }

    /// Check whether an open circuit's timeout has elapsed and, if so,
    /// admit it into the half-open probing state.
    async fn check_timeout(&self) {
        let transitioned = {
            let mut inner = self.inner.write().await;
            if inner.state == CircuitState::Open {
                if let Some(opened_at) = inner.opened_at {
                    if opened_at.elapsed() >= self.config.timeout_duration {
                        inner.state = CircuitState::HalfOpen;
                        inner.opened_at = None;
                        self.half_open_in_flight.store(0, Ordering::SeqCst);
                        true
                    } else {
                        false
                    }
                } else {
                    false
                }
            } else {
                false
            }
        };

        if transitioned {
            debug!(circuit = %self.name, "circuit breaker entering half-open state");
            self.persist_state().await;
        }
    }

    fn try_enter_half_open(&self) -> bool {
        loop {
            let current = self.half_open_in_flight.load(Ordering::SeqCst);
            if current >= self.config.half_open_max_calls {
                return false;
            }
            if self
                .half_open_in_flight
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn leave_half_open(&self) {
        self.half_open_in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    async fn record_success(&self) {
        let mut state_changed = false;
        {
            let mut inner = self.inner.write().await;
            inner.success_count += 1;
            match inner.state {
                CircuitState::HalfOpen => {
                    if inner.success_count >= self.config.success_threshold {
                        inner.state = CircuitState::Closed;
                        inner.failure_count = 0;
                        inner.success_count = 0;
                        inner.opened_at = None;
                        self.half_open_in_flight.store(0, Ordering::SeqCst);
                        state_changed = true;
                        debug!(circuit = %self.name, "circuit breaker closed after recovery");
                    }
                }
                CircuitState::Closed => {
                    inner.failure_count = 0;
                }
                CircuitState::Open => {}
            }
        }
        if state_changed {
            self.persist_state().await;
        }
    }

    async fn record_failure(&self) {
        let mut state_changed = false;
        {
            let mut inner = self.inner.write().await;
            inner.failure_count += 1;
            match inner.state {
                CircuitState::Closed => {
                    if inner.failure_count >= self.config.failure_threshold {
                        inner.state = CircuitState::Open;
                        inner.opened_at = Some(Instant::now());
                        state_changed = true;
                        warn!(circuit = %self.name, failures = inner.failure_count, "circuit breaker opened");
                    }
                }
                CircuitState::HalfOpen => {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    self.half_open_in_flight.store(0, Ordering::SeqCst);
                    state_changed = true;
                    warn!(circuit = %self.name, "circuit breaker re-opened after half-open failure");
                }
                CircuitState::Open => {}
            }
        }
        if state_changed {
            self.persist_state().await;
        }
    }

    /// Run `fut` if the circuit admits it, recording the outcome.
    pub async fn call<F, T, E>(&self, fut: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        self.check_timeout().await;

        let state = self.state().await;
        match state {
            CircuitState::Open => {
                return Err(CircuitBreakerError::CircuitOpen {
                    name: self.name.clone(),
                });
            }
            CircuitState::HalfOpen => {
                if !self.try_enter_half_open() {
                    return Err(CircuitBreakerError::TooManyCalls {
                        name: self.name.clone(),
                    });
                }
            }
            CircuitState::Closed => {}
        }

        let result = fut.await;

        if state == CircuitState::HalfOpen {
            self.leave_half_open();
        }

        match result {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(e) => {
                self.record_failure().await;
                Err(CircuitBreakerError::CallFailed(e))
            }
        }
    }

    /// Like [`call`](Self::call), but substitutes `fallback()` instead of
    /// rejecting when the circuit is open. Does not fall back on an error
    /// surfaced by the call itself.
    pub async fn call_with_fallback<F, T, E, FB>(
        &self,
        fut: F,
        fallback: FB,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
        FB: FnOnce() -> T,
    {
        match self.call(fut).await {
            Err(CircuitBreakerError::CircuitOpen { .. }) => Ok(fallback()),
            other => other,
        }
    }

    pub async fn force_open(&self) {
        {
            let mut inner = self.inner.write().await;
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            self.half_open_in_flight.store(0, Ordering::SeqCst);
        }
        self.persist_state().await;
    }

    pub async fn reset(&self) {
        {
            let mut inner = self.inner.write().await;
            inner.state = CircuitState::Closed;
            inner.failure_count = 0;
            inner.success_count = 0;
            inner.opened_at = None;
            self.half_open_in_flight.store(0, Ordering::SeqCst);
        }
        self.persist_state().await;
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    pub async fn failure_count(&self) -> u32 {
        self.inner.read().await.failure_count
    }

    pub async fn success_count(&self) -> u32 {
        self.inner.read().await.success_count
    }

    pub async fn metrics(&self) -> CircuitMetrics {
        let inner = self.inner.read().await;
        CircuitMetrics {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
        }
    }
}
