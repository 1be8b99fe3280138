pub mod circuit_breaker;

#[cfg(test)]
mod tests;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitMetrics, CircuitState,
};
