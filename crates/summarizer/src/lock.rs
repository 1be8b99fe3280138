//! Dedupe lock manager (C3, spec.md §4.3). Guards the short window between
//! "is this url already being processed" and "create the request row" so two
//! concurrent submissions of the same url don't both start a pipeline run.
//!
//! Grounded in the core crate's circuit breaker's `redis::aio::ConnectionManager`
//! usage (`Arc<RwLock<ConnectionManager>>`, `set_ex`/`get`, best-effort
//! `tracing::warn!` on failure) for the Redis backend, generalized with an
//! in-memory backend for single-node deployments that don't run Redis.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::interval;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock held for key '{key}'")]
    Held { key: String },
    #[error("lock backend unavailable: {0}")]
    BackendUnavailable(String),
}

pub type Result<T> = std::result::Result<T, LockError>;

/// Opaque proof of ownership returned by `acquire`, required by `release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockToken(Uuid);

#[async_trait]
pub trait LockBackend: Send + Sync {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<LockToken>;
    async fn release(&self, key: &str, token: LockToken) -> Result<()>;
}

struct LockEntry {
    token: LockToken,
    expires_at: Instant,
}

/// In-process lock table with a background sweeper that clears expired
/// entries so a crashed holder doesn't wedge a key forever.
pub struct InMemoryLockBackend {
    entries: Arc<Mutex<HashMap<String, LockEntry>>>,
}

impl InMemoryLockBackend {
    pub fn new() -> Self {
        let entries: Arc<Mutex<HashMap<String, LockEntry>>> = Arc::new(Mutex::new(HashMap::new()));
        Self::spawn_sweeper(Arc::clone(&entries));
        Self { entries }
    }

    fn spawn_sweeper(entries: Arc<Mutex<HashMap<String, LockEntry>>>) {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(5));
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let mut guard = entries.lock().await;
                guard.retain(|_, entry| entry.expires_at > now);
            }
        });
    }
}

impl Default for InMemoryLockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockBackend for InMemoryLockBackend {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<LockToken> {
        let mut guard = self.entries.lock().await;
        let now = Instant::now();

        if let Some(entry) = guard.get(key) {
            if entry.expires_at > now {
                return Err(LockError::Held { key: key.to_string() });
            }
        }

        let token = LockToken(Uuid::new_v4());
        guard.insert(
            key.to_string(),
            LockEntry {
                token,
                expires_at: now + ttl,
            },
        );
        Ok(token)
    }

    async fn release(&self, key: &str, token: LockToken) -> Result<()> {
        let mut guard = self.entries.lock().await;
        if let Some(entry) = guard.get(key) {
            if entry.token == token {
                guard.remove(key);
            }
        }
        Ok(())
    }
}

/// Redis-backed backend for multi-node deployments, using `SET key val NX PX
/// ttl` semantics so acquisition is a single atomic round trip.
pub struct RedisLockBackend {
    conn: Arc<tokio::sync::RwLock<ConnectionManager>>,
}

impl RedisLockBackend {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn: Arc::new(tokio::sync::RwLock::new(conn)),
        }
    }

    fn redis_key(key: &str) -> String {
        format!("dedupe_lock:{key}")
    }
}

#[async_trait]
impl LockBackend for RedisLockBackend {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<LockToken> {
        let token = LockToken(Uuid::new_v4());
        let mut conn = self.conn.write().await;

        let result: std::result::Result<bool, redis::RedisError> = redis::cmd("SET")
            .arg(Self::redis_key(key))
            .arg(token.0.to_string())
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut *conn)
            .await
            .map(|v: Option<String>| v.is_some());

        match result {
            Ok(true) => Ok(token),
            Ok(false) => Err(LockError::Held { key: key.to_string() }),
            Err(e) => {
                warn!(key = %key, error = %e, "redis lock backend unreachable");
                Err(LockError::BackendUnavailable(e.to_string()))
            }
        }
    }

    async fn release(&self, key: &str, token: LockToken) -> Result<()> {
        let mut conn = self.conn.write().await;
        let redis_key = Self::redis_key(key);

        let held: std::result::Result<Option<String>, redis::RedisError> =
            conn.get(&redis_key).await;

        match held {
            Ok(Some(stored)) if stored == token.0.to_string() => {
                let _: std::result::Result<(), redis::RedisError> =
                    conn.del(&redis_key).await;
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(key = %key, error = %e, "redis lock backend unreachable during release");
                Ok(())
            }
        }
    }
}

/// A token returned by [`LockManager::acquire`], tagged with which backend
/// it came from so `release` can route to the same one.
#[derive(Debug, Clone, Copy)]
pub struct LockHandle {
    token: LockToken,
    degraded: bool,
}

impl LockHandle {
    /// `true` if this handle was acquired against the fallback backend
    /// because the primary was unreachable and not `required`.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

/// Facade used by the coordinator: acquires through a primary backend, with
/// an optional fallback for when the primary is unreachable (spec.md §4.3).
///
/// When `required` is `true`, primary unavailability is returned as-is
/// (the caller fails loud). When `false` and a fallback is configured, the
/// fallback backend is used instead and the returned handle is marked
/// degraded so the caller can record an audit event.
pub struct LockManager {
    primary: Arc<dyn LockBackend>,
    fallback: Option<Arc<dyn LockBackend>>,
    required: bool,
}

impl LockManager {
    /// A single-backend manager with no fallback path.
    pub fn new(backend: Arc<dyn LockBackend>) -> Self {
        Self {
            primary: backend,
            fallback: None,
            required: true,
        }
    }

    /// A primary backend guarded by a fallback for when it's unreachable.
    pub fn with_fallback(primary: Arc<dyn LockBackend>, fallback: Arc<dyn LockBackend>, required: bool) -> Self {
        Self {
            primary,
            fallback: Some(fallback),
            required,
        }
    }

    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<LockHandle> {
        match self.primary.acquire(key, ttl).await {
            Ok(token) => Ok(LockHandle { token, degraded: false }),
            Err(LockError::BackendUnavailable(msg)) => match &self.fallback {
                Some(fallback) if !self.required => {
                    warn!(key = %key, error = %msg, "dedupe lock primary unreachable, falling back to in-process backend");
                    let token = fallback.acquire(key, ttl).await?;
                    Ok(LockHandle { token, degraded: true })
                }
                _ => Err(LockError::BackendUnavailable(msg)),
            },
            Err(held) => Err(held),
        }
    }

    pub async fn release(&self, key: &str, handle: LockHandle) -> Result<()> {
        let backend = if handle.degraded {
            self.fallback.as_ref().unwrap_or(&self.primary)
        } else {
            &self.primary
        };
        backend.release(key, handle.token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_blocks_second_caller() {
        let backend = InMemoryLockBackend::new();
        let first = backend.acquire("url:a", Duration::from_secs(10)).await;
        assert!(first.is_ok());

        let second = backend.acquire("url:a", Duration::from_secs(10)).await;
        assert!(matches!(second, Err(LockError::Held { .. })));
    }

    #[tokio::test]
    async fn test_release_allows_reacquire() {
        let backend = InMemoryLockBackend::new();
        let token = backend.acquire("url:a", Duration::from_secs(10)).await.unwrap();
        backend.release("url:a", token).await.unwrap();

        let reacquired = backend.acquire("url:a", Duration::from_secs(10)).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn test_release_with_stale_token_is_noop() {
        let backend = InMemoryLockBackend::new();
        let token_a = backend.acquire("url:a", Duration::from_secs(10)).await.unwrap();
        let _ = token_a;
        let stale = LockToken(Uuid::new_v4());

        backend.release("url:a", stale).await.unwrap();

        // Original holder's lock is still in place since the stale token
        // didn't match.
        let second = backend.acquire("url:a", Duration::from_secs(10)).await;
        assert!(matches!(second, Err(LockError::Held { .. })));
    }

    #[tokio::test]
    async fn test_expired_lock_can_be_reacquired() {
        let backend = InMemoryLockBackend::new();
        let _token = backend
            .acquire("url:a", Duration::from_millis(20))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        let reacquired = backend.acquire("url:a", Duration::from_secs(10)).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn test_independent_keys_do_not_conflict() {
        let backend = InMemoryLockBackend::new();
        let a = backend.acquire("url:a", Duration::from_secs(10)).await;
        let b = backend.acquire("url:b", Duration::from_secs(10)).await;
        assert!(a.is_ok());
        assert!(b.is_ok());
    }

    struct UnreachableBackend;

    #[async_trait]
    impl LockBackend for UnreachableBackend {
        async fn acquire(&self, _key: &str, _ttl: Duration) -> Result<LockToken> {
            Err(LockError::BackendUnavailable("connection refused".to_string()))
        }
        async fn release(&self, _key: &str, _token: LockToken) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_optional_backend_falls_back_when_primary_unreachable() {
        let manager = LockManager::with_fallback(
            Arc::new(UnreachableBackend),
            Arc::new(InMemoryLockBackend::new()),
            false,
        );
        let handle = manager.acquire("url:a", Duration::from_secs(10)).await.unwrap();
        assert!(handle.is_degraded());
        manager.release("url:a", handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_required_backend_fails_loud_when_unreachable() {
        let manager = LockManager::with_fallback(
            Arc::new(UnreachableBackend),
            Arc::new(InMemoryLockBackend::new()),
            true,
        );
        let result = manager.acquire("url:a", Duration::from_secs(10)).await;
        assert!(matches!(result, Err(LockError::BackendUnavailable(_))));
    }

    #[tokio::test]
    async fn test_single_backend_manager_handle_is_never_degraded() {
        let manager = LockManager::new(Arc::new(InMemoryLockBackend::new()));
        let handle = manager.acquire("url:a", Duration::from_secs(10)).await.unwrap();
        assert!(!handle.is_degraded());
        manager.release("url:a", handle).await.unwrap();
    }
}
