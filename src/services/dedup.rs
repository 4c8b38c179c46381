use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

/// The shared cache backing reminder idempotency is best-effort: losing it
/// degrades to fail-open at the call site, never to dropped work.
#[derive(Debug, thiserror::Error)]
#[error("Idempotency store unavailable: {0}")]
pub struct StoreUnavailable(pub String);

/// TTL-bounded claim-once store.
#[allow(async_fn_in_trait)]
pub trait DedupStore {
    /// Claim `key` for `ttl`. Ok(true) when this call claimed it, Ok(false)
    /// when a live claim already exists.
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool, StoreUnavailable>;
}

/// In-memory claim store (for single-instance deployments)
/// For multi-instance, use Redis or similar
#[derive(Clone, Default)]
pub struct InMemoryDedupStore {
    entries: Arc<Mutex<HashMap<String, Instant>>>,
}

impl InMemoryDedupStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Drop expired claims (call from a background task).
    pub async fn cleanup(&self) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, expires| *expires > now);
    }
}

impl DedupStore for InMemoryDedupStore {
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool, StoreUnavailable> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if let Some(expires) = entries.get(key) {
            if *expires > now {
                return Ok(false);
            }
        }

        entries.insert(key.to_string(), now + ttl);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_claim_within_ttl_is_rejected() {
        let store = InMemoryDedupStore::new();
        let ttl = Duration::from_secs(600);

        assert!(store.claim("reminder:a", ttl).await.unwrap());
        assert!(!store.claim("reminder:a", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn expired_claim_can_be_retaken() {
        let store = InMemoryDedupStore::new();

        assert!(store.claim("reminder:a", Duration::ZERO).await.unwrap());
        assert!(store.claim("reminder:a", Duration::from_secs(600)).await.unwrap());
    }

    #[tokio::test]
    async fn different_keys_are_independent() {
        let store = InMemoryDedupStore::new();
        let ttl = Duration::from_secs(600);

        assert!(store.claim("reminder:a", ttl).await.unwrap());
        assert!(store.claim("reminder:b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn cleanup_drops_only_expired_entries() {
        let store = InMemoryDedupStore::new();
        store.claim("old", Duration::ZERO).await.unwrap();
        store.claim("live", Duration::from_secs(600)).await.unwrap();

        store.cleanup().await;

        let entries = store.entries.lock().await;
        assert!(!entries.contains_key("old"));
        assert!(entries.contains_key("live"));
    }
}
