// ABOUTME: Key/value store contract shared by split transmitter/receiver workers
// ABOUTME: Ships an in-memory implementation with TTL for tests and embedded use

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kvstore connection error: {0}")]
    Connection(String),

    #[error("value at '{key}' is not an integer")]
    NotAnInteger { key: String },

    #[error("kvstore is closed")]
    Closed,
}

/// Contract over the external key/value store. Values are strings; single-key
/// operations are atomic at the store, which is the only property the
/// correlation schema relies on. `incr` backs per-bind sequence allocation.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), KvError>;
    async fn delete(&self, key: &str) -> Result<(), KvError>;
    async fn expire(&self, key: &str, seconds: u64) -> Result<(), KvError>;
    async fn incr(&self, key: &str) -> Result<i64, KvError>;
    async fn close(&self) -> Result<(), KvError>;
}

/// View of a store under a key prefix. A split TX/RX pair pointed at the
/// same prefix shares one correlation namespace.
#[derive(Clone)]
pub struct PrefixedStore {
    inner: Arc<dyn KvStore>,
    prefix: String,
}

impl PrefixedStore {
    pub fn new(inner: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        PrefixedStore {
            inner,
            prefix: prefix.into(),
        }
    }

    /// Nest a further namespace below this one
    pub fn sub_namespace(&self, prefix: &str) -> Self {
        PrefixedStore {
            inner: Arc::clone(&self.inner),
            prefix: format!("{}:{prefix}", self.prefix),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix)
    }
}

#[async_trait]
impl KvStore for PrefixedStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.inner.get(&self.key(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.inner.set(&self.key(key), value).await
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.inner.delete(&self.key(key)).await
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), KvError> {
        self.inner.expire(&self.key(key), seconds).await
    }

    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        self.inner.incr(&self.key(key)).await
    }

    async fn close(&self) -> Result<(), KvError> {
        self.inner.close().await
    }
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory store with lazy TTL eviction. Timers run on the tokio clock, so
/// paused-clock tests can step expiry deterministically.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), KvError> {
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), KvError> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
        }
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        let mut entries = self.entries.lock().await;
        let current = match entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                entry
                    .value
                    .parse::<i64>()
                    .map_err(|_| KvError::NotAnInteger {
                        key: key.to_string(),
                    })?
            }
            _ => 0,
        };
        let next = current + 1;
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }

    async fn close(&self) -> Result<(), KvError> {
        self.entries.lock().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn incr_counts_from_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("seq").await.unwrap(), 1);
        assert_eq!(store.incr("seq").await.unwrap(), 2);
        store.set("seq", "41").await.unwrap();
        assert_eq!(store.incr("seq").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn incr_rejects_non_numeric() {
        let store = MemoryStore::new();
        store.set("k", "hello").await.unwrap();
        assert!(matches!(
            store.incr("k").await,
            Err(KvError::NotAnInteger { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn expire_evicts_after_ttl() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        store.expire("k", 60).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_clears_previous_ttl() {
        let store = MemoryStore::new();
        store.set("k", "v1").await.unwrap();
        store.expire("k", 1).await.unwrap();
        store.set("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn prefixed_views_are_disjoint() {
        let inner: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let a = PrefixedStore::new(Arc::clone(&inner), "a");
        let b = PrefixedStore::new(Arc::clone(&inner), "b");

        a.set("k", "from-a").await.unwrap();
        assert_eq!(b.get("k").await.unwrap(), None);
        assert_eq!(inner.get("a:k").await.unwrap().as_deref(), Some("from-a"));
    }

    #[tokio::test]
    async fn same_prefix_shares_namespace() {
        let inner: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let tx = PrefixedStore::new(Arc::clone(&inner), "smpp@host:2775");
        let rx = PrefixedStore::new(Arc::clone(&inner), "smpp@host:2775");

        tx.set("3rd_party_id#SM1", "m1").await.unwrap();
        assert_eq!(
            rx.get("3rd_party_id#SM1").await.unwrap().as_deref(),
            Some("m1")
        );
    }

    #[tokio::test]
    async fn sub_namespace_nests() {
        let inner: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let outer = PrefixedStore::new(Arc::clone(&inner), "outer");
        let nested = outer.sub_namespace("inner");
        nested.set("k", "v").await.unwrap();
        assert_eq!(
            inner.get("outer:inner:k").await.unwrap().as_deref(),
            Some("v")
        );
    }
}
