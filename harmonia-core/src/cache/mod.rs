//! Cross-request cache fronting provider reads.
//!
//! TTL/checksum key-value store with per-key singleflight: concurrent
//! lookups of the same missing key share one producer run, so a burst of
//! identical requests results in exactly one provider fetch.

pub mod singleflight;

pub use singleflight::{SingleFlight, SingleFlightError};

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Error, Result};

/// Default entry lifetime: one day.
pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400);

/// Maximum number of entries held in memory.
const MAX_CAPACITY: u64 = 100_000;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    checksum: Option<String>,
    expires_at: i64,
}

/// In-memory LRU cache with TTL, checksum validation and singleflight.
#[derive(Clone)]
pub struct Cache {
    store: moka::future::Cache<String, CacheEntry>,
    flight: SingleFlight<String, serde_json::Value, Arc<Error>>,
}

impl Cache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: moka::future::Cache::builder()
                .max_capacity(MAX_CAPACITY)
                .build(),
            flight: SingleFlight::new(),
        }
    }

    /// Get a value, validating TTL and (when given) checksum.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, checksum: Option<&str>) -> Option<T> {
        let entry = self.store.get(key).await?;
        if entry.expires_at <= chrono::Utc::now().timestamp() {
            self.store.invalidate(key).await;
            return None;
        }
        if checksum.is_some() && entry.checksum.as_deref() != checksum {
            return None;
        }
        serde_json::from_value(entry.value).ok()
    }

    /// Store a value with the given TTL and optional checksum.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        checksum: Option<String>,
        ttl: Duration,
    ) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let entry = CacheEntry {
            value,
            checksum,
            expires_at: chrono::Utc::now().timestamp() + ttl.as_secs() as i64,
        };
        self.store.insert(key.to_string(), entry).await;
        Ok(())
    }

    pub async fn invalidate(&self, key: &str) {
        self.store.invalidate(key).await;
    }

    /// Get from cache or run `producer` exactly once for the key across all
    /// concurrent callers, caching the produced value.
    pub async fn get_or_compute<T, F>(
        &self,
        key: &str,
        checksum: Option<String>,
        ttl: Duration,
        producer: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send,
        F: std::future::Future<Output = Result<T>> + Send,
    {
        if let Some(hit) = self.get::<T>(key, checksum.as_deref()).await {
            return Ok(hit);
        }
        let store = self.store.clone();
        let key_owned = key.to_string();
        let checksum_inner = checksum.clone();
        let result = self
            .flight
            .run(key_owned.clone(), async move {
                // re-check inside the flight: a previous leader may have
                // filled the entry while we queued
                if let Some(entry) = store.get(&key_owned).await {
                    let fresh = entry.expires_at > chrono::Utc::now().timestamp();
                    let checksum_ok =
                        checksum_inner.is_none() || entry.checksum == checksum_inner;
                    if fresh && checksum_ok {
                        return Ok(entry.value);
                    }
                }
                let produced = producer.await.map_err(Arc::new)?;
                let value = serde_json::to_value(&produced)
                    .map_err(|e| Arc::new(Error::Serialization(e)))?;
                store
                    .insert(
                        key_owned,
                        CacheEntry {
                            value: value.clone(),
                            checksum: checksum_inner,
                            expires_at: chrono::Utc::now().timestamp() + ttl.as_secs() as i64,
                        },
                    )
                    .await;
                Ok(value)
            })
            .await;

        match result {
            Ok(value) => Ok(serde_json::from_value(value)?),
            Err(SingleFlightError::Inner(err)) => Err(share_error(&err)),
            Err(SingleFlightError::LeaderFailed) => Err(Error::Internal(
                "cache producer was cancelled".to_string(),
            )),
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("entries", &self.store.entry_count())
            .finish()
    }
}

/// Rebuild an error from the shared reference handed to singleflight
/// followers, preserving the machine kind where it matters to callers.
fn share_error(err: &Error) -> Error {
    match err {
        Error::LoginFailed(m) => Error::LoginFailed(m.clone()),
        Error::RateLimited(m) => Error::RateLimited(m.clone()),
        Error::MediaNotFound(m) => Error::MediaNotFound(m.clone()),
        Error::Unsupported(m) => Error::Unsupported(m.clone()),
        Error::InvalidData(m) => Error::InvalidData(m.clone()),
        Error::ProviderUnavailable(m) => Error::ProviderUnavailable(m.clone()),
        Error::Stream(m) => Error::Stream(m.clone()),
        Error::InvalidInput(m) => Error::InvalidInput(m.clone()),
        other => Error::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = Cache::new();
        cache.set("k", &vec![1, 2, 3], None, DEFAULT_TTL).await.unwrap();
        let value: Option<Vec<i32>> = cache.get("k", None).await;
        assert_eq!(value, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_checksum_mismatch_misses() {
        let cache = Cache::new();
        cache
            .set("playlist", &"tracks", Some("c0".to_string()), DEFAULT_TTL)
            .await
            .unwrap();
        let hit: Option<String> = cache.get("playlist", Some("c0")).await;
        assert!(hit.is_some());
        let stale: Option<String> = cache.get("playlist", Some("c1")).await;
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn test_get_or_compute_runs_producer_once() {
        let cache = Cache::new();
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute("fingerprint", None, DEFAULT_TTL, async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(7_u32)
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_compute_error_kind_survives() {
        let cache = Cache::new();
        let result: Result<u32> = cache
            .get_or_compute("missing", None, DEFAULT_TTL, async {
                Err(Error::MediaNotFound("track x".to_string()))
            })
            .await;
        assert!(matches!(result, Err(Error::MediaNotFound(_))));
    }

    #[tokio::test]
    async fn test_expired_entry_misses() {
        let cache = Cache::new();
        cache
            .set("k", &1_u32, None, Duration::from_secs(0))
            .await
            .unwrap();
        let hit: Option<u32> = cache.get("k", None).await;
        assert!(hit.is_none());
    }
}
