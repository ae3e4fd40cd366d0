//! Singleflight for provider-read stampede protection.
//!
//! Wraps the `async_singleflight` crate so that concurrent cache misses on
//! the same key (e.g. two queues resolving the same track at once) share a
//! single provider fetch instead of hammering the provider.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Error type for singleflight operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SingleFlightError<E> {
    /// The leader task panicked or was cancelled before producing a value.
    #[error("singleflight leader dropped or panicked")]
    LeaderFailed,
    /// The underlying producer failed.
    #[error("{0}")]
    Inner(E),
}

/// Deduplicates concurrent executions per key.
///
/// When multiple tasks request the same key simultaneously only one
/// producer runs; the others await its result.
#[derive(Clone)]
pub struct SingleFlight<K, V, E>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    group: Arc<async_singleflight::Group<K, V, E>>,
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            group: Arc::new(async_singleflight::Group::new()),
        }
    }

    /// Run `producer` for `key`, or wait for an in-flight run of the same
    /// key and share its result.
    pub async fn run<Fut>(&self, key: K, producer: Fut) -> Result<V, SingleFlightError<E>>
    where
        Fut: std::future::Future<Output = Result<V, E>> + Send,
    {
        // Group::work returns Err(None) when the leader was dropped after
        // the library's internal retries.
        self.group
            .work(&key, producer)
            .await
            .map_err(|opt_err| match opt_err {
                Some(inner) => SingleFlightError::Inner(inner),
                None => SingleFlightError::LeaderFailed,
            })
    }
}

impl<K, V, E> Default for SingleFlight<K, V, E>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn test_concurrent_requests_share_one_producer() {
        let sf: SingleFlight<String, i32, String> = SingleFlight::new();
        let counter = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];
        for _ in 0..10 {
            let sf = sf.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                sf.run("track:spotify:abc".to_string(), async move {
                    sleep(Duration::from_millis(50)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_propagates_and_key_recovers() {
        let sf: SingleFlight<String, i32, String> = SingleFlight::new();

        let result = sf
            .run("key".to_string(), async { Err("boom".to_string()) })
            .await;
        assert!(matches!(result, Err(SingleFlightError::Inner(_))));

        let result = sf.run("key".to_string(), async { Ok(1) }).await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_different_keys_run_independently() {
        let sf: SingleFlight<String, i32, String> = SingleFlight::new();
        let counter = Arc::new(AtomicU32::new(0));

        let c1 = counter.clone();
        let r1 = sf.run("a".to_string(), async move {
            c1.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });
        let c2 = counter.clone();
        let r2 = sf.run("b".to_string(), async move {
            c2.fetch_add(1, Ordering::SeqCst);
            Ok(2)
        });
        let (r1, r2) = tokio::join!(r1, r2);
        assert_eq!(r1.unwrap(), 1);
        assert_eq!(r2.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
