//! Deduplication of concurrent fetches for the same key.

use crate::error::ProviderError;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, ProviderError>>>;

/// Callers asking for a key that is already being fetched await the same
/// future instead of issuing a second request.
pub struct InFlight<K, V>
where
    V: Clone,
{
    pending: Mutex<HashMap<K, (u64, SharedFetch<V>)>>,
    next_gen: Mutex<u64>,
}

impl<K, V> Default for InFlight<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl<K, V> InFlight<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            next_gen: Mutex::new(0),
        }
    }

    /// Number of keys currently being fetched.
    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Await the fetch for `key`, starting it with `start` if none is running.
    pub async fn run<F>(&self, key: K, start: F) -> Result<V, ProviderError>
    where
        F: FnOnce() -> BoxFuture<'static, Result<V, ProviderError>>,
    {
        let (gen, fut) = {
            let mut pending = lock(&self.pending);
            match pending.get(&key) {
                Some((gen, fut)) => (*gen, fut.clone()),
                None => {
                    let gen = {
                        let mut next = lock(&self.next_gen);
                        *next += 1;
                        *next
                    };
                    let fut = start().shared();
                    pending.insert(key.clone(), (gen, fut.clone()));
                    (gen, fut)
                }
            }
        };

        let result = fut.await;

        let mut pending = lock(&self.pending);
        if pending.get(&key).is_some_and(|(g, _)| *g == gen) {
            pending.remove(&key);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let inflight: InFlight<String, u32> = InFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let make = || {
            let calls = calls.clone();
            move || {
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<u32, ProviderError>(7)
                }
                .boxed()
            }
        };

        let (a, b) = tokio::join!(
            inflight.run("k".to_string(), make()),
            inflight.run("k".to_string(), make())
        );
        assert_eq!(a, Ok(7));
        assert_eq!(b, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(inflight.is_empty());
    }

    #[tokio::test]
    async fn errors_are_shared_then_forgotten() {
        let inflight: InFlight<&'static str, u32> = InFlight::new();
        let err = inflight
            .run("k", || async { Err::<u32, _>(ProviderError::Http("down".into())) }.boxed())
            .await;
        assert_eq!(err, Err(ProviderError::Http("down".into())));

        let ok = inflight.run("k", || async { Ok::<u32, ProviderError>(1) }.boxed()).await;
        assert_eq!(ok, Ok(1));
    }
}
