//! TTL cache keyed by [`Fingerprint`] with single-flight fills.
//!
//! Expiry is checked lazily when an entry is accessed. An expired entry is
//! never served: readers that find one join the single refresh fetch and wait
//! for it to complete. A failed refresh clears the in-flight marker but keeps
//! the previous value and expiry, so the entry stays coherent and the next
//! access simply tries again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;
use crate::fingerprint::Fingerprint;

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V>>>;
type EntryMap<V> = Mutex<HashMap<Fingerprint, CacheEntry<V>>>;

struct CacheEntry<V> {
    value: Option<V>,
    expires_at: Instant,
    in_flight: Option<SharedFetch<V>>,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        self.value.is_some() && now < self.expires_at
    }
}

/// In-memory store of fingerprint to value.
pub struct CacheStore<V> {
    name: &'static str,
    entries: Arc<EntryMap<V>>,
}

impl<V> CacheStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty store. `name` only appears in logs.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Return the value if present and unexpired.
    ///
    /// An expired entry with no fetch in progress is evicted.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<V> {
        let mut entries = lock(&self.entries);
        let now = Instant::now();
        let entry = entries.get(fingerprint)?;
        if entry.is_fresh(now) {
            return entry.value.clone();
        }
        if entry.in_flight.is_none() {
            debug!(cache = self.name, key = %fingerprint, "Evicting expired entry");
            entries.remove(fingerprint);
        }
        None
    }

    /// Return the last stored value regardless of expiry.
    pub fn peek(&self, fingerprint: &Fingerprint) -> Option<V> {
        lock(&self.entries)
            .get(fingerprint)
            .and_then(|e| e.value.clone())
    }

    /// Number of fingerprints with an entry.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached value, or fill it with `fetch`.
    ///
    /// Concurrent callers for the same fingerprint share one invocation of
    /// `fetch` and all observe its outcome, success or failure. The fill keeps
    /// running for the remaining waiters if the caller that started it is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns the error produced by the shared fetch.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        fingerprint: Fingerprint,
        ttl: Duration,
        fetch: F,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let shared = {
            let mut entries = lock(&self.entries);
            let now = Instant::now();

            let entry = entries
                .entry(fingerprint.clone())
                .or_insert_with(|| CacheEntry {
                    value: None,
                    expires_at: now,
                    in_flight: None,
                });

            if let Some(in_flight) = &entry.in_flight {
                debug!(cache = self.name, key = %fingerprint, "Joining in-flight fetch");
                in_flight.clone()
            } else if let Some(value) = entry.value.as_ref().filter(|_| now < entry.expires_at) {
                return Ok(value.clone());
            } else {
                debug!(cache = self.name, key = %fingerprint, "Cache miss, fetching");
                let shared = fill(
                    Arc::downgrade(&self.entries),
                    fingerprint,
                    ttl,
                    fetch(),
                );
                entry.in_flight = Some(shared.clone());
                shared
            }
        };

        shared.await
    }
}

/// Wrap `fetch` so that its completion updates the entry it belongs to.
fn fill<V, Fut>(
    entries: Weak<EntryMap<V>>,
    fingerprint: Fingerprint,
    ttl: Duration,
    fetch: Fut,
) -> SharedFetch<V>
where
    V: Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<V>> + Send + 'static,
{
    async move {
        let result = fetch.await;
        if let Some(entries) = entries.upgrade() {
            let mut entries = lock(&entries);
            if let Some(entry) = entries.get_mut(&fingerprint) {
                entry.in_flight = None;
                match &result {
                    Ok(value) => {
                        entry.value = Some(value.clone());
                        entry.expires_at = Instant::now() + ttl;
                    }
                    Err(e) if entry.value.is_some() => {
                        debug!(key = %fingerprint, error = %e, "Fetch failed, keeping previous entry");
                    }
                    Err(e) => {
                        debug!(key = %fingerprint, error = %e, "Fetch failed, dropping empty entry");
                        entries.remove(&fingerprint);
                    }
                }
            }
        }
        result
    }
    .boxed()
    .shared()
}

fn lock<V>(entries: &EntryMap<V>) -> MutexGuard<'_, HashMap<Fingerprint, CacheEntry<V>>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::future::join_all;

    use super::*;
    use crate::error::Error;
    use crate::fingerprint::OperationKind;

    fn key(mode: &str) -> Fingerprint {
        Fingerprint::new(OperationKind::Ranking)
            .with("mode", mode)
            .with("limit", 150)
    }

    fn counted(
        calls: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u32>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(value)
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_fetch() {
        let store = CacheStore::new("test");
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        let results = join_all(
            (0..8).map(|_| store.get_or_fetch(key("day"), ttl, counted(&calls, 7))),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r == &Ok(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_fingerprints_fetch_separately() {
        let store = CacheStore::new("test");
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        let (a, b) = tokio::join!(
            store.get_or_fetch(key("day"), ttl, counted(&calls, 1)),
            store.get_or_fetch(key("week"), ttl, counted(&calls, 2)),
        );

        assert_eq!((a, b), (Ok(1), Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_boundary() {
        let store = CacheStore::new("test");
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(100);

        store.get_or_fetch(key("day"), ttl, counted(&calls, 1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(ttl - Duration::from_millis(1)).await;
        let v = store.get_or_fetch(key("day"), ttl, counted(&calls, 2)).await;
        assert_eq!(v, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        let v = store.get_or_fetch(key("day"), ttl, counted(&calls, 2)).await;
        assert_eq!(v, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_broadcast_and_not_cached() {
        let store: CacheStore<u32> = CacheStore::new("test");
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        let failing = || {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err::<u32, _>(Error::Query("invalid".into()))
            }
        };

        let (a, b) = tokio::join!(
            store.get_or_fetch(key("day"), ttl, failing()),
            store.get_or_fetch(key("day"), ttl, failing()),
        );
        assert_eq!(a, Err(Error::Query("invalid".into())));
        assert_eq!(b, Err(Error::Query("invalid".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The failure was not stored; the next access fetches again.
        assert!(store.is_empty());
        assert_eq!(store.peek(&key("day")), None);
        let v = store.get_or_fetch(key("day"), ttl, counted(&calls, 3)).await;
        assert_eq!(v, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_previous_value() {
        let store = CacheStore::new("test");
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(10);

        store.get_or_fetch(key("day"), ttl, counted(&calls, 1)).await.unwrap();
        tokio::time::advance(ttl).await;

        let err = store
            .get_or_fetch(key("day"), ttl, || async {
                Err::<u32, _>(Error::Transient("reset".into()))
            })
            .await;
        assert!(err.is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.peek(&key("day")), Some(1));
        assert_eq!(store.get(&key("day")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_evicts_expired_entry() {
        let store = CacheStore::new("test");
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(10);

        store.get_or_fetch(key("day"), ttl, counted(&calls, 1)).await.unwrap();
        assert_eq!(store.get(&key("day")), Some(1));
        assert_eq!(store.len(), 1);

        tokio::time::advance(ttl).await;
        assert_eq!(store.get(&key("day")), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_survives_dropped_leader() {
        let store = CacheStore::new("test");
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        let leader = tokio::time::timeout(
            Duration::from_millis(1),
            store.get_or_fetch(key("day"), ttl, counted(&calls, 9)),
        )
        .await;
        assert!(leader.is_err());

        let v = store.get_or_fetch(key("day"), ttl, counted(&calls, 10)).await;
        assert_eq!(v, Ok(9));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
