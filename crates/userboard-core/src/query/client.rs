//! The query cache.
//!
//! Each key owns one slot: the current `QueryState` (published through a
//! `watch` channel), the fetcher registered for the key, and at most one
//! in-flight fetch. The in-flight fetch is a `Shared` future, so every caller
//! that arrives while it runs awaits the same result instead of issuing a
//! duplicate request.
//!
//! Fetches are driven by a spawned task as well as by their awaiting
//! callers, so they run to completion even if every caller goes away. All
//! methods that may start a fetch must therefore run inside a tokio runtime.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tracing::{debug, trace};

use super::config::QueryConfig;
use super::state::{QueryState, QueryStatus};

/// Produces a fresh fetch of one key's data.
pub type Fetcher<V, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<V, E>> + Send + Sync>;

type InFlight<V, E> = Shared<BoxFuture<'static, Result<V, Arc<E>>>>;

struct Slot<V, E> {
    state: watch::Sender<QueryState<V, E>>,
    fetcher: Option<Fetcher<V, E>>,
    in_flight: Option<(u64, InFlight<V, E>)>,
    /// Set by `invalidate`, cleared when a fetch starts.
    invalidated: bool,
    fetched_at: Option<Instant>,
}

impl<V: Clone, E> Slot<V, E> {
    fn new() -> Self {
        let (state, _) = watch::channel(QueryState::pending());
        Self {
            state,
            fetcher: None,
            in_flight: None,
            invalidated: false,
            fetched_at: None,
        }
    }

    fn is_fresh(&self, stale_time: Duration) -> bool {
        !self.invalidated
            && self.in_flight.is_none()
            && self.state.borrow().status == QueryStatus::Success
            && self.fetched_at.is_some_and(|at| at.elapsed() < stale_time)
    }

    fn fresh_data(&self, stale_time: Duration) -> Option<V> {
        if self.is_fresh(stale_time) {
            self.state.borrow().data.clone()
        } else {
            None
        }
    }

    fn subscriber_count(&self) -> usize {
        self.state.receiver_count()
    }
}

struct Inner<K, V, E> {
    entries: DashMap<K, Slot<V, E>>,
    config: QueryConfig,
    next_fetch_id: AtomicU64,
}

impl<K, V, E> Inner<K, V, E>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Join the slot's in-flight fetch, or start one with `fetcher`.
    fn start_or_join(
        self: &Arc<Self>,
        key: &K,
        slot: &mut Slot<V, E>,
        fetcher: Fetcher<V, E>,
    ) -> InFlight<V, E> {
        if let Some((_, in_flight)) = &slot.in_flight {
            trace!(key = ?key, "Joining in-flight fetch");
            return in_flight.clone();
        }

        let id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let inner: Weak<Self> = Arc::downgrade(self);
        let owned_key = key.clone();
        let future = async move {
            let result = fetcher().await.map_err(Arc::new);
            if let Some(inner) = inner.upgrade() {
                inner.complete(&owned_key, id, &result);
            }
            result
        }
        .boxed()
        .shared();

        slot.invalidated = false;
        slot.in_flight = Some((id, future.clone()));
        slot.state.send_modify(|s| {
            s.is_fetching = true;
            // Nothing to show yet: a retry after a failed first fetch is pending again.
            if s.data.is_none() {
                s.status = QueryStatus::Pending;
                s.error = None;
            }
        });
        debug!(key = ?key, fetch_id = id, "Starting fetch");

        tokio::spawn(future.clone());
        future
    }

    /// Record the outcome of fetch `id`, unless the slot has moved on.
    fn complete(self: &Arc<Self>, key: &K, id: u64, result: &Result<V, Arc<E>>) {
        let Some(mut slot) = self.entries.get_mut(key) else {
            debug!(key = ?key, fetch_id = id, "Entry gone; discarding fetch result");
            return;
        };
        if !matches!(slot.in_flight, Some((current, _)) if current == id) {
            return;
        }

        slot.in_flight = None;
        let invalidated = slot.invalidated;
        match result {
            Ok(data) => {
                slot.fetched_at = Some(Instant::now());
                slot.state.send_modify(|s| {
                    s.status = QueryStatus::Success;
                    s.data = Some(data.clone());
                    s.error = None;
                    s.last_fetched_at = Some(Utc::now());
                    s.is_stale = invalidated;
                    s.is_fetching = false;
                });
                debug!(key = ?key, fetch_id = id, "Fetch succeeded");
            }
            Err(error) => {
                slot.state.send_modify(|s| {
                    s.status = QueryStatus::Error;
                    s.error = Some(Arc::clone(error));
                    s.is_stale = invalidated;
                    s.is_fetching = false;
                });
                debug!(key = ?key, fetch_id = id, "Fetch failed");
            }
        }

        // Invalidated while this fetch was running: its data may predate the change.
        if invalidated && slot.subscriber_count() > 0 {
            if let Some(fetcher) = slot.fetcher.clone() {
                let _ = self.start_or_join(key, &mut slot, fetcher);
            }
        }
    }
}

/// Keyed query cache. Clone is cheap and shares the entries.
pub struct QueryClient<K, V, E> {
    inner: Arc<Inner<K, V, E>>,
}

impl<K, V, E> Clone for QueryClient<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn boxed_fetcher<V, E, F, Fut>(fetcher: F) -> Fetcher<V, E>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
{
    Arc::new(move || fetcher().boxed())
}

impl<K, V, E> QueryClient<K, V, E>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(QueryConfig::default())
    }

    #[must_use]
    pub fn with_config(config: QueryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                config,
                next_fetch_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.inner.config
    }

    /// Read `key`, fetching it unless the cached value is still fresh.
    ///
    /// Concurrent callers for the same key share one in-flight fetch.
    pub async fn fetch<F, Fut>(&self, key: K, fetcher: F) -> Result<V, Arc<E>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.fetch_with(key, boxed_fetcher(fetcher)).await
    }

    pub async fn fetch_with(&self, key: K, fetcher: Fetcher<V, E>) -> Result<V, Arc<E>> {
        let in_flight = {
            let mut slot = self.inner.entries.entry(key.clone()).or_insert_with(Slot::new);
            slot.fetcher = Some(Arc::clone(&fetcher));
            if let Some(data) = slot.fresh_data(self.inner.config.stale_time) {
                trace!(key = ?key, "Serving fresh cached data");
                return Ok(data);
            }
            self.inner.start_or_join(&key, &mut slot, fetcher)
        };
        in_flight.await
    }

    /// Observe `key`, registering `fetcher` for refetches.
    ///
    /// Starts a background fetch if the entry is missing or stale.
    pub fn subscribe<F, Fut>(&self, key: K, fetcher: F) -> QuerySubscription<V, E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.subscribe_with(key, boxed_fetcher(fetcher))
    }

    pub fn subscribe_with(&self, key: K, fetcher: Fetcher<V, E>) -> QuerySubscription<V, E> {
        let mut slot = self.inner.entries.entry(key.clone()).or_insert_with(Slot::new);
        slot.fetcher = Some(Arc::clone(&fetcher));
        let receiver = slot.state.subscribe();
        if !slot.is_fresh(self.inner.config.stale_time) {
            let _ = self.inner.start_or_join(&key, &mut slot, fetcher);
        }
        QuerySubscription { receiver }
    }

    /// Mark `key` stale. Active subscribers trigger an immediate refetch;
    /// otherwise the next read refetches. Returns whether the key was cached.
    pub fn invalidate(&self, key: &K) -> bool {
        let Some(mut slot) = self.inner.entries.get_mut(key) else {
            return false;
        };

        slot.invalidated = true;
        slot.state.send_modify(|s| s.is_stale = true);
        let subscribers = slot.subscriber_count();
        debug!(key = ?key, subscribers, "Invalidated query");

        if slot.in_flight.is_none() && subscribers > 0 {
            if let Some(fetcher) = slot.fetcher.clone() {
                let _ = self.inner.start_or_join(key, &mut slot, fetcher);
            }
        }
        true
    }

    pub fn invalidate_all(&self) {
        let keys: Vec<K> = self.inner.entries.iter().map(|e| e.key().clone()).collect();
        for key in &keys {
            self.invalidate(key);
        }
    }

    /// Current state of `key`, with time-based staleness folded into `is_stale`.
    pub fn state(&self, key: &K) -> Option<QueryState<V, E>> {
        self.inner.entries.get(key).map(|slot| {
            let mut state = slot.state.borrow().clone();
            if state.is_success() && !slot.is_fresh(self.inner.config.stale_time) {
                state.is_stale = true;
            }
            state
        })
    }

    /// Evict entries nobody observes that were last fetched over `cache_time` ago.
    pub fn gc(&self) -> usize {
        let cache_time = self.inner.config.cache_time;
        let mut evicted = 0;
        self.inner.entries.retain(|_, slot| {
            let keep = slot.subscriber_count() > 0
                || slot.in_flight.is_some()
                || slot.fetched_at.is_some_and(|at| at.elapsed() <= cache_time);
            if !keep {
                evicted += 1;
            }
            keep
        });
        if evicted > 0 {
            debug!(evicted, "Garbage collected query entries");
        }
        evicted
    }

    /// Drop every entry. Subscriptions close; in-flight fetches finish unobserved.
    pub fn dispose(&self) {
        let count = self.inner.entries.len();
        self.inner.entries.clear();
        debug!(count, "Disposed query cache");
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

impl<K, V, E> Default for QueryClient<K, V, E>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A live view of one cache entry. Dropping it unsubscribes.
pub struct QuerySubscription<V, E> {
    receiver: watch::Receiver<QueryState<V, E>>,
}

impl<V: Clone, E> QuerySubscription<V, E> {
    pub fn state(&self) -> QueryState<V, E> {
        self.receiver.borrow().clone()
    }

    /// Whether the state changed since it was last marked seen.
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// Current state, marking it seen.
    pub fn take(&mut self) -> QueryState<V, E> {
        self.receiver.borrow_and_update().clone()
    }

    /// Wait for the next state change. Returns `false` once the cache entry is gone.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Wait until the state satisfies `predicate`.
    pub async fn wait_until(
        &mut self,
        predicate: impl FnMut(&QueryState<V, E>) -> bool,
    ) -> Option<QueryState<V, E>> {
        self.receiver.wait_for(predicate).await.ok().map(|state| state.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    type TestClient = QueryClient<&'static str, usize, String>;

    /// A fetcher returning how many times it has been called.
    fn counting_fetcher(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
    ) -> impl Fn() -> BoxFuture<'static, Result<usize, String>> + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move || {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(delay).await;
                Ok(n)
            }
            .boxed()
        }
    }

    fn long_lived() -> TestClient {
        QueryClient::with_config(QueryConfig::new(
            Duration::from_secs(60),
            Duration::from_secs(300),
        ))
    }

    #[tokio::test]
    async fn test_fresh_entry_is_served_from_cache() {
        let client = long_lived();
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(client.fetch("users", counting_fetcher(&calls, Duration::ZERO)).await, Ok(1));
        assert_eq!(client.fetch("users", counting_fetcher(&calls, Duration::ZERO)).await, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_stale_time_refetches() {
        let client = TestClient::new();
        let calls = Arc::new(AtomicUsize::new(0));

        client.fetch("users", counting_fetcher(&calls, Duration::ZERO)).await.unwrap();
        let second = client.fetch("users", counting_fetcher(&calls, Duration::ZERO)).await;
        assert_eq!(second, Ok(2));
    }

    #[tokio::test]
    async fn test_concurrent_fetches_are_deduplicated() {
        let client = TestClient::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            client.fetch("users", counting_fetcher(&calls, Duration::from_millis(50))),
            client.fetch("users", counting_fetcher(&calls, Duration::from_millis(50))),
        );
        assert_eq!(a, Ok(1));
        assert_eq!(b, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_fetch_independently() {
        let client = TestClient::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            client.fetch("users", counting_fetcher(&calls, Duration::from_millis(20))),
            client.fetch("user/1", counting_fetcher(&calls, Duration::from_millis(20))),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_sets_error_without_data() {
        let client = TestClient::new();
        let err = client
            .fetch("users", || async { Err::<usize, _>("boom".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(*err, "boom");

        let state = client.state(&"users").unwrap();
        assert_eq!(state.status, QueryStatus::Error);
        assert!(state.data.is_none());
        assert_eq!(state.error.as_deref().map(String::as_str), Some("boom"));
        assert!(!state.is_fetching);
    }

    #[tokio::test]
    async fn test_failed_refetch_keeps_previous_data() {
        let client = TestClient::new();
        client.fetch("users", || async { Ok::<_, String>(7) }).await.unwrap();
        client
            .fetch("users", || async { Err::<usize, _>("down".to_string()) })
            .await
            .unwrap_err();

        let state = client.state(&"users").unwrap();
        assert!(state.is_error());
        assert_eq!(state.data, Some(7));
    }

    #[tokio::test]
    async fn test_retry_after_failed_first_fetch_is_pending() {
        let client = long_lived();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut sub = client.subscribe("users", move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    return Err("down".to_string());
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(n)
            }
        });

        let failed = sub.wait_until(|s| s.is_settled()).await.unwrap();
        assert!(failed.is_error());
        assert!(failed.data.is_none());

        client.invalidate(&"users");
        let retrying = sub.state();
        assert_eq!(retrying.status, QueryStatus::Pending);
        assert!(retrying.is_fetching);
        assert!(retrying.error.is_none());

        let recovered = sub.wait_until(|s| s.is_settled()).await.unwrap();
        assert!(recovered.is_success());
        assert_eq!(recovered.data, Some(1));
    }

    #[tokio::test]
    async fn test_refetch_after_failure_with_data_keeps_error_status() {
        let client = long_lived();
        client.fetch("users", || async { Ok::<_, String>(7) }).await.unwrap();
        client.invalidate(&"users");
        client
            .fetch("users", || async { Err::<usize, _>("down".to_string()) })
            .await
            .unwrap_err();

        let mut sub = client.subscribe("users", || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, String>(8)
        });
        // Previous data stays visible, so the status is not reset to pending.
        let state = sub.state();
        assert!(state.is_error());
        assert!(state.is_fetching);
        assert_eq!(state.data, Some(7));

        let settled = sub.wait_until(|s| s.is_settled()).await.unwrap();
        assert_eq!(settled.data, Some(8));
    }

    #[tokio::test]
    async fn test_invalidate_absent_key() {
        let client = TestClient::new();
        assert!(!client.invalidate(&"users"));
    }

    #[tokio::test]
    async fn test_invalidate_without_subscribers_refetches_lazily() {
        let client = long_lived();
        let calls = Arc::new(AtomicUsize::new(0));

        client.fetch("users", counting_fetcher(&calls, Duration::ZERO)).await.unwrap();
        assert!(client.invalidate(&"users"));

        // Nobody is watching, so nothing is fetched yet.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(client.state(&"users").unwrap().is_stale);

        let value = client.fetch("users", counting_fetcher(&calls, Duration::ZERO)).await;
        assert_eq!(value, Ok(2));
        assert!(!client.state(&"users").unwrap().is_stale);
    }

    #[tokio::test]
    async fn test_invalidate_with_subscriber_refetches_immediately() {
        let client = long_lived();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut sub = client.subscribe("users", counting_fetcher(&calls, Duration::ZERO));
        let first = sub.wait_until(|s| s.is_success()).await.unwrap();
        assert_eq!(first.data, Some(1));

        client.invalidate(&"users");
        let second = sub.wait_until(|s| s.data == Some(2)).await.unwrap();
        assert!(second.is_success());
        assert!(!second.is_stale);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_during_fetch_refetches_after_completion() {
        let client = long_lived();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut sub = client.subscribe("users", counting_fetcher(&calls, Duration::from_millis(30)));
        client.invalidate(&"users");

        let state = sub.wait_until(|s| s.data == Some(2) && !s.is_fetching).await.unwrap();
        assert!(state.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_all_marks_every_entry_stale() {
        let client = long_lived();
        client.fetch("a", || async { Ok::<_, String>(1) }).await.unwrap();
        client.fetch("b", || async { Ok::<_, String>(2) }).await.unwrap();

        client.invalidate_all();
        assert!(client.state(&"a").unwrap().is_stale);
        assert!(client.state(&"b").unwrap().is_stale);
    }

    #[tokio::test]
    async fn test_subscribe_reports_pending_then_success() {
        let client = TestClient::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut sub = client.subscribe("users", counting_fetcher(&calls, Duration::from_millis(20)));
        let initial = sub.state();
        assert!(initial.is_pending());
        assert!(initial.is_fetching);

        let settled = sub.wait_until(|s| s.is_settled()).await.unwrap();
        assert!(settled.is_success());
        assert!(settled.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn test_subscribe_to_fresh_entry_does_not_refetch() {
        let client = long_lived();
        let calls = Arc::new(AtomicUsize::new(0));

        client.fetch("users", counting_fetcher(&calls, Duration::ZERO)).await.unwrap();
        let sub = client.subscribe("users", counting_fetcher(&calls, Duration::ZERO));
        assert_eq!(sub.state().data, Some(1));
        assert!(!sub.state().is_fetching);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gc_evicts_only_unobserved_entries() {
        let client: TestClient =
            QueryClient::with_config(QueryConfig::new(Duration::ZERO, Duration::ZERO));
        client.fetch("a", || async { Ok::<_, String>(1) }).await.unwrap();
        let mut sub = client.subscribe("b", || async { Ok::<_, String>(2) });
        sub.wait_until(|s| s.is_settled()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(client.gc(), 1);
        assert!(client.state(&"a").is_none());
        assert!(client.state(&"b").is_some());
    }

    #[tokio::test]
    async fn test_dispose_closes_subscriptions() {
        let client = TestClient::new();
        let mut sub = client.subscribe("users", || async { Ok::<_, String>(1) });
        sub.wait_until(|s| s.is_settled()).await.unwrap();

        client.dispose();
        assert!(client.is_empty());
        assert!(!sub.changed().await);
    }

    #[tokio::test]
    async fn test_dispose_during_fetch_discards_result() {
        let client = TestClient::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let _sub = client.subscribe("users", counting_fetcher(&calls, Duration::from_millis(20)));

        client.dispose();
        tokio::time::sleep(Duration::from_millis(50)).await;
        // The fetch ran to completion but had nowhere to land.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(client.state(&"users").is_none());
    }
}
