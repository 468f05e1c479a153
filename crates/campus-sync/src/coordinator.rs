//! SyncCoordinator — the process-wide query cache.
//!
//! Reads go through [`SyncCoordinator::query`]: fresh data is returned
//! without touching the network, stale or missing data is fetched (with
//! bounded retries) and normalized into the entry. Writes go through
//! [`SyncCoordinator::mutate`], which publishes an invalidation event only
//! after the write succeeds.
//!
//! # Background tasks
//!
//! ```text
//! SyncCoordinator
//!   ├── invalidation listener   (bus → mark stale → refetch subscribed)
//!   └── garbage collector       (evict idle entries past cache_time)
//! ```
//!
//! Both tasks hold only a `Weak` handle and exit once the last
//! coordinator clone is dropped or [`SyncCoordinator::shutdown`] is called.
//!
//! # Ordering
//!
//! Every fetch takes the entry's next generation number when it starts.
//! A response is applied only if its generation is still current, so the
//! last *initiated* fetch wins regardless of arrival order. The cache lock
//! is never held across an `.await`.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use campus_client::{ApiResult, SessionEvent};
use campus_core::Domain;
use campus_core::config::CacheConfig;

use crate::entry::{CacheEntry, FetchFuture, Fetcher, QueryOptions, QueryResult, QueryStatus};
use crate::error::{SyncError, SyncResult};
use crate::invalidation::{InvalidationEvent, InvalidationReport};
use crate::key::{CollectionKey, KeyPattern};
use crate::mutation::MutationRequest;

const BUS_CAPACITY: usize = 64;
const BASE_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
const MIN_GC_INTERVAL: Duration = Duration::from_secs(1);

type Entries = HashMap<CollectionKey, CacheEntry>;

struct Inner {
    entries: Mutex<Entries>,
    next_entry_id: AtomicU64,
    defaults: QueryOptions,
    bus: broadcast::Sender<InvalidationEvent>,
    reports: broadcast::Sender<InvalidationReport>,
    shutdown: watch::Sender<bool>,
}

impl Inner {
    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().expect("cache lock")
    }

    fn entry_mut<'a>(
        &self,
        entries: &'a mut Entries,
        key: &CollectionKey,
        options: &QueryOptions,
        now: Instant,
    ) -> &'a mut CacheEntry {
        entries.entry(key.clone()).or_insert_with(|| {
            let id = self.next_entry_id.fetch_add(1, Ordering::Relaxed);
            CacheEntry::new(id, options, now)
        })
    }
}

/// Who is waiting on a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observer {
    /// A `query`/`refetch` caller awaiting the result.
    Caller,
    /// An invalidation-triggered refetch nobody awaits.
    Background,
}

/// Shared query cache. Cheap to clone; all clones share one cache.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    /// Create the coordinator and start its background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(defaults: QueryOptions, gc_interval: Duration) -> Self {
        let (bus, events) = broadcast::channel(BUS_CAPACITY);
        let (reports, _) = broadcast::channel(BUS_CAPACITY);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(Inner {
            entries: Mutex::new(HashMap::new()),
            next_entry_id: AtomicU64::new(1),
            defaults,
            bus,
            reports,
            shutdown,
        });

        tokio::spawn(run_listener(
            Arc::downgrade(&inner),
            events,
            shutdown_rx.clone(),
        ));
        tokio::spawn(run_gc(
            Arc::downgrade(&inner),
            gc_interval.max(MIN_GC_INTERVAL),
            shutdown_rx,
        ));

        debug!("sync coordinator started");
        Self { inner }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(QueryOptions::from_config(config), config.gc_interval())
    }

    /// Options used when a caller has none of its own.
    pub fn defaults(&self) -> &QueryOptions {
        &self.inner.defaults
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Serve `key` from cache when fresh, otherwise fetch it.
    ///
    /// Fresh hits return without suspending on the network. On failure
    /// after retries the entry keeps its previous data and reports
    /// `QueryStatus::Error`.
    pub async fn query<F, Fut>(
        &self,
        key: &CollectionKey,
        fetch: F,
        options: &QueryOptions,
    ) -> QueryResult
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<Value>> + Send + 'static,
    {
        if !options.enabled {
            debug!(%key, "query disabled");
            return QueryResult::idle();
        }

        let fetcher: Fetcher = Arc::new(move || -> FetchFuture { Box::pin(fetch()) });
        {
            let now = Instant::now();
            let mut entries = self.inner.entries();
            let entry = self.inner.entry_mut(&mut entries, key, options, now);
            entry.configure(options, fetcher);
            if entry.is_fresh(now) {
                debug!(%key, "cache hit");
                return entry.snapshot();
            }
        }

        debug!(%key, "cache miss");
        run_fetch(&self.inner, key, Observer::Caller).await
    }

    /// Fetch `key` again with its stored fetch function, ignoring freshness.
    pub async fn refetch(&self, key: &CollectionKey) -> SyncResult<QueryResult> {
        let known = self
            .inner
            .entries()
            .get(key)
            .is_some_and(|entry| entry.fetcher.is_some());
        if !known {
            return Err(SyncError::UnknownKey(key.clone()));
        }
        Ok(run_fetch(&self.inner, key, Observer::Caller).await)
    }

    /// Current snapshot of `key` without fetching.
    pub fn get(&self, key: &CollectionKey) -> Option<QueryResult> {
        self.inner.entries().get(key).map(CacheEntry::snapshot)
    }

    /// Seed `key` with data the caller already has (e.g. a record a
    /// create call returned). Supersedes any fetch in flight.
    pub fn set_data(&self, key: &CollectionKey, data: Value) {
        let now = Instant::now();
        let mut entries = self.inner.entries();
        let entry = self
            .inner
            .entry_mut(&mut entries, key, &self.inner.defaults, now);
        entry.generation += 1;
        entry.in_flight = false;
        entry.data = Some(data);
        entry.fetched_at = Some(now);
        entry.status = QueryStatus::Success;
        entry.error = None;
        entry.invalidated = false;
        if entry.subscribers == 0 {
            entry.idle_since = Some(now);
        }
        entry.publish();
        debug!(%key, "cache entry seeded");
    }

    /// Observe `key`. The entry is kept alive (and refetched on
    /// invalidation) while at least one subscription exists.
    pub fn subscribe(&self, key: &CollectionKey) -> Subscription {
        let now = Instant::now();
        let mut entries = self.inner.entries();
        let entry = self
            .inner
            .entry_mut(&mut entries, key, &self.inner.defaults, now);
        entry.subscribers += 1;
        entry.idle_since = None;
        Subscription {
            key: key.clone(),
            entry_id: entry.id,
            receiver: entry.tx.subscribe(),
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Run a write and, only if it succeeds, invalidate
    /// `request.invalidates`.
    ///
    /// Invalidation is handed to the background listener; this call does
    /// not wait for any refetch. Writes are never retried.
    pub async fn mutate<T, Fut>(&self, request: MutationRequest, mutation: Fut) -> SyncResult<T>
    where
        Fut: Future<Output = ApiResult<T>>,
    {
        debug!(kind = %request.kind, "mutation started");
        match mutation.await {
            Ok(value) => {
                info!(
                    kind = %request.kind,
                    patterns = request.invalidates.len(),
                    "mutation succeeded"
                );
                self.invalidate(&request.kind, request.invalidates);
                Ok(value)
            }
            Err(e) => {
                warn!(kind = %request.kind, error = %e, "mutation failed, cache left untouched");
                Err(SyncError::Api(e))
            }
        }
    }

    /// Publish an invalidation event for `patterns`.
    pub fn invalidate(&self, cause: &str, patterns: Vec<KeyPattern>) {
        if patterns.is_empty() {
            return;
        }
        let event = InvalidationEvent {
            cause: cause.to_string(),
            patterns,
        };
        if let Err(broadcast::error::SendError(event)) = self.inner.bus.send(event) {
            // Listener gone (after shutdown): apply inline so writes still
            // mark their keys stale.
            debug!(cause = %event.cause, "listener not running, applying inline");
            apply_invalidation(&self.inner, &event);
        }
    }

    /// Reports for every applied invalidation event.
    pub fn reports(&self) -> broadcast::Receiver<InvalidationReport> {
        self.inner.reports.subscribe()
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Drop every entry (sign-out). Subscribers observe an idle result,
    /// then their subscription ends.
    pub fn clear(&self) {
        let mut entries = self.inner.entries();
        let count = entries.len();
        for entry in entries.values() {
            entry.tx.send_replace(QueryResult::idle());
        }
        entries.clear();
        info!(entries = count, "cache cleared");
    }

    /// Clear the cache whenever the session ends or expires.
    pub fn watch_session(&self, mut events: broadcast::Receiver<SessionEvent>) {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::SignedOut | SessionEvent::Expired) => {
                        let Some(inner) = inner.upgrade() else { break };
                        SyncCoordinator { inner }.clear();
                    }
                    Ok(SessionEvent::SignedIn) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    /// Evict idle entries whose `cache_time` has elapsed. Returns the
    /// number evicted. The background sweeper calls this periodically.
    pub fn collect_garbage(&self) -> usize {
        collect_garbage(&self.inner, Instant::now())
    }

    /// Stop the background listener and sweeper.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        info!("sync coordinator stopped");
    }

    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached keys, sorted.
    pub fn keys(&self) -> Vec<CollectionKey> {
        let mut keys: Vec<_> = self.inner.entries().keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// A live view of one cache entry.
///
/// Dropping it releases the entry for garbage collection.
pub struct Subscription {
    key: CollectionKey,
    entry_id: u64,
    receiver: watch::Receiver<QueryResult>,
    inner: Weak<Inner>,
}

impl Subscription {
    pub fn key(&self) -> &CollectionKey {
        &self.key
    }

    pub fn current(&self) -> QueryResult {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the entry is gone.
    pub async fn changed(&mut self) -> Option<QueryResult> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let Ok(mut entries) = inner.entries.lock() else {
            return;
        };
        if let Some(entry) = entries.get_mut(&self.key) {
            if entry.id == self.entry_id {
                entry.subscribers = entry.subscribers.saturating_sub(1);
                if entry.subscribers == 0 {
                    entry.idle_since = Some(Instant::now());
                }
            }
        }
    }
}

/// Resets an entry whose fetch future was dropped before completing.
struct FetchGuard {
    inner: Arc<Inner>,
    key: CollectionKey,
    entry_id: u64,
    generation: u64,
    armed: bool,
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(mut entries) = self.inner.entries.lock() else {
            return;
        };
        if let Some(entry) = entries.get_mut(&self.key) {
            if entry.id == self.entry_id && entry.generation == self.generation {
                entry.in_flight = false;
                entry.status = entry.settled_status();
                if entry.subscribers == 0 {
                    entry.idle_since = Some(Instant::now());
                }
                entry.publish();
                debug!(key = %self.key, "fetch abandoned");
            }
        }
    }
}

async fn run_fetch(inner: &Arc<Inner>, key: &CollectionKey, observer: Observer) -> QueryResult {
    let (entry_id, generation, fetcher, retry, shape) = {
        let mut entries = inner.entries();
        let Some(entry) = entries.get_mut(key) else {
            return QueryResult::idle();
        };
        let Some(fetcher) = entry.fetcher.clone() else {
            return entry.snapshot();
        };
        entry.generation += 1;
        entry.in_flight = true;
        entry.status = QueryStatus::Loading;
        entry.publish();
        (
            entry.id,
            entry.generation,
            fetcher,
            entry.retry,
            entry.shape.clone(),
        )
    };

    let mut guard = FetchGuard {
        inner: inner.clone(),
        key: key.clone(),
        entry_id,
        generation,
        armed: true,
    };
    let outcome = fetch_with_retry(&fetcher, retry, key).await;
    guard.armed = false;

    let now = Instant::now();
    let mut entries = inner.entries();
    let Some(entry) = entries.get_mut(key).filter(|entry| entry.id == entry_id) else {
        debug!(%key, "entry removed while fetching, response discarded");
        return QueryResult::idle();
    };
    if entry.generation != generation {
        debug!(
            %key,
            generation,
            current = entry.generation,
            "superseded response discarded"
        );
        return entry.snapshot();
    }

    entry.in_flight = false;
    if observer == Observer::Background && entry.subscribers == 0 {
        debug!(%key, "no subscribers left, background response discarded");
        entry.status = entry.settled_status();
        entry.idle_since = Some(now);
        entry.publish();
        return entry.snapshot();
    }

    match outcome {
        Ok(raw) => {
            entry.data = Some(shape.normalize(raw));
            entry.fetched_at = Some(now);
            entry.status = QueryStatus::Success;
            entry.error = None;
            entry.invalidated = false;
        }
        Err(e) => {
            warn!(%key, error = %e, "fetch failed");
            entry.status = QueryStatus::Error;
            entry.error = Some(SyncError::Api(e));
        }
    }
    if entry.subscribers == 0 {
        entry.idle_since = Some(now);
    }
    entry.publish();
    entry.snapshot()
}

async fn fetch_with_retry(fetcher: &Fetcher, retry: u32, key: &CollectionKey) -> ApiResult<Value> {
    let mut attempt = 0;
    loop {
        match fetcher().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retry && e.is_retryable() => {
                let delay = retry_delay(attempt);
                debug!(%key, attempt = attempt + 1, ?delay, error = %e, "retrying fetch");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// 1s, 2s, 4s, ... capped at 30s.
fn retry_delay(attempt: u32) -> Duration {
    BASE_RETRY_DELAY
        .saturating_mul(1u32 << attempt.min(16))
        .min(MAX_RETRY_DELAY)
}

fn apply_invalidation(inner: &Arc<Inner>, event: &InvalidationEvent) -> InvalidationReport {
    let mut invalidated = Vec::new();
    let mut refetched = Vec::new();
    {
        let mut entries = inner.entries();
        // A key matched by several patterns is still handled once.
        let matched: BTreeSet<CollectionKey> = entries
            .keys()
            .filter(|key| event.patterns.iter().any(|p| p.matches(key)))
            .cloned()
            .collect();
        for key in matched {
            if let Some(entry) = entries.get_mut(&key) {
                entry.invalidated = true;
                if entry.in_flight {
                    // A response requested before the write must not clear
                    // the mark, so the fetch in flight is superseded.
                    entry.generation += 1;
                    entry.in_flight = false;
                    entry.status = entry.settled_status();
                    entry.publish();
                }
                if entry.subscribers > 0 && entry.fetcher.is_some() {
                    refetched.push(key.clone());
                }
            }
            invalidated.push(key);
        }
    }

    for key in &refetched {
        let inner = inner.clone();
        let key = key.clone();
        tokio::spawn(async move {
            run_fetch(&inner, &key, Observer::Background).await;
        });
    }

    debug!(
        cause = %event.cause,
        invalidated = invalidated.len(),
        refetched = refetched.len(),
        "invalidation applied"
    );
    let report = InvalidationReport {
        cause: event.cause.clone(),
        invalidated,
        refetched,
    };
    let _ = inner.reports.send(report.clone());
    report
}

fn collect_garbage(inner: &Inner, now: Instant) -> usize {
    let mut entries = inner.entries();
    let before = entries.len();
    entries.retain(|key, entry| {
        let expired = entry.is_expired(now);
        if expired {
            debug!(%key, "cache entry evicted");
        }
        !expired
    });
    before - entries.len()
}

async fn run_listener(
    inner: Weak<Inner>,
    mut events: broadcast::Receiver<InvalidationEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            received = events.recv() => {
                let event = match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(missed)) => {
                        // Unknown keys went stale; refetch everything.
                        warn!(missed, "invalidation listener lagged, invalidating all domains");
                        InvalidationEvent {
                            cause: "lagged".to_string(),
                            patterns: Domain::ALL.into_iter().map(KeyPattern::domain).collect(),
                        }
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(inner) = inner.upgrade() else { break };
                apply_invalidation(&inner, &event);
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("invalidation listener stopped");
}

async fn run_gc(inner: Weak<Inner>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                let evicted = collect_garbage(&inner, Instant::now());
                if evicted > 0 {
                    debug!(evicted, "garbage collection swept idle entries");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("garbage collector stopped");
}
