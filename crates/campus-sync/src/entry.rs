//! Cache entries, query options, and the observable query result.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use campus_client::ApiResult;
use campus_core::config::CacheConfig;

use crate::envelope::{UnwrapHints, unwrap_collection, unwrap_record};
use crate::error::SyncError;

/// Boxed future produced by a [`Fetcher`].
pub type FetchFuture = Pin<Box<dyn Future<Output = ApiResult<Value>> + Send>>;

/// Zero-argument fetch function stored with an entry so invalidation can
/// refetch without the original caller.
pub type Fetcher = Arc<dyn Fn() -> FetchFuture + Send + Sync>;

/// Lifecycle status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// How a raw response is normalized before it is cached.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Shape {
    /// Run the collection unwrap chain; result is always an array.
    #[default]
    Collection,
    /// Collection nested under a named field (`{aulas: [...]}`).
    CollectionIn(String),
    /// Run the single-record unwrap chain.
    Record,
    /// Cache the response as-is.
    Raw,
}

impl Shape {
    pub fn normalize(&self, raw: Value) -> Value {
        match self {
            Shape::Collection => Value::Array(unwrap_collection(&raw, &UnwrapHints::default())),
            Shape::CollectionIn(field) => Value::Array(unwrap_collection(
                &raw,
                &UnwrapHints {
                    resource: Some(field.as_str()),
                },
            )),
            Shape::Record => unwrap_record(&raw),
            Shape::Raw => raw,
        }
    }
}

/// Per-query options.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Data younger than this is served without a network call.
    pub stale_time: Duration,
    /// How long an unobserved entry is retained before eviction.
    pub cache_time: Duration,
    /// When false the query neither fetches nor serves.
    pub enabled: bool,
    /// Automatic retries for retryable read failures.
    pub retry: u32,
    pub shape: Shape,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(30),
            cache_time: Duration::from_secs(300),
            enabled: true,
            retry: 3,
            shape: Shape::Collection,
        }
    }
}

impl QueryOptions {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            stale_time: config.stale_time(),
            cache_time: config.cache_time(),
            retry: config.retry,
            ..Default::default()
        }
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn shape(mut self, shape: Shape) -> Self {
        self.shape = shape;
        self
    }
}

/// What a query caller (or subscriber) observes.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub data: Option<Value>,
    pub status: QueryStatus,
    pub error: Option<SyncError>,
}

impl QueryResult {
    pub fn idle() -> Self {
        Self {
            data: None,
            status: QueryStatus::Idle,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    /// Cached collection items (empty when there is no data yet).
    pub fn items(&self) -> &[Value] {
        self.data
            .as_ref()
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Deserialize the cached collection.
    pub fn items_as<T: DeserializeOwned>(&self) -> Result<Vec<T>, serde_json::Error> {
        self.items()
            .iter()
            .cloned()
            .map(serde_json::from_value)
            .collect()
    }

    /// Deserialize the cached record, if any.
    pub fn record_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        match &self.data {
            None | Some(Value::Null) => Ok(None),
            Some(v) => serde_json::from_value(v.clone()).map(Some),
        }
    }
}

/// One cached query result plus its bookkeeping.
pub(crate) struct CacheEntry {
    /// Distinguishes this entry from a later one under the same key.
    pub(crate) id: u64,
    pub(crate) data: Option<Value>,
    pub(crate) fetched_at: Option<Instant>,
    pub(crate) stale_after: Duration,
    pub(crate) expires_after: Duration,
    pub(crate) status: QueryStatus,
    pub(crate) error: Option<SyncError>,
    pub(crate) invalidated: bool,
    /// Bumped on every fetch start and direct write; the latest wins.
    pub(crate) generation: u64,
    pub(crate) in_flight: bool,
    pub(crate) subscribers: usize,
    pub(crate) idle_since: Option<Instant>,
    pub(crate) retry: u32,
    pub(crate) shape: Shape,
    pub(crate) fetcher: Option<Fetcher>,
    pub(crate) tx: watch::Sender<QueryResult>,
}

impl CacheEntry {
    pub(crate) fn new(id: u64, options: &QueryOptions, now: Instant) -> Self {
        let (tx, _) = watch::channel(QueryResult::idle());
        Self {
            id,
            data: None,
            fetched_at: None,
            stale_after: options.stale_time,
            expires_after: options.cache_time,
            status: QueryStatus::Idle,
            error: None,
            invalidated: false,
            generation: 0,
            in_flight: false,
            subscribers: 0,
            idle_since: Some(now),
            retry: options.retry,
            shape: options.shape.clone(),
            fetcher: None,
            tx,
        }
    }

    /// Adopt the latest caller's options and fetch function.
    pub(crate) fn configure(&mut self, options: &QueryOptions, fetcher: Fetcher) {
        self.stale_after = options.stale_time;
        self.expires_after = options.cache_time;
        self.retry = options.retry;
        self.shape = options.shape.clone();
        self.fetcher = Some(fetcher);
    }

    pub(crate) fn is_fresh(&self, now: Instant) -> bool {
        match (self.fetched_at, &self.data) {
            (Some(at), Some(_)) => !self.invalidated && now.duration_since(at) < self.stale_after,
            _ => false,
        }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.subscribers == 0
            && !self.in_flight
            && self
                .idle_since
                .is_some_and(|since| now.duration_since(since) >= self.expires_after)
    }

    /// Status to fall back to when a fetch is abandoned or discarded.
    pub(crate) fn settled_status(&self) -> QueryStatus {
        match (&self.data, &self.error) {
            (_, Some(_)) => QueryStatus::Error,
            (Some(_), None) => QueryStatus::Success,
            (None, None) => QueryStatus::Idle,
        }
    }

    pub(crate) fn snapshot(&self) -> QueryResult {
        QueryResult {
            data: self.data.clone(),
            status: self.status,
            error: self.error.clone(),
        }
    }

    /// Push the current snapshot to subscribers.
    pub(crate) fn publish(&self) {
        self.tx.send_replace(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn freshness_window() {
        let now = Instant::now();
        let opts = QueryOptions::default().stale_time(Duration::from_secs(10));
        let mut entry = CacheEntry::new(1, &opts, now);
        assert!(!entry.is_fresh(now));

        entry.data = Some(json!([]));
        entry.fetched_at = Some(now);
        assert!(entry.is_fresh(now + Duration::from_secs(9)));
        assert!(!entry.is_fresh(now + Duration::from_secs(10)));

        entry.invalidated = true;
        assert!(!entry.is_fresh(now));
    }

    #[test]
    fn expiry_requires_no_observers() {
        let now = Instant::now();
        let opts = QueryOptions::default().cache_time(Duration::from_secs(60));
        let mut entry = CacheEntry::new(1, &opts, now);
        let later = now + Duration::from_secs(61);
        assert!(entry.is_expired(later));

        entry.subscribers = 1;
        assert!(!entry.is_expired(later));

        entry.subscribers = 0;
        entry.in_flight = true;
        assert!(!entry.is_expired(later));
    }

    #[test]
    fn shapes_normalize() {
        let raw = json!({"info": {"data": [1, 2]}});
        assert_eq!(Shape::Collection.normalize(raw.clone()), json!([1, 2]));
        assert_eq!(Shape::Raw.normalize(raw.clone()), raw);
        assert_eq!(
            Shape::CollectionIn("aulas".into()).normalize(json!({"aulas": [3]})),
            json!([3])
        );
        assert_eq!(Shape::Record.normalize(json!({"data": {"id": 1}})), json!({"id": 1}));
    }

    #[test]
    fn typed_access() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Row {
            id: u32,
        }
        let result = QueryResult {
            data: Some(json!([{"id": 1}, {"id": 2}])),
            status: QueryStatus::Success,
            error: None,
        };
        assert_eq!(result.items().len(), 2);
        assert_eq!(result.items_as::<Row>().unwrap(), vec![Row { id: 1 }, Row { id: 2 }]);
        assert_eq!(QueryResult::idle().items_as::<Row>().unwrap(), vec![]);
        assert_eq!(QueryResult::idle().record_as::<Row>().unwrap(), None);
    }
}
