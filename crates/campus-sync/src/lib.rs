//! campus-sync — query cache and mutation-driven invalidation.
//!
//! One [`SyncCoordinator`] per process holds every server-fetched
//! collection the front end has looked at, keyed by [`CollectionKey`].
//! Reads are stale-while-revalidate; writes declare which keys they make
//! outdated and the coordinator refetches whatever is still being watched.
//!
//! # Components
//!
//! - **`key`** — `CollectionKey` / `KeyPattern`: cache identity and partial matching
//! - **`envelope`** — ordered unwrap strategies for the backend's response wrappers
//! - **`entry`** — `QueryOptions`, `QueryResult`, per-key bookkeeping
//! - **`coordinator`** — `SyncCoordinator`: query, mutate, subscribe, GC
//! - **`invalidation`** — bus events, reports, and the domain cascade table
//! - **`mutation`** — `MutationRequest`
//! - **`resource`** — `ResourceService`: CRUD for every domain through the cache

pub mod coordinator;
pub mod entry;
pub mod envelope;
pub mod error;
pub mod invalidation;
pub mod key;
pub mod mutation;
pub mod resource;

pub use coordinator::{Subscription, SyncCoordinator};
pub use entry::{FetchFuture, Fetcher, QueryOptions, QueryResult, QueryStatus, Shape};
pub use envelope::{UnwrapHints, unwrap_collection, unwrap_record};
pub use error::{SyncError, SyncResult};
pub use invalidation::{InvalidationEvent, InvalidationPolicy, InvalidationReport};
pub use key::{CollectionKey, KeyPattern};
pub use mutation::MutationRequest;
pub use resource::ResourceService;
