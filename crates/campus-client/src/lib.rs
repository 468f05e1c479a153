//! campus-client — transport layer for the Campus backend.
//!
//! Wraps the school-management REST API behind a small typed client.
//! Every call carries the bearer token from the persisted session,
//! enforces a uniform per-request timeout, and classifies failures into
//! [`ApiError`] so callers can tell a dropped connection from a rejected
//! payload.
//!
//! # Components
//!
//! - **`backend`** — `Backend`: injectable transport trait (implemented by `ApiClient`)
//! - **`client`** — `ApiClient`: JSON requests over a pooled hyper client
//! - **`error`** — error taxonomy and backend message extraction
//! - **`session`** — `SessionStore`: auth blob persisted to `session.json`
//! - **`storage`** — `StorageClient`: multipart uploads and deletes
//!
//! A `401` from any endpoint clears the persisted session and publishes
//! [`SessionEvent::Expired`] before the error reaches the caller.

pub mod backend;
pub mod client;
pub mod error;
pub mod session;
pub mod storage;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use backend::{Backend, BackendFuture};
pub use client::{ApiClient, resource_path};
pub use error::{ApiError, ApiResult};
pub use session::{AuthSession, SessionError, SessionEvent, SessionStore};
pub use storage::{StorageClient, UploadFile, UploadedFile};
