//! Error types for the sync layer.

use campus_client::ApiError;
use thiserror::Error;

use crate::key::CollectionKey;

/// Result type alias for coordinator operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The backend call failed; carries the classified transport error.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// `refetch` on a key that has never been queried.
    #[error("no fetch function registered for {0}")]
    UnknownKey(CollectionKey),
}

impl SyncError {
    /// Text suitable for a user-facing notification.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Api(e) => e.user_message(),
            SyncError::UnknownKey(_) => "Nothing to refresh yet.".to_string(),
        }
    }

    pub fn api(&self) -> Option<&ApiError> {
        match self {
            SyncError::Api(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.api().is_some_and(ApiError::is_unauthorized)
    }
}
