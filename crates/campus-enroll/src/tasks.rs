//! Task creation with an optional attachment.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use campus_client::{Backend, UploadFile};
use campus_core::Domain;
use campus_sync::{InvalidationPolicy, MutationRequest, SyncCoordinator, SyncError};

use crate::attachment::{
    AttachmentError, AttachmentPolicy, discard_attachment, prepare_attachment,
};
use crate::storage::Storage;

pub const TASK_FOLDER: &str = "tareas";
/// Payload field carrying the attachment URL.
pub const ATTACHMENT_FIELD: &str = "archivoUrl";

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("attachment failed: {0}")]
    Attachment(#[source] AttachmentError),

    #[error("task could not be created: {0}")]
    Create(#[source] SyncError),
}

impl TaskError {
    pub fn user_message(&self) -> String {
        match self {
            TaskError::Attachment(e) => e.user_message(),
            TaskError::Create(e) => e.user_message(),
        }
    }
}

pub struct TaskService<B, S> {
    backend: Arc<B>,
    storage: Arc<S>,
    sync: SyncCoordinator,
    policy: InvalidationPolicy,
}

impl<B: Backend, S: Storage> TaskService<B, S> {
    pub fn new(backend: Arc<B>, storage: Arc<S>, sync: SyncCoordinator) -> Self {
        Self {
            backend,
            storage,
            sync,
            policy: InvalidationPolicy::default(),
        }
    }

    /// Upload `attachment` (if any) then `POST /tareas` with its URL.
    pub async fn create(
        &self,
        task: &Value,
        attachment: Option<&UploadFile>,
        user_id: &str,
        policy: AttachmentPolicy,
    ) -> Result<Value, TaskError> {
        let uploaded = prepare_attachment(
            self.storage.as_ref(),
            attachment,
            TASK_FOLDER,
            user_id,
            policy,
        )
        .await
        .map_err(TaskError::Attachment)?;

        let mut payload = task.clone();
        if let Value::Object(fields) = &mut payload {
            fields.insert(ATTACHMENT_FIELD.to_string(), uploaded.url_value());
        }

        let mutation = MutationRequest::on_domain("task.create", Domain::Tasks, &self.policy);
        match self
            .sync
            .mutate(mutation, self.backend.post(Domain::Tasks.path(), &payload))
            .await
        {
            Ok(created) => {
                info!(attachment = uploaded.path().unwrap_or("-"), "task created");
                Ok(created)
            }
            Err(e) => {
                warn!(error = %e, "task creation failed");
                discard_attachment(self.storage.as_ref(), &uploaded).await;
                Err(TaskError::Create(e))
            }
        }
    }
}
