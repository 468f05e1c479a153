//! Upload pre-step for writes whose payload carries a file URL.
//!
//! The file goes to object storage first; the main write only carries the
//! resulting URL. An upload failure never degrades into a silent empty
//! URL: the caller gets an error and keeps its inputs for a retry.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use campus_client::{ApiError, UploadFile, UploadedFile};

use crate::storage::Storage;

/// Whether a write may proceed without a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachmentPolicy {
    /// A file must be supplied and uploaded.
    Required,
    /// No file is fine; a supplied file must still upload.
    #[default]
    Optional,
}

/// Result of the pre-step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// Explicit "no attachment" marker; serialized as `null`.
    None,
    Uploaded(UploadedFile),
}

impl Attachment {
    pub fn url(&self) -> Option<&str> {
        match self {
            Attachment::None => None,
            Attachment::Uploaded(file) => Some(&file.url),
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            Attachment::None => None,
            Attachment::Uploaded(file) => Some(&file.path),
        }
    }

    /// Value for the payload field carrying the URL.
    pub fn url_value(&self) -> Value {
        self.url().map_or(Value::Null, |url| Value::String(url.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachmentError {
    #[error("an attachment is required")]
    Missing,

    #[error("upload failed: {0}")]
    Upload(#[source] ApiError),
}

impl AttachmentError {
    pub fn user_message(&self) -> String {
        match self {
            AttachmentError::Missing => "Please attach a file before saving.".to_string(),
            AttachmentError::Upload(e) => {
                format!("The file could not be uploaded. {}", e.user_message())
            }
        }
    }
}

/// Upload `file` (if any) into `folder` on behalf of `user_id`.
pub async fn prepare_attachment<S: Storage + ?Sized>(
    storage: &S,
    file: Option<&UploadFile>,
    folder: &str,
    user_id: &str,
    policy: AttachmentPolicy,
) -> Result<Attachment, AttachmentError> {
    let Some(file) = file else {
        return match policy {
            AttachmentPolicy::Required => Err(AttachmentError::Missing),
            AttachmentPolicy::Optional => Ok(Attachment::None),
        };
    };

    match storage.upload(file, folder, user_id).await {
        Ok(uploaded) => {
            debug!(path = %uploaded.path, "attachment uploaded");
            Ok(Attachment::Uploaded(uploaded))
        }
        Err(e) => {
            warn!(file = %file.file_name, %folder, error = %e, "attachment upload failed");
            Err(AttachmentError::Upload(e))
        }
    }
}

/// Best-effort delete of a file orphaned by a failed write. Failures are
/// logged, never returned.
pub async fn discard_attachment<S: Storage + ?Sized>(storage: &S, attachment: &Attachment) {
    let Some(path) = attachment.path() else {
        return;
    };
    match storage.delete(path).await {
        Ok(()) => debug!(%path, "orphaned attachment deleted"),
        Err(e) => warn!(%path, error = %e, "could not delete orphaned attachment"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStorage;

    fn voucher() -> UploadFile {
        UploadFile::new("voucher.pdf", "application/pdf", &b"%PDF"[..])
    }

    #[tokio::test]
    async fn no_file_yields_explicit_marker() {
        let storage = FakeStorage::default();
        let attachment =
            prepare_attachment(&storage, None, "vouchers", "1", AttachmentPolicy::Optional)
                .await
                .unwrap();
        assert_eq!(attachment, Attachment::None);
        assert_eq!(attachment.url_value(), Value::Null);
        assert!(storage.uploads().is_empty());
    }

    #[tokio::test]
    async fn required_without_file_is_an_error() {
        let storage = FakeStorage::default();
        let err = prepare_attachment(&storage, None, "vouchers", "1", AttachmentPolicy::Required)
            .await
            .unwrap_err();
        assert_eq!(err, AttachmentError::Missing);
    }

    #[tokio::test]
    async fn upload_failure_errors_under_both_policies() {
        let storage = FakeStorage::failing();
        let file = voucher();
        for policy in [AttachmentPolicy::Required, AttachmentPolicy::Optional] {
            let err = prepare_attachment(&storage, Some(&file), "vouchers", "1", policy)
                .await
                .unwrap_err();
            assert!(matches!(err, AttachmentError::Upload(ApiError::Network(_))));
        }
        // Input still usable for a retry.
        assert_eq!(file.file_name, "voucher.pdf");
    }

    #[tokio::test]
    async fn uploaded_file_carries_url() {
        let storage = FakeStorage::default();
        let attachment = prepare_attachment(
            &storage,
            Some(&voucher()),
            "vouchers",
            "7",
            AttachmentPolicy::Required,
        )
        .await
        .unwrap();
        assert_eq!(attachment.url(), Some("https://files.test/vouchers/voucher.pdf"));
        assert_eq!(storage.uploads(), vec![("vouchers".to_string(), "7".to_string())]);
    }

    #[tokio::test]
    async fn discard_swallows_delete_failures() {
        let storage = FakeStorage::default().failing_deletes();
        let attachment = prepare_attachment(
            &storage,
            Some(&voucher()),
            "vouchers",
            "7",
            AttachmentPolicy::Optional,
        )
        .await
        .unwrap();
        discard_attachment(&storage, &attachment).await;
        assert_eq!(storage.deletes(), vec!["vouchers/voucher.pdf".to_string()]);

        discard_attachment(&storage, &Attachment::None).await;
        assert_eq!(storage.deletes().len(), 1);
    }
}
