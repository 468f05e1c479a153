//! In-memory storage for unit tests.

use std::sync::Mutex;

use campus_client::{ApiError, UploadFile, UploadedFile};

use crate::storage::{Storage, StorageFuture};

#[derive(Default)]
pub(crate) struct FakeStorage {
    fail_upload: bool,
    fail_delete: bool,
    uploads: Mutex<Vec<(String, String)>>,
    deletes: Mutex<Vec<String>>,
}

impl FakeStorage {
    pub(crate) fn failing() -> Self {
        Self {
            fail_upload: true,
            ..Default::default()
        }
    }

    pub(crate) fn failing_deletes(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    /// `(folder, user_id)` per upload attempt.
    pub(crate) fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().unwrap().clone()
    }

    pub(crate) fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

impl Storage for FakeStorage {
    fn upload<'a>(
        &'a self,
        file: &'a UploadFile,
        folder: &'a str,
        user_id: &'a str,
    ) -> StorageFuture<'a, UploadedFile> {
        self.uploads
            .lock()
            .unwrap()
            .push((folder.to_string(), user_id.to_string()));
        let result = if self.fail_upload {
            Err(ApiError::Network("storage unreachable".into()))
        } else {
            Ok(UploadedFile {
                url: format!("https://files.test/{folder}/{}", file.file_name),
                path: format!("{folder}/{}", file.file_name),
                file_name: file.file_name.clone(),
            })
        };
        Box::pin(async move { result })
    }

    fn delete<'a>(&'a self, file_path: &'a str) -> StorageFuture<'a, ()> {
        self.deletes.lock().unwrap().push(file_path.to_string());
        let result = if self.fail_delete {
            Err(ApiError::Server {
                status: 500,
                message: None,
            })
        } else {
            Ok(())
        };
        Box::pin(async move { result })
    }
}
