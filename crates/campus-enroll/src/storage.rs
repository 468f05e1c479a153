//! Object-storage seam used by the attachment pre-step.

use std::future::Future;
use std::pin::Pin;

use campus_client::{ApiResult, StorageClient, UploadFile, UploadedFile};

/// Boxed future returned by [`Storage`] methods.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = ApiResult<T>> + Send + 'a>>;

/// Upload/delete contract of the storage service.
pub trait Storage: Send + Sync {
    fn upload<'a>(
        &'a self,
        file: &'a UploadFile,
        folder: &'a str,
        user_id: &'a str,
    ) -> StorageFuture<'a, UploadedFile>;

    fn delete<'a>(&'a self, file_path: &'a str) -> StorageFuture<'a, ()>;
}

impl Storage for StorageClient {
    fn upload<'a>(
        &'a self,
        file: &'a UploadFile,
        folder: &'a str,
        user_id: &'a str,
    ) -> StorageFuture<'a, UploadedFile> {
        Box::pin(StorageClient::upload(self, file, folder, user_id))
    }

    fn delete<'a>(&'a self, file_path: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(StorageClient::delete(self, file_path))
    }
}
