//! Object-storage client for vouchers and attachments.
//!
//! `POST /storage/upload` takes a multipart form (`file`, `folder`,
//! `userId`) and answers `{url, path, fileName}`, sometimes wrapped in
//! `data`. `DELETE /storage/delete` takes `{filePath}`.

use std::path::Path;

use bytes::{BufMut, Bytes, BytesMut};
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::client::ApiClient;
use crate::error::{ApiError, ApiResult};

const UPLOAD_PATH: &str = "storage/upload";
const DELETE_PATH: &str = "storage/delete";

/// A file held in memory, ready to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(file_name: &str, content_type: &str, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, guessing its content type from the extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.bin".to_string());
        let content_type = content_type_for(&file_name);
        Ok(Self::new(&file_name, content_type, bytes))
    }
}

/// Where the storage service put an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub url: String,
    pub path: String,
    pub file_name: String,
}

/// Thin wrapper over [`ApiClient`] for the storage endpoints.
#[derive(Clone)]
pub struct StorageClient {
    api: ApiClient,
}

impl StorageClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn upload(
        &self,
        file: &UploadFile,
        folder: &str,
        user_id: &str,
    ) -> ApiResult<UploadedFile> {
        let boundary = multipart_boundary()?;
        let body = encode_multipart(&boundary, file, folder, user_id);
        let content_type = format!("multipart/form-data; boundary={boundary}");

        debug!(file = %file.file_name, %folder, bytes = file.bytes.len(), "uploading file");
        let response = self
            .api
            .send_bytes(Method::POST, UPLOAD_PATH, &content_type, body)
            .await?;
        let uploaded = decode_upload_response(response)?;
        info!(path = %uploaded.path, "file uploaded");
        Ok(uploaded)
    }

    pub async fn delete(&self, file_path: &str) -> ApiResult<()> {
        self.api
            .delete_with_body(DELETE_PATH, &json!({ "filePath": file_path }))
            .await?;
        info!(path = %file_path, "file deleted");
        Ok(())
    }
}

fn decode_upload_response(response: Value) -> ApiResult<UploadedFile> {
    let payload = match response.get("data") {
        Some(inner @ Value::Object(_)) if inner.get("url").is_some() => inner.clone(),
        _ => response,
    };
    serde_json::from_value(payload).map_err(|e| ApiError::Decode(format!("upload response: {e}")))
}

fn multipart_boundary() -> ApiResult<String> {
    let mut raw = [0u8; 12];
    getrandom::getrandom(&mut raw).map_err(|e| {
        warn!(error = %e, "no entropy for multipart boundary");
        ApiError::InvalidRequest(format!("multipart boundary: {e}"))
    })?;
    let suffix: String = raw.iter().map(|b| format!("{b:02x}")).collect();
    Ok(format!("----campus-{suffix}"))
}

fn encode_multipart(boundary: &str, file: &UploadFile, folder: &str, user_id: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(file.bytes.len() + 512);

    for (name, value) in [("folder", folder), ("userId", user_id)] {
        buf.put_slice(format!("--{boundary}\r\n").as_bytes());
        buf.put_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }

    buf.put_slice(format!("--{boundary}\r\n").as_bytes());
    buf.put_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            file.file_name.replace('"', "")
        )
        .as_bytes(),
    );
    buf.put_slice(format!("Content-Type: {}\r\n\r\n", file.content_type).as_bytes());
    buf.put_slice(&file.bytes);
    buf.put_slice(b"\r\n");
    buf.put_slice(format!("--{boundary}--\r\n").as_bytes());

    buf.freeze()
}

fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_layout() {
        let file = UploadFile::new("voucher.pdf", "application/pdf", &b"%PDF-1.4"[..]);
        let body = encode_multipart("XYZ", &file, "vouchers", "42");
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.starts_with("--XYZ\r\nContent-Disposition: form-data; name=\"folder\"\r\n\r\nvouchers\r\n"));
        assert!(text.contains("name=\"userId\"\r\n\r\n42\r\n"));
        assert!(text.contains("filename=\"voucher.pdf\"\r\nContent-Type: application/pdf\r\n\r\n%PDF-1.4\r\n"));
        assert!(text.ends_with("--XYZ--\r\n"));
    }

    #[test]
    fn boundaries_differ() {
        let first = multipart_boundary().unwrap();
        assert!(first.starts_with("----campus-"));
        assert_eq!(first.len(), "----campus-".len() + 24);
        assert_ne!(first, multipart_boundary().unwrap());
    }

    #[test]
    fn upload_response_shapes() {
        let bare = json!({
            "url": "http://cdn/a.pdf",
            "path": "vouchers/a.pdf",
            "fileName": "a.pdf"
        });
        let wrapped = json!({"success": true, "data": bare.clone()});

        let a = decode_upload_response(bare).unwrap();
        let b = decode_upload_response(wrapped).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.path, "vouchers/a.pdf");

        assert!(matches!(
            decode_upload_response(json!({"ok": true})),
            Err(ApiError::Decode(_))
        ));
    }

    #[test]
    fn content_type_guessing() {
        assert_eq!(content_type_for("recibo.PDF"), "application/pdf");
        assert_eq!(content_type_for("foto.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[test]
    fn from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comprobante.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let file = UploadFile::from_path(&path).unwrap();
        assert_eq!(file.file_name, "comprobante.png");
        assert_eq!(file.content_type, "image/png");
        assert_eq!(file.bytes.len(), 4);
    }
}
