//! Injectable transport seam.
//!
//! Higher layers (cache services, the enrollment saga) talk to the backend
//! through [`Backend`] rather than [`ApiClient`] directly, so they can be
//! exercised against an in-process fake.

use std::future::Future;
use std::pin::Pin;

use http::Method;
use serde_json::Value;

use crate::client::ApiClient;
use crate::error::{ApiError, ApiResult};

/// Boxed future returned by [`Backend::call`].
pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = ApiResult<Value>> + Send + 'a>>;

/// A JSON REST backend.
pub trait Backend: Send + Sync {
    /// Issue one request. `query` is appended to the URL, `body` sent as JSON.
    fn call<'a>(
        &'a self,
        method: Method,
        path: &'a str,
        query: &'a [(String, String)],
        body: Option<&'a Value>,
    ) -> BackendFuture<'a>;

    fn get<'a>(&'a self, path: &'a str, query: &'a [(String, String)]) -> BackendFuture<'a> {
        self.call(Method::GET, path, query, None)
    }

    fn post<'a>(&'a self, path: &'a str, body: &'a Value) -> BackendFuture<'a> {
        self.call(Method::POST, path, &[], Some(body))
    }

    fn patch<'a>(&'a self, path: &'a str, body: &'a Value) -> BackendFuture<'a> {
        self.call(Method::PATCH, path, &[], Some(body))
    }

    fn delete<'a>(&'a self, path: &'a str) -> BackendFuture<'a> {
        self.call(Method::DELETE, path, &[], None)
    }
}

impl Backend for ApiClient {
    fn call<'a>(
        &'a self,
        method: Method,
        path: &'a str,
        query: &'a [(String, String)],
        body: Option<&'a Value>,
    ) -> BackendFuture<'a> {
        Box::pin(async move {
            match (method, body) {
                (Method::GET, _) => ApiClient::get(self, path, query).await,
                (Method::DELETE, None) => ApiClient::delete(self, path).await,
                (Method::DELETE, Some(body)) => self.delete_with_body(path, body).await,
                (Method::PATCH, body) => {
                    ApiClient::patch(self, path, body.unwrap_or(&Value::Null)).await
                }
                (Method::POST, body) => {
                    ApiClient::post(self, path, body.unwrap_or(&Value::Null)).await
                }
                (other, _) => Err(ApiError::InvalidRequest(format!(
                    "unsupported method {other} for {path}"
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::config::ApiConfig;

    use crate::session::SessionStore;

    #[tokio::test]
    async fn unsupported_methods_are_rejected_before_sending() {
        let config = ApiConfig {
            // Nothing listens here; a request that went out would fail as Network.
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout: "2s".to_string(),
            user_agent: None,
        };
        let client = ApiClient::new(&config, SessionStore::in_memory());
        let body = serde_json::json!({"titulo": "x"});

        let err = client
            .call(Method::PUT, "tareas/1", &[], Some(&body))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::InvalidRequest(msg) if msg.contains("PUT")));
    }
}
