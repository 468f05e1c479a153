//! JSON-over-HTTP client for the Campus backend.
//!
//! One pooled hyper client is shared by every clone of [`ApiClient`].
//! Each exchange (send + body collection) runs under a single
//! `tokio::time::timeout`, so a slow body counts against the same budget
//! as a slow connect.

use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{Method, Request, header};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use tracing::{debug, warn};

use campus_core::config::ApiConfig;

use crate::error::{ApiError, ApiResult};
use crate::session::SessionStore;

const DEFAULT_USER_AGENT: &str = concat!("campus-client/", env!("CARGO_PKG_VERSION"));

/// Thread-safe backend client. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    timeout: Duration,
    user_agent: String,
    session: SessionStore,
    http: Client<HttpConnector, Full<Bytes>>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, session: SessionStore) -> Self {
        let http = Client::builder(TokioExecutor::new()).build_http();
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.request_timeout(),
            user_agent: config
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            session,
            http,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a backend path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `GET /{path}?{query}`.
    pub async fn get(&self, path: &str, query: &[(String, String)]) -> ApiResult<Value> {
        let mut uri = self.url(path);
        if !query.is_empty() {
            uri.push('?');
            uri.push_str(&encode_query(query));
        }
        self.execute(Method::GET, uri, None, Bytes::new()).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> ApiResult<Value> {
        self.send_json(Method::POST, path, body).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> ApiResult<Value> {
        self.send_json(Method::PATCH, path, body).await
    }

    pub async fn delete(&self, path: &str) -> ApiResult<Value> {
        self.execute(Method::DELETE, self.url(path), None, Bytes::new())
            .await
    }

    /// `DELETE` carrying a JSON body (the storage service expects one).
    pub async fn delete_with_body(&self, path: &str, body: &Value) -> ApiResult<Value> {
        self.send_json(Method::DELETE, path, body).await
    }

    /// Send a pre-encoded body with an explicit content type.
    pub async fn send_bytes(
        &self,
        method: Method,
        path: &str,
        content_type: &str,
        body: Bytes,
    ) -> ApiResult<Value> {
        self.execute(method, self.url(path), Some(content_type), body)
            .await
    }

    async fn send_json(&self, method: Method, path: &str, body: &Value) -> ApiResult<Value> {
        let bytes = serde_json::to_vec(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.execute(method, self.url(path), Some("application/json"), Bytes::from(bytes))
            .await
    }

    async fn execute(
        &self,
        method: Method,
        uri: String,
        content_type: Option<&str>,
        body: Bytes,
    ) -> ApiResult<Value> {
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(&uri)
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, &self.user_agent);
        if let Some(ct) = content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        if let Some(token) = self.session.token() {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = builder
            .body(Full::new(body))
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

        let started = Instant::now();
        let exchange = async {
            let resp = self
                .http
                .request(req)
                .await
                .map_err(|e| ApiError::Network(e.to_string()))?;
            let status = resp.status();
            let bytes = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| ApiError::Network(e.to_string()))?
                .to_bytes();
            Ok::<_, ApiError>((status, bytes))
        };

        let (status, bytes) = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result.inspect_err(|e| {
                debug!(%method, %uri, error = %e, "backend call failed");
            })?,
            Err(_) => {
                debug!(%method, %uri, timeout = ?self.timeout, "backend call timed out");
                return Err(ApiError::Timeout(self.timeout));
            }
        };

        debug!(
            %method,
            %uri,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "backend call"
        );

        if status.is_success() {
            return parse_body(&bytes);
        }

        let body = parse_body(&bytes).unwrap_or(Value::Null);
        let err = ApiError::from_status(status.as_u16(), &body);
        if err.is_unauthorized() {
            warn!(%uri, "backend rejected the session token");
            self.session.expire();
        }
        Err(err)
    }
}

/// Empty bodies decode to `null`.
fn parse_body(bytes: &[u8]) -> ApiResult<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

/// `application/x-www-form-urlencoded` query string.
pub fn encode_query(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Join path segments, percent-encoding each one so an id can never
/// address a different endpoint.
pub fn resource_path(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|segment| urlencoding::encode(segment))
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(base_url: &str) -> ApiConfig {
        ApiConfig {
            base_url: base_url.to_string(),
            request_timeout: "2s".to_string(),
            user_agent: None,
        }
    }

    /// Accept one connection, capture the request head, reply with `response`.
    async fn one_shot_server(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn url_joins_without_double_slash() {
        let client = ApiClient::new(&config("http://host/api/"), SessionStore::in_memory());
        assert_eq!(client.url("/matricula"), "http://host/api/matricula");
        assert_eq!(client.url("aulas/3"), "http://host/api/aulas/3");
    }

    #[test]
    fn query_encoding() {
        let pairs = vec![
            ("grado".to_string(), "3A".to_string()),
            ("q".to_string(), "María García".to_string()),
        ];
        assert_eq!(encode_query(&pairs), "grado=3A&q=Mar%C3%ADa%20Garc%C3%ADa");
    }

    #[test]
    fn path_segments_are_encoded() {
        assert_eq!(resource_path(&["matricula", "7"]), "matricula/7");
        assert_eq!(
            resource_path(&["matricula", "A/1 b?x", "asignar-aula"]),
            "matricula/A%2F1%20b%3Fx/asignar-aula"
        );
    }

    #[test]
    fn empty_body_is_null() {
        assert_eq!(parse_body(b"").unwrap(), Value::Null);
        assert_eq!(parse_body(b"  \n").unwrap(), Value::Null);
        assert!(matches!(parse_body(b"<html>"), Err(ApiError::Decode(_))));
    }

    #[tokio::test]
    async fn get_sends_bearer_token_and_decodes_json() {
        let (base, server) = one_shot_server(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 13\r\nconnection: close\r\n\r\n{\"data\":[1]}\n",
        )
        .await;
        let session = SessionStore::in_memory();
        session
            .save(crate::session::AuthSession::signed_in("abc", None, None))
            .unwrap();
        let client = ApiClient::new(&config(&base), session);

        let body = client.get("aulas", &[]).await.unwrap();
        assert_eq!(body, json!({"data": [1]}));

        let head = server.await.unwrap().to_ascii_lowercase();
        assert!(head.starts_with("get /aulas http/1.1"));
        assert!(head.contains("authorization: bearer abc"));
    }

    #[tokio::test]
    async fn unauthorized_clears_session() {
        let (base, _server) = one_shot_server(
            "HTTP/1.1 401 Unauthorized\r\ncontent-type: application/json\r\ncontent-length: 27\r\nconnection: close\r\n\r\n{\"message\":\"token vencido\"}",
        )
        .await;
        let session = SessionStore::in_memory();
        session
            .save(crate::session::AuthSession::signed_in("old", None, None))
            .unwrap();
        let client = ApiClient::new(&config(&base), session.clone());

        let err = client.get("matricula", &[]).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(session.token().is_none());
    }

    #[tokio::test]
    async fn unreachable_backend_is_network_error() {
        let client = ApiClient::new(&config("http://127.0.0.1:1"), SessionStore::in_memory());
        let err = client.get("aulas", &[]).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }
}
