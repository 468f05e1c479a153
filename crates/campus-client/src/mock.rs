//! Scripted in-process [`Backend`] for tests.
//!
//! Responses are queued per `(method, path)`. The last queued response
//! for a route is sticky, so a single `respond` serves every later call.
//! Unscripted routes answer `404`.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use http::Method;
use serde_json::Value;

use crate::backend::{Backend, BackendFuture};
use crate::error::{ApiError, ApiResult};

/// One request observed by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Default)]
pub struct MockBackend {
    routes: Mutex<HashMap<(Method, String), VecDeque<ApiResult<Value>>>>,
    calls: Mutex<Vec<RecordedCall>>,
    latency: Option<Duration>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response by `latency` (uses tokio time, so paused
    /// clocks apply).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a response for `method path`.
    pub fn respond(&self, method: Method, path: &str, result: ApiResult<Value>) -> &Self {
        self.routes
            .lock()
            .expect("mock lock")
            .entry((method, path.trim_start_matches('/').to_string()))
            .or_default()
            .push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("mock lock").clone()
    }

    pub fn call_count(&self, method: &Method, path: &str) -> usize {
        let path = path.trim_start_matches('/');
        self.calls
            .lock()
            .expect("mock lock")
            .iter()
            .filter(|c| &c.method == method && c.path == path)
            .count()
    }

    fn next_response(&self, method: &Method, path: &str) -> ApiResult<Value> {
        let mut routes = self.routes.lock().expect("mock lock");
        match routes.get_mut(&(method.clone(), path.to_string())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Ok(Value::Null)),
            Some(queue) => queue.front().cloned().unwrap_or(Ok(Value::Null)),
            None => Err(ApiError::Validation {
                status: 404,
                message: Some(format!("no mock route for {method} {path}")),
            }),
        }
    }
}

impl Backend for MockBackend {
    fn call<'a>(
        &'a self,
        method: Method,
        path: &'a str,
        query: &'a [(String, String)],
        body: Option<&'a Value>,
    ) -> BackendFuture<'a> {
        let path = path.trim_start_matches('/').to_string();
        self.calls.lock().expect("mock lock").push(RecordedCall {
            method: method.clone(),
            path: path.clone(),
            query: query.to_vec(),
            body: body.cloned(),
        });
        let response = self.next_response(&method, &path);
        let latency = self.latency;
        Box::pin(async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn last_response_is_sticky() {
        let mock = MockBackend::new();
        mock.respond(Method::GET, "aulas", Ok(json!([1])))
            .respond(Method::GET, "aulas", Ok(json!([2])));

        assert_eq!(mock.get("aulas", &[]).await.unwrap(), json!([1]));
        assert_eq!(mock.get("/aulas", &[]).await.unwrap(), json!([2]));
        assert_eq!(mock.get("aulas", &[]).await.unwrap(), json!([2]));
        assert_eq!(mock.call_count(&Method::GET, "aulas"), 3);
    }

    #[tokio::test]
    async fn unscripted_route_is_404() {
        let mock = MockBackend::new();
        let err = mock.post("matricula", &json!({})).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation { status: 404, .. }));
        assert_eq!(mock.calls()[0].body, Some(json!({})));
    }
}
