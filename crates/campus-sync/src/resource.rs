//! CRUD over the backend's resource endpoints, routed through the cache.
//!
//! Reads are cached queries keyed by [`CollectionKey`]; writes are
//! mutations that invalidate the written domain plus its cascade.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use campus_client::{Backend, resource_path};
use campus_core::Domain;

use crate::coordinator::SyncCoordinator;
use crate::entry::{QueryOptions, QueryResult, Shape};
use crate::error::SyncResult;
use crate::invalidation::InvalidationPolicy;
use crate::key::CollectionKey;
use crate::mutation::MutationRequest;

/// Resource CRUD for every [`Domain`].
pub struct ResourceService<B> {
    backend: Arc<B>,
    sync: SyncCoordinator,
    policy: InvalidationPolicy,
    options: QueryOptions,
}

impl<B> Clone for ResourceService<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            sync: self.sync.clone(),
            policy: self.policy.clone(),
            options: self.options.clone(),
        }
    }
}

impl<B: Backend + 'static> ResourceService<B> {
    pub fn new(backend: Arc<B>, sync: SyncCoordinator) -> Self {
        let options = sync.defaults().clone();
        Self {
            backend,
            sync,
            policy: InvalidationPolicy::default(),
            options,
        }
    }

    pub fn with_policy(mut self, policy: InvalidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn policy(&self) -> &InvalidationPolicy {
        &self.policy
    }

    /// Cached collection for `key`. Its filters become query parameters.
    pub async fn list(&self, key: &CollectionKey) -> QueryResult {
        let domain = key.domain();
        let backend = self.backend.clone();
        let path = domain.path().to_string();
        let query = key.query_pairs();
        let options = self
            .options
            .clone()
            .shape(Shape::CollectionIn(domain.envelope_field().to_string()));

        self.sync
            .query(
                key,
                move || {
                    let (backend, path, query) = (backend.clone(), path.clone(), query.clone());
                    async move { backend.get(&path, &query).await }
                },
                &options,
            )
            .await
    }

    /// Cached single record. A blank id disables the query.
    pub async fn get(&self, domain: Domain, id: &str) -> QueryResult {
        let key = CollectionKey::detail(domain, id);
        let backend = self.backend.clone();
        let path = resource_path(&[domain.path(), id]);
        let options = self
            .options
            .clone()
            .shape(Shape::Record)
            .enabled(!id.trim().is_empty());

        self.sync
            .query(
                &key,
                move || {
                    let (backend, path) = (backend.clone(), path.clone());
                    async move { backend.get(&path, &[]).await }
                },
                &options,
            )
            .await
    }

    /// `POST /{resource}`. Returns the raw response body.
    pub async fn create(&self, domain: Domain, body: &Value) -> SyncResult<Value> {
        debug!(%domain, "create");
        let request = MutationRequest::on_domain(&format!("{domain}.create"), domain, &self.policy);
        self.sync
            .mutate(request, self.backend.post(domain.path(), body))
            .await
    }

    /// `PATCH /{resource}/{id}`.
    pub async fn update(&self, domain: Domain, id: &str, body: &Value) -> SyncResult<Value> {
        debug!(%domain, %id, "update");
        let path = resource_path(&[domain.path(), id]);
        let request = MutationRequest::on_domain(&format!("{domain}.update"), domain, &self.policy);
        self.sync.mutate(request, self.backend.patch(&path, body)).await
    }

    /// `DELETE /{resource}/{id}`.
    pub async fn delete(&self, domain: Domain, id: &str) -> SyncResult<Value> {
        debug!(%domain, %id, "delete");
        let path = resource_path(&[domain.path(), id]);
        let request = MutationRequest::on_domain(&format!("{domain}.delete"), domain, &self.policy);
        self.sync.mutate(request, self.backend.delete(&path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use campus_client::ApiError;
    use campus_client::mock::MockBackend;
    use http::Method;
    use serde_json::json;

    use crate::QueryStatus;
    use crate::invalidation::InvalidationReport;

    fn service(mock: MockBackend) -> (Arc<MockBackend>, ResourceService<MockBackend>) {
        let backend = Arc::new(mock);
        let sync = SyncCoordinator::new(QueryOptions::default(), Duration::from_secs(3600));
        (backend.clone(), ResourceService::new(backend, sync))
    }

    async fn next_report(
        reports: &mut tokio::sync::broadcast::Receiver<InvalidationReport>,
    ) -> InvalidationReport {
        tokio::time::timeout(Duration::from_secs(5), reports.recv())
            .await
            .expect("report within timeout")
            .unwrap()
    }

    #[tokio::test]
    async fn repeated_lists_within_stale_time_fetch_once() {
        let mock = MockBackend::new();
        mock.respond(
            Method::GET,
            "matricula",
            Ok(json!({"matriculas": [{"id": 1}, {"id": 2}]})),
        );
        let (backend, svc) = service(mock);
        let key = CollectionKey::list(Domain::Enrollments).filter("grado", "3A");

        let first = svc.list(&key).await;
        let second = svc.list(&key).await;

        assert_eq!(first.items().len(), 2);
        assert_eq!(first, second);
        assert_eq!(backend.call_count(&Method::GET, "matricula"), 1);
        assert_eq!(
            backend.calls()[0].query,
            vec![("grado".to_string(), "3A".to_string())]
        );
    }

    #[tokio::test]
    async fn record_ids_stay_within_their_path_segment() {
        let mock = MockBackend::new();
        mock.respond(Method::GET, "aulas/3%2FB%20norte", Ok(json!({"data": {"id": "3/B norte"}})));
        mock.respond(Method::DELETE, "aulas/3%2FB%20norte", Ok(json!({"ok": true})));
        let (backend, svc) = service(mock);

        let record = svc.get(Domain::Classrooms, "3/B norte").await;
        svc.delete(Domain::Classrooms, "3/B norte").await.unwrap();

        assert_eq!(record.data, Some(json!({"id": "3/B norte"})));
        assert_eq!(backend.call_count(&Method::GET, "aulas/3%2FB%20norte"), 1);
        assert_eq!(backend.call_count(&Method::DELETE, "aulas/3%2FB%20norte"), 1);
    }

    #[tokio::test]
    async fn blank_detail_id_never_calls_backend() {
        let (backend, svc) = service(MockBackend::new());
        let result = svc.get(Domain::Workers, "  ").await;
        assert_eq!(result.status, QueryStatus::Idle);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn detail_unwraps_record() {
        let mock = MockBackend::new();
        mock.respond(
            Method::GET,
            "aulas/C-101",
            Ok(json!({"info": {"data": {"id": "C-101", "capacidad": 30}}})),
        );
        let (_, svc) = service(mock);
        let result = svc.get(Domain::Classrooms, "C-101").await;
        assert_eq!(result.data, Some(json!({"id": "C-101", "capacidad": 30})));
    }

    #[tokio::test]
    async fn create_invalidates_domain_and_cascade() {
        let mock = MockBackend::new();
        mock.respond(Method::GET, "matricula", Ok(json!([])));
        mock.respond(Method::GET, "aulas", Ok(json!({"aulas": [{"id": "C-101"}]})));
        mock.respond(Method::POST, "matricula", Ok(json!({"id": 7})));
        let (backend, svc) = service(mock);

        let enrollments = CollectionKey::list(Domain::Enrollments);
        let classrooms = CollectionKey::list(Domain::Classrooms);
        let workers = CollectionKey::list(Domain::Workers);
        svc.list(&enrollments).await;
        let _watching = svc.sync().subscribe(&classrooms);
        svc.list(&classrooms).await;
        svc.sync().set_data(&workers, json!([]));
        let mut reports = svc.sync().reports();

        let created = svc
            .create(Domain::Enrollments, &json!({"nombre": "Ana"}))
            .await
            .unwrap();
        assert_eq!(created, json!({"id": 7}));

        let report = next_report(&mut reports).await;
        assert_eq!(report.cause, "enrollments.create");
        assert_eq!(report.invalidated.len(), 2);
        assert!(report.invalidated.contains(&enrollments));
        assert!(report.invalidated.contains(&classrooms));
        assert!(!report.invalidated.contains(&workers));
        assert_eq!(report.refetched, vec![classrooms.clone()]);

        tokio::time::timeout(Duration::from_secs(5), async {
            while backend.call_count(&Method::GET, "aulas") < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscribed classrooms list refetched");
    }

    #[tokio::test]
    async fn failed_update_returns_error_without_invalidation() {
        let mock = MockBackend::new();
        mock.respond(
            Method::PATCH,
            "trabajadores/4",
            Err(ApiError::Validation {
                status: 422,
                message: Some("DNI duplicado".into()),
            }),
        );
        let (_, svc) = service(mock);
        let mut reports = svc.sync().reports();

        let err = svc
            .update(Domain::Workers, "4", &json!({"dni": "123"}))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "DNI duplicado");
        assert!(
            tokio::time::timeout(Duration::from_millis(50), reports.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn delete_hits_record_path() {
        let mock = MockBackend::new();
        mock.respond(Method::DELETE, "tareas/12", Ok(json!({"success": true})));
        let (backend, svc) = service(mock);
        svc.delete(Domain::Tasks, "12").await.unwrap();
        assert_eq!(backend.call_count(&Method::DELETE, "tareas/12"), 1);
    }
}
