//! Shared test harness for data provider testing
//!
//! Provides an `articles` resource on each in-memory backend, request and
//! payload helpers, and `CountingProvider`, a decorator that records which
//! ids reach the provider it wraps.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod provider_harness;
//! use provider_harness::*;
//! ```

#![allow(dead_code)]

pub mod data_provider_tests;

use async_trait::async_trait;
use axum::http::Method;
use restful::core::collection::ResourceFieldCollection;
use restful::core::error::RestfulResult;
use restful::core::field::FieldDefinition;
use restful::core::provider::{DataProvider, ProviderCore, RenderedItem, ResourceIdentity};
use restful::core::request::ResourceRequest;
use restful::core::store::BackendKind;
use restful::config::ProviderOptions;
use restful::storage::{
    DbQueryDataProvider, EntityDataProvider, InMemoryObjectStore, InMemoryPluginRegistry,
    InMemorySqlExecutor, PluginDataProvider,
};
use serde_json::{Map, Value, json};
use std::sync::{Arc, Mutex};

/// Route library logs to the test output; `RUST_LOG=restful=debug` shows them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Articles on every backend
// ---------------------------------------------------------------------------

pub fn articles_identity() -> ResourceIdentity {
    ResourceIdentity::new("articles", 1, 0)
}

/// `id`, `label`, `status` and a computed `summary`, over backend properties
pub fn article_definitions(id_property: &str) -> Vec<FieldDefinition> {
    vec![
        FieldDefinition::new("id").property(id_property),
        FieldDefinition::new("label").property("title"),
        FieldDefinition::new("status").property("status"),
        FieldDefinition::new("summary").callback(|record| {
            Ok(json!(
                record
                    .get("title")
                    .and_then(Value::as_str)
                    .map(|title| title.chars().take(3).collect::<String>())
            ))
        }),
    ]
}

fn core(id_property: &str, backend: BackendKind) -> ProviderCore {
    let fields =
        ResourceFieldCollection::from_definitions(article_definitions(id_property), backend, Some("id"))
            .expect("article fields");
    ProviderCore::new(articles_identity(), fields).with_range(50, Some(100))
}

pub fn entity_articles() -> (Arc<dyn DataProvider>, Arc<InMemoryObjectStore>) {
    let store = Arc::new(InMemoryObjectStore::new());
    let mut options = ProviderOptions::new(BackendKind::Entity);
    options.entity_type = Some("node".to_string());
    options.bundles = vec!["article".to_string()];
    let provider = EntityDataProvider::new(core("id", BackendKind::Entity), store.clone(), &options)
        .expect("entity provider");
    (Arc::new(provider), store)
}

pub fn table_articles() -> (Arc<dyn DataProvider>, Arc<InMemorySqlExecutor>) {
    let executor = Arc::new(InMemorySqlExecutor::new().with_table("node_field_data", Some("nid")));
    let mut options = ProviderOptions::new(BackendKind::DbQuery);
    options.table = Some("node_field_data".to_string());
    options.id_columns = vec!["nid".to_string()];
    let provider =
        DbQueryDataProvider::new(core("nid", BackendKind::DbQuery), executor.clone(), &options)
            .expect("db_query provider");
    (Arc::new(provider), executor)
}

pub fn plugin_articles() -> (Arc<dyn DataProvider>, Arc<InMemoryPluginRegistry>) {
    let registry = Arc::new(InMemoryPluginRegistry::new());
    let provider = PluginDataProvider::new(core("id", BackendKind::Memory), registry.clone());
    (Arc::new(provider), registry)
}

/// Create articles `(id, label, status)` through the provider
pub async fn seed(provider: &Arc<dyn DataProvider>, rows: &[(u64, &str, i64)]) {
    init_tracing();
    let request = post("articles");
    for (id, label, status) in rows {
        provider
            .create(
                &payload(json!({ "id": id, "label": label, "status": status })),
                &request,
            )
            .await
            .expect("seed article");
    }
}

// ---------------------------------------------------------------------------
// Requests & payloads
// ---------------------------------------------------------------------------

pub fn get(path: &str) -> ResourceRequest {
    ResourceRequest::new(Method::GET, path)
}

pub fn get_with(path: &str, input: Value) -> ResourceRequest {
    get(path).with_input(input)
}

pub fn post(path: &str) -> ResourceRequest {
    ResourceRequest::new(Method::POST, path)
}

pub fn put(path: &str) -> ResourceRequest {
    ResourceRequest::new(Method::PUT, path)
}

pub fn patch(path: &str) -> ResourceRequest {
    ResourceRequest::new(Method::PATCH, path)
}

pub fn delete(path: &str) -> ResourceRequest {
    ResourceRequest::new(Method::DELETE, path)
}

pub fn payload(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("payload must be an object")
}

pub fn ids(items: &[RenderedItem]) -> Vec<&str> {
    items.iter().map(|item| item.id.as_str()).collect()
}

pub fn labels(items: &[RenderedItem]) -> Vec<Value> {
    items
        .iter()
        .map(|item| item.get("label").cloned().unwrap_or(Value::Null))
        .collect()
}

// ---------------------------------------------------------------------------
// CountingProvider
// ---------------------------------------------------------------------------

/// Records every id the wrapped provider is asked to render
pub struct CountingProvider {
    inner: Arc<dyn DataProvider>,
    rendered: Mutex<Vec<String>>,
}

impl CountingProvider {
    pub fn new(inner: Arc<dyn DataProvider>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            rendered: Mutex::new(Vec::new()),
        })
    }

    /// Ids passed to `view_multiple`, oldest first
    pub fn rendered(&self) -> Vec<String> {
        self.rendered.lock().expect("rendered lock").clone()
    }

    pub fn reset(&self) {
        self.rendered.lock().expect("rendered lock").clear();
    }
}

#[async_trait]
impl DataProvider for CountingProvider {
    fn identity(&self) -> &ResourceIdentity {
        self.inner.identity()
    }

    fn fields(&self) -> &ResourceFieldCollection {
        self.inner.fields()
    }

    async fn count(&self, request: &ResourceRequest) -> RestfulResult<usize> {
        self.inner.count(request).await
    }

    async fn view_multiple(
        &self,
        ids: &[String],
        request: &ResourceRequest,
    ) -> RestfulResult<Vec<RenderedItem>> {
        self.rendered
            .lock()
            .expect("rendered lock")
            .extend(ids.iter().cloned());
        self.inner.view_multiple(ids, request).await
    }

    async fn create(
        &self,
        payload: &Map<String, Value>,
        request: &ResourceRequest,
    ) -> RestfulResult<RenderedItem> {
        self.inner.create(payload, request).await
    }

    async fn update(
        &self,
        id: &str,
        payload: &Map<String, Value>,
        replace: bool,
        request: &ResourceRequest,
    ) -> RestfulResult<RenderedItem> {
        self.inner.update(id, payload, replace, request).await
    }

    async fn remove(&self, id: &str, request: &ResourceRequest) -> RestfulResult<()> {
        self.inner.remove(id, request).await
    }

    async fn get_index_ids(&self, request: &ResourceRequest) -> RestfulResult<Vec<String>> {
        self.inner.get_index_ids(request).await
    }

    fn cache_fragments(&self, id: &str) -> Vec<(String, String)> {
        self.inner.cache_fragments(id)
    }
}
