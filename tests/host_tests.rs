//! Request dispatch through a configured host

mod provider_harness;
use provider_harness::*;

use axum::http::{Method, StatusCode};
use restful::config::RestfulConfig;
use restful::core::error::{RestfulError, RestfulResult};
use restful::core::field::FieldDefinition;
use restful::core::provider::{DataProvider, ProviderMiddleware};
use restful::server::{ResourceHost, ResourceOutput};
use restful::storage::InMemorySqlExecutor;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const CONFIG: &str = r#"
default_range: 2
max_range: 3
resources:
  - name: pages
    major: 1
    minor: 0
    id_field: id
    data_provider: { kind: db_query, table: node_field_data, id_columns: [nid] }
    fields:
      - { name: id, property: nid }
      - { name: label, property: title, process: [trim] }
      - { name: status, property: status }
  - name: pages
    major: 1
    minor: 1
    id_field: id
    data_provider: { kind: db_query, table: node_field_data, id_columns: [nid] }
    fields:
      - { name: id, property: nid }
      - { name: title, property: title }
  - name: notes
    methods: [GET]
    id_field: id
    data_provider: { kind: db_query, table: notes, id_columns: [id] }
    fields:
      - { name: id, property: id }
"#;

fn host() -> ResourceHost {
    let executor = InMemorySqlExecutor::new()
        .with_table("node_field_data", Some("nid"))
        .with_table("notes", Some("id"));
    ResourceHost::builder()
        .with_config(RestfulConfig::from_yaml_str(CONFIG).unwrap())
        .with_sql_executor(Arc::new(executor))
        .with_fields(
            "pages",
            1,
            0,
            vec![FieldDefinition::new("shout").callback(|record| {
                Ok(json!(
                    record
                        .get("title")
                        .and_then(Value::as_str)
                        .map(str::to_uppercase)
                ))
            })],
        )
        .build()
        .unwrap()
}

async fn call(
    host: &ResourceHost,
    version: Option<(u32, u32)>,
    method: Method,
    path: &str,
    input: Value,
) -> RestfulResult<ResourceOutput> {
    let name = path.split('/').next().unwrap_or(path).to_string();
    let request = host.request(method, path).with_input(input);
    host.process(&name, version, &request).await
}

async fn seeded() -> ResourceHost {
    let host = host();
    for label in ["  one ", "two", "three", "four"] {
        call(&host, Some((1, 0)), Method::POST, "pages", json!({ "label": label }))
            .await
            .unwrap();
    }
    host
}

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_list_carries_pagination_meta() {
    let host = seeded().await;
    let output = call(&host, Some((1, 0)), Method::GET, "pages", json!({})).await.unwrap();

    assert_eq!(output.status, StatusCode::OK);
    assert_eq!(ids(&output.items), vec!["1", "2"]);
    let meta = output.meta.unwrap();
    assert_eq!((meta.page, meta.range, meta.total), (1, 2, 4));
    assert_eq!(meta.total_pages, 2);
    assert!(meta.has_next);
    assert!(!meta.has_prev);
}

#[tokio::test]
async fn test_range_is_capped() {
    let host = seeded().await;
    let output = call(&host, Some((1, 0)), Method::GET, "pages", json!({ "range": 10 }))
        .await
        .unwrap();

    assert_eq!(output.items.len(), 3);
    assert_eq!(output.meta.unwrap().range, 3);
}

#[tokio::test]
async fn test_view_one_and_many() {
    let host = seeded().await;

    let one = call(&host, Some((1, 0)), Method::GET, "pages/1", json!({})).await.unwrap();
    assert!(one.meta.is_none());
    assert_eq!(one.items[0].get("label"), Some(&json!("one")));
    assert_eq!(one.items[0].get("shout"), Some(&json!("  ONE ")));

    let many = call(&host, Some((1, 0)), Method::GET, "pages/3,1", json!({}))
        .await
        .unwrap();
    assert_eq!(ids(&many.items), vec!["3", "1"]);
}

#[tokio::test]
async fn test_create_answers_created() {
    let host = host();
    let output = call(&host, Some((1, 0)), Method::POST, "pages", json!({ "label": "new" }))
        .await
        .unwrap();

    assert_eq!(output.status, StatusCode::CREATED);
    assert_eq!(output.items[0].id, "1");
}

#[tokio::test]
async fn test_put_and_patch_update() {
    let host = seeded().await;

    let patched = call(&host, Some((1, 0)), Method::PATCH, "pages/2", json!({ "status": 1 }))
        .await
        .unwrap();
    assert_eq!(patched.items[0].get("label"), Some(&json!("two")));

    let replaced = call(&host, Some((1, 0)), Method::PUT, "pages/2", json!({ "label": "2" }))
        .await
        .unwrap();
    assert_eq!(replaced.items[0].get("status"), Some(&json!(null)));
}

#[tokio::test]
async fn test_delete_many_answers_no_content() {
    let host = seeded().await;
    let output = call(&host, Some((1, 0)), Method::DELETE, "pages/1,2", json!({}))
        .await
        .unwrap();

    assert_eq!(output.status, StatusCode::NO_CONTENT);
    assert!(output.items.is_empty());
    let rest = call(&host, Some((1, 0)), Method::GET, "pages", json!({})).await.unwrap();
    assert_eq!(rest.meta.unwrap().total, 2);
}

#[tokio::test]
async fn test_write_without_id_is_bad_request() {
    let host = seeded().await;
    let err = call(&host, Some((1, 0)), Method::PATCH, "pages", json!({ "label": "x" }))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unsupported_methods_are_not_implemented() {
    let host = seeded().await;

    let err = call(&host, Some((1, 0)), Method::POST, "pages/1", json!({ "label": "x" }))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_IMPLEMENTED);

    let err = call(&host, Some((1, 0)), Method::OPTIONS, "pages", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_IMPLEMENTED);

    let err = call(&host, None, Method::DELETE, "notes/1", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_IMPLEMENTED");
}

// ---------------------------------------------------------------------------
// Versions & registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_version_resolution() {
    let host = seeded().await;

    let latest = call(&host, None, Method::GET, "pages/1", json!({})).await.unwrap();
    assert_eq!(latest.items[0].get("title"), Some(&json!("  one ")));
    assert!(latest.items[0].get("label").is_none());

    let pinned = host.resource("pages", Some(1), Some(0)).unwrap();
    assert_eq!(pinned.identity().version(), "v1.0");
    let major_only = host.resource("pages", Some(1), None).unwrap();
    assert_eq!(major_only.identity().minor, 1);

    let err = call(&host, Some((2, 0)), Method::GET, "pages", json!({})).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(err.error_code(), "UNKNOWN_RESOURCE");
}

#[test]
fn test_resource_names_are_sorted() {
    assert_eq!(host().resource_names(), vec!["notes", "pages"]);
}

#[tokio::test]
async fn test_hand_built_provider_is_served() {
    let (provider, _registry) = plugin_articles();
    let host = ResourceHost::builder()
        .with_provider(provider, vec![Method::GET, Method::POST])
        .build()
        .unwrap();

    let created = host
        .process(
            "articles",
            None,
            &host
                .request(Method::POST, "articles")
                .with_input(json!({ "id": 1, "label": "Plug" })),
        )
        .await
        .unwrap();
    assert_eq!(created.status, StatusCode::CREATED);

    let err = host
        .process("articles", None, &host.request(Method::DELETE, "articles/1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RestfulError::Resource(_)));
}

struct CountWraps(AtomicUsize);

impl ProviderMiddleware for CountWraps {
    fn name(&self) -> &str {
        "count_wraps"
    }

    fn wrap(&self, provider: Arc<dyn DataProvider>) -> RestfulResult<Arc<dyn DataProvider>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(provider)
    }
}

#[test]
fn test_middleware_wraps_every_resource() {
    let middleware = Arc::new(CountWraps(AtomicUsize::new(0)));
    let (provider, _registry) = plugin_articles();
    ResourceHost::builder()
        .with_config(RestfulConfig::from_yaml_str(CONFIG).unwrap())
        .with_sql_executor(Arc::new(InMemorySqlExecutor::new()))
        .with_provider(provider, Vec::new())
        .with_middleware(middleware.clone())
        .build()
        .unwrap();

    assert_eq!(middleware.0.load(Ordering::SeqCst), 4);
}
