//! Contract tests every `DataProvider` must pass
//!
//! Invoked once per backend with a factory returning the provider under test:
//! ```rust,ignore
//! data_provider_tests!(entity, entity_articles().0);
//! ```

#[macro_export]
macro_rules! data_provider_tests {
    ($name:ident, $factory:expr) => {
        mod $name {
            use super::*;
            use axum::http::StatusCode;
            use restful::core::error::{RequestError, RestfulError};
            use restful::core::provider::DataProvider;
            use serde_json::json;
            use std::sync::Arc;

            fn provider() -> Arc<dyn DataProvider> {
                $factory
            }

            async fn seeded() -> Arc<dyn DataProvider> {
                let provider = provider();
                seed(
                    &provider,
                    &[(3, "Cherry", 1), (1, "Apple", 0), (2, "Banana", 1)],
                )
                .await;
                provider
            }

            // === Read ===

            #[tokio::test]
            async fn test_create_then_view() {
                let provider = provider();
                let created = provider
                    .create(
                        &payload(json!({ "id": 7, "label": "Hello", "status": 1 })),
                        &post("articles"),
                    )
                    .await
                    .unwrap();
                assert_eq!(created.id, "7");

                let item = provider.view("7", &get("articles/7")).await.unwrap();
                assert_eq!(item.get("label"), Some(&json!("Hello")));
                assert_eq!(item.get("status"), Some(&json!(1)));
                assert_eq!(item.get("summary"), Some(&json!("Hel")));
            }

            #[tokio::test]
            async fn test_view_missing_is_not_found() {
                let provider = seeded().await;
                let err = provider.view("99", &get("articles/99")).await.unwrap_err();
                assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
            }

            #[tokio::test]
            async fn test_view_multiple_keeps_order_and_omits_unknown() {
                let provider = seeded().await;
                let wanted = ["2".to_string(), "99".to_string(), "1".to_string()];
                let items = provider
                    .view_multiple(&wanted, &get("articles/2,99,1"))
                    .await
                    .unwrap();
                assert_eq!(ids(&items), vec!["2", "1"]);
            }

            #[tokio::test]
            async fn test_field_selection() {
                let provider = seeded().await;
                let item = provider
                    .view("1", &get_with("articles/1", json!({ "fields": "label" })))
                    .await
                    .unwrap();
                assert_eq!(item.values.keys().collect::<Vec<_>>(), vec!["label"]);

                let err = provider
                    .view("1", &get_with("articles/1", json!({ "fields": "nope" })))
                    .await
                    .unwrap_err();
                assert!(err.is_bad_request());
            }

            // === Index ===

            #[tokio::test]
            async fn test_index_default_sort_is_id() {
                let provider = seeded().await;
                let items = provider.index(&get("articles")).await.unwrap();
                assert_eq!(ids(&items), vec!["1", "2", "3"]);
            }

            #[tokio::test]
            async fn test_index_sort_by_label() {
                let provider = seeded().await;
                let items = provider
                    .index(&get_with("articles", json!({ "sort": "-label" })))
                    .await
                    .unwrap();
                assert_eq!(
                    labels(&items),
                    vec![json!("Cherry"), json!("Banana"), json!("Apple")]
                );
            }

            #[tokio::test]
            async fn test_index_filter_and_count() {
                let provider = seeded().await;
                let request = get_with("articles", json!({ "filter": { "status": 1 } }));
                let items = provider.index(&request).await.unwrap();
                assert_eq!(ids(&items), vec!["2", "3"]);
                assert_eq!(provider.count(&request).await.unwrap(), 2);

                let request = get_with(
                    "articles",
                    json!({ "filter": { "label": { "value": "B", "operator": "STARTS_WITH" } } }),
                );
                assert_eq!(ids(&provider.index(&request).await.unwrap()), vec!["2"]);

                let request = get_with(
                    "articles",
                    json!({ "filter": { "label": {
                        "value": ["Apple", "Cherry"],
                        "operator": ["=", "="],
                        "conjunction": "OR"
                    } } }),
                );
                assert_eq!(ids(&provider.index(&request).await.unwrap()), vec!["1", "3"]);
            }

            #[tokio::test]
            async fn test_index_rejects_unknown_filter_and_sort() {
                let provider = seeded().await;

                let err = provider
                    .index(&get_with("articles", json!({ "filter": { "body": "x" } })))
                    .await
                    .unwrap_err();
                assert!(matches!(
                    err,
                    RestfulError::Request(RequestError::UnknownFilterField { .. })
                ));

                let err = provider
                    .index(&get_with("articles", json!({ "sort": "body" })))
                    .await
                    .unwrap_err();
                assert!(matches!(
                    err,
                    RestfulError::Request(RequestError::UnknownSortField { .. })
                ));
            }

            #[tokio::test]
            async fn test_index_pages() {
                let provider = seeded().await;
                let request = get_with("articles", json!({ "page": 2, "range": 2 }));
                let items = provider.index(&request).await.unwrap();
                assert_eq!(ids(&items), vec!["3"]);
                assert_eq!(provider.count(&request).await.unwrap(), 3);

                let err = provider
                    .index(&get_with("articles", json!({ "page": 0 })))
                    .await
                    .unwrap_err();
                assert!(matches!(
                    err,
                    RestfulError::Request(RequestError::InvalidPagination { .. })
                ));
            }

            // === Write ===

            #[tokio::test]
            async fn test_patch_keeps_missing_fields() {
                let provider = seeded().await;
                let item = provider
                    .update(
                        "2",
                        &payload(json!({ "label": "Blueberry" })),
                        false,
                        &patch("articles/2"),
                    )
                    .await
                    .unwrap();
                assert_eq!(item.get("label"), Some(&json!("Blueberry")));
                assert_eq!(item.get("status"), Some(&json!(1)));
            }

            #[tokio::test]
            async fn test_put_nulls_missing_fields() {
                let provider = seeded().await;
                let item = provider
                    .update(
                        "2",
                        &payload(json!({ "label": "Blueberry" })),
                        true,
                        &put("articles/2"),
                    )
                    .await
                    .unwrap();
                assert_eq!(item.get("label"), Some(&json!("Blueberry")));
                assert_eq!(item.get("status"), Some(&json!(null)));
            }

            #[tokio::test]
            async fn test_update_missing_is_not_found() {
                let provider = seeded().await;
                let err = provider
                    .update("99", &payload(json!({ "label": "x" })), false, &patch("articles/99"))
                    .await
                    .unwrap_err();
                assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
            }

            #[tokio::test]
            async fn test_illegal_keys_reported_together() {
                let provider = seeded().await;
                let err = provider
                    .update(
                        "1",
                        &payload(json!({ "label": "x", "body": 1, "summary": "y" })),
                        false,
                        &patch("articles/1"),
                    )
                    .await
                    .unwrap_err();
                match err {
                    RestfulError::Request(RequestError::IllegalPayloadKeys { mut keys }) => {
                        keys.sort();
                        assert_eq!(keys, vec!["body", "summary"]);
                    }
                    other => panic!("unexpected error: {other:?}"),
                }

                let item = provider.view("1", &get("articles/1")).await.unwrap();
                assert_eq!(item.get("label"), Some(&json!("Apple")));
            }

            #[tokio::test]
            async fn test_empty_payload_is_rejected() {
                let provider = seeded().await;
                let err = provider
                    .create(&payload(json!({})), &post("articles"))
                    .await
                    .unwrap_err();
                assert!(matches!(err, RestfulError::Request(RequestError::NoValuesSent)));
            }

            #[tokio::test]
            async fn test_remove_signals_no_content() {
                let provider = seeded().await;
                let request = delete("articles/1");
                provider.remove("1", &request).await.unwrap();
                assert_eq!(request.status(), Some(StatusCode::NO_CONTENT));

                let err = provider.view("1", &get("articles/1")).await.unwrap_err();
                assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
                assert_eq!(provider.count(&get("articles")).await.unwrap(), 2);
            }

            #[tokio::test]
            async fn test_remove_missing_is_not_found() {
                let provider = seeded().await;
                let err = provider
                    .remove("99", &delete("articles/99"))
                    .await
                    .unwrap_err();
                assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
            }
        }
    };
}
