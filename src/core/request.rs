//! Request contract consumed by resources and data providers
//!
//! A [`ResourceRequest`] is what the (external) transport hands to a resource:
//! the HTTP method, the path, the parsed query/body input, headers and the
//! resolved account. Embedding adds two things on top: the registry used to
//! find target resources, and the chain of `(resource, id)` pairs already
//! being rendered above this request.

use crate::core::account::Account;
use crate::core::error::{RequestError, RestfulResult};
use crate::core::query::{
    FilterItem, LIST_PARAMS, Pagination, SortSpec, parse_field_list, parse_filters, parse_sort,
};
use crate::embed::ResourceRegistry;
use axum::http::{HeaderMap, Method, StatusCode};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Default bound on nested sub-requests
pub const DEFAULT_MAX_EMBED_DEPTH: usize = 5;

/// A request against one resource
#[derive(Debug)]
pub struct ResourceRequest {
    /// Shared by every sub-request of one incoming request
    id: Uuid,
    method: Method,
    path: String,
    input: Map<String, Value>,
    headers: HeaderMap,
    account: Account,
    registry: Option<Arc<ResourceRegistry>>,
    embed_chain: Vec<(String, String)>,
    max_embed_depth: usize,
    status: Mutex<Option<StatusCode>>,
}

impl ResourceRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            input: Map::new(),
            headers: HeaderMap::new(),
            account: Account::anonymous(),
            registry: None,
            embed_chain: Vec::new(),
            max_embed_depth: DEFAULT_MAX_EMBED_DEPTH,
            status: Mutex::new(None),
        }
    }

    /// Set the parsed input; anything other than an object is ignored
    pub fn with_input(mut self, input: Value) -> Self {
        if let Value::Object(map) = input {
            self.input = map;
        }
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_account(mut self, account: Account) -> Self {
        self.account = account;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ResourceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_max_embed_depth(mut self, depth: usize) -> Self {
        self.max_embed_depth = depth;
        self
    }

    /// Correlation id for logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn input(&self) -> &Map<String, Value> {
        &self.input
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn registry(&self) -> Option<&Arc<ResourceRegistry>> {
        self.registry.as_ref()
    }

    /// Number of sub-requests above this one
    pub fn depth(&self) -> usize {
        self.embed_chain.len()
    }

    pub fn max_embed_depth(&self) -> usize {
        self.max_embed_depth
    }

    /// `(resource, id)` pairs being rendered above this request
    pub fn embed_chain(&self) -> &[(String, String)] {
        &self.embed_chain
    }

    pub fn has_visited(&self, resource: &str, id: &str) -> bool {
        self.embed_chain
            .iter()
            .any(|(r, i)| r == resource && i == id)
    }

    pub fn is_read_method(&self) -> bool {
        matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    pub fn filters(&self) -> RestfulResult<Vec<FilterItem>> {
        parse_filters(self.input.get("filter"))
    }

    /// Requested sort, `None` when the request has none
    pub fn sort(&self) -> RestfulResult<Option<SortSpec>> {
        match self.input.get("sort") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
            Some(Value::String(raw)) => parse_sort(raw).map(Some),
            Some(other) => Err(RequestError::InvalidSort {
                message: format!("sort must be a comma-separated string, got {}", other),
            }
            .into()),
        }
    }

    pub fn pagination(
        &self,
        default_range: usize,
        max_range: Option<usize>,
    ) -> RestfulResult<Pagination> {
        Pagination::from_input(&self.input, default_range, max_range)
    }

    /// Union of `fields` and `include`, `None` when neither is present
    pub fn field_selection(&self) -> Option<Vec<String>> {
        let fields = self.input.get("fields");
        let include = self.input.get("include");
        if fields.is_none() && include.is_none() {
            return None;
        }

        let mut selection = fields.map(parse_field_list).unwrap_or_default();
        for name in include.map(parse_field_list).unwrap_or_default() {
            if !selection.contains(&name) {
                selection.push(name);
            }
        }
        Some(selection)
    }

    /// Side-channel status (e.g. 204 after a delete)
    pub fn status(&self) -> Option<StatusCode> {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_status(&self, status: StatusCode) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
    }

    /// Build the request used to render an embedded resource
    ///
    /// Same scoping as [`nested_request`](Self::nested_request), and
    /// `(parent_resource, parent_id)` joins the embed chain.
    pub fn sub_request(
        &self,
        field_name: &str,
        parent_resource: &str,
        parent_id: &str,
        method: Option<Method>,
    ) -> ResourceRequest {
        let mut sub = self.nested_request(field_name, method);
        sub.embed_chain
            .push((parent_resource.to_string(), parent_id.to_string()));
        sub
    }

    /// Build a request scoped to one field of this request
    ///
    /// - list parameters (`filter`, `sort`, `page`, `range`) are dropped
    /// - `fields`/`include` keep only entries under `field_name.`, unprefixed
    /// - headers start empty; account, registry and embed chain carry over
    pub fn nested_request(&self, field_name: &str, method: Option<Method>) -> ResourceRequest {
        let prefix = format!("{}.", field_name);
        let mut input = Map::new();

        for (key, value) in &self.input {
            match key.as_str() {
                k if LIST_PARAMS.contains(&k) => {}
                "fields" | "include" => {
                    let scoped: Vec<String> = parse_field_list(value)
                        .iter()
                        .filter_map(|name| name.strip_prefix(&prefix).map(str::to_string))
                        .collect();
                    if !scoped.is_empty() {
                        input.insert(key.clone(), Value::String(scoped.join(",")));
                    }
                }
                _ => {
                    input.insert(key.clone(), value.clone());
                }
            }
        }

        ResourceRequest {
            id: self.id,
            method: method.unwrap_or_else(|| self.method.clone()),
            path: self.path.clone(),
            input,
            headers: HeaderMap::new(),
            account: self.account.clone(),
            registry: self.registry.clone(),
            embed_chain: self.embed_chain.clone(),
            max_embed_depth: self.max_embed_depth,
            status: Mutex::new(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_field_selection_union() {
        let request = ResourceRequest::new(Method::GET, "articles")
            .with_input(json!({ "fields": "id,label", "include": "author,label" }));
        assert_eq!(
            request.field_selection(),
            Some(vec!["id".to_string(), "label".to_string(), "author".to_string()])
        );

        let plain = ResourceRequest::new(Method::GET, "articles");
        assert_eq!(plain.field_selection(), None);
    }

    #[test]
    fn test_sort_input() {
        let request = ResourceRequest::new(Method::GET, "articles").with_input(json!({ "sort": "-id" }));
        assert!(request.sort().unwrap().is_some());

        let empty = ResourceRequest::new(Method::GET, "articles").with_input(json!({ "sort": "" }));
        assert!(empty.sort().unwrap().is_none());

        let bad = ResourceRequest::new(Method::GET, "articles").with_input(json!({ "sort": 3 }));
        assert!(bad.sort().unwrap_err().is_bad_request());
    }

    #[test]
    fn test_sub_request_scoping() {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace", HeaderValue::from_static("abc"));

        let parent = ResourceRequest::new(Method::GET, "articles/1")
            .with_input(json!({
                "filter": { "status": 1 },
                "sort": "-id",
                "page": 2,
                "range": 5,
                "fields": "id,author.name,author.mail,label",
                "lang": "fr"
            }))
            .with_headers(headers)
            .with_account(Account::authenticated("7", vec![]));

        let sub = parent.sub_request("author", "articles", "1", None);

        assert_eq!(sub.method(), &Method::GET);
        assert!(sub.headers().is_empty());
        assert_eq!(sub.account().identity(), "7");
        assert!(sub.input().get("filter").is_none());
        assert!(sub.input().get("sort").is_none());
        assert!(sub.input().get("page").is_none());
        assert!(sub.input().get("range").is_none());
        assert_eq!(sub.input().get("lang"), Some(&json!("fr")));
        assert_eq!(
            sub.field_selection(),
            Some(vec!["name".to_string(), "mail".to_string()])
        );
        assert_eq!(sub.depth(), 1);
        assert_eq!(sub.id(), parent.id());
        assert!(sub.has_visited("articles", "1"));
        assert!(!sub.has_visited("users", "1"));
    }

    #[test]
    fn test_sub_request_method_override() {
        let parent = ResourceRequest::new(Method::POST, "articles");
        let sub = parent.sub_request("author", "articles", "1", Some(Method::GET));
        assert_eq!(sub.method(), &Method::GET);
        assert!(sub.is_read_method());
    }

    #[test]
    fn test_status_side_channel() {
        let request = ResourceRequest::new(Method::DELETE, "articles/1");
        assert_eq!(request.status(), None);
        request.set_status(StatusCode::NO_CONTENT);
        assert_eq!(request.status(), Some(StatusCode::NO_CONTENT));
    }
}
