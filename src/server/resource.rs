//! Method dispatch for one resource version
//!
//! ```text
//! GET    articles          index + count
//! GET    articles/1,2      view (one id) or view_multiple
//! POST   articles          create                   201
//! PUT    articles/1        update, replace
//! PATCH  articles/1        update, partial
//! DELETE articles/1,2      remove each              204
//! ```

use crate::core::error::{RequestError, ResourceError, RestfulError, RestfulResult};
use crate::core::provider::{DEFAULT_RANGE, DataProvider, RenderedItem, ResourceIdentity};
use crate::core::query::PaginationMeta;
use crate::core::request::ResourceRequest;
use axum::http::{Method, StatusCode};
use serde::Serialize;
use std::sync::Arc;

/// Result of a processed request, before formatting
#[derive(Debug, Clone, Serialize)]
pub struct ResourceOutput {
    pub items: Vec<RenderedItem>,
    /// Present for list requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PaginationMeta>,
    #[serde(skip)]
    pub status: StatusCode,
}

impl ResourceOutput {
    fn new(items: Vec<RenderedItem>, status: StatusCode) -> Self {
        Self {
            items,
            meta: None,
            status,
        }
    }
}

/// A registered resource: its provider plus the methods it accepts
#[derive(Clone)]
pub struct Resource {
    provider: Arc<dyn DataProvider>,
    methods: Vec<Method>,
    default_range: usize,
    max_range: Option<usize>,
}

impl Resource {
    /// `methods` empty means every supported method
    pub fn new(provider: Arc<dyn DataProvider>, methods: Vec<Method>) -> Self {
        Self {
            provider,
            methods,
            default_range: DEFAULT_RANGE,
            max_range: None,
        }
    }

    pub fn with_range(mut self, default_range: usize, max_range: Option<usize>) -> Self {
        self.default_range = default_range;
        self.max_range = max_range;
        self
    }

    pub fn identity(&self) -> &ResourceIdentity {
        self.provider.identity()
    }

    pub fn provider(&self) -> &Arc<dyn DataProvider> {
        &self.provider
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    /// Ids addressed by a path: the segment after the resource name, split on commas
    pub fn ids_from_path(&self, path: &str) -> Vec<String> {
        let mut segments = path.split('/').filter(|segment| !segment.is_empty());
        if segments.any(|segment| segment == self.identity().name) {
            segments
                .next()
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    fn not_implemented(&self, operation: &str) -> RestfulError {
        ResourceError::NotImplemented {
            resource: self.identity().name.clone(),
            operation: operation.to_string(),
        }
        .into()
    }

    fn require_ids(ids: Vec<String>) -> RestfulResult<Vec<String>> {
        if ids.is_empty() {
            Err(RequestError::InvalidValue {
                field: "id".to_string(),
                message: "this method needs an identifier in the path".to_string(),
            }
            .into())
        } else {
            Ok(ids)
        }
    }

    /// Run a request against the provider
    pub async fn process(&self, request: &ResourceRequest) -> RestfulResult<ResourceOutput> {
        let method = request.method().clone();
        if !self.allows(&method) {
            return Err(self.not_implemented(method.as_str()));
        }

        let ids = self.ids_from_path(request.path());
        let provider = &self.provider;

        let output = match &method {
            &Method::GET if ids.is_empty() => {
                let pagination = request.pagination(self.default_range, self.max_range)?;
                let items = provider.index(request).await?;
                let total = provider.count(request).await?;
                ResourceOutput {
                    items,
                    meta: Some(PaginationMeta::new(pagination, total)),
                    status: StatusCode::OK,
                }
            }
            &Method::GET => {
                let items = match ids.as_slice() {
                    [id] => vec![provider.view(id, request).await?],
                    _ => provider.view_multiple(&ids, request).await?,
                };
                ResourceOutput::new(items, StatusCode::OK)
            }
            &Method::POST if ids.is_empty() => {
                let item = provider.create(request.input(), request).await?;
                ResourceOutput::new(vec![item], StatusCode::CREATED)
            }
            &Method::PUT | &Method::PATCH => {
                let replace = method == Method::PUT;
                let mut items = Vec::new();
                for id in Self::require_ids(ids)? {
                    items.push(provider.update(&id, request.input(), replace, request).await?);
                }
                ResourceOutput::new(items, StatusCode::OK)
            }
            &Method::DELETE => {
                for id in Self::require_ids(ids)? {
                    provider.remove(&id, request).await?;
                }
                let status = request.status().unwrap_or(StatusCode::NO_CONTENT);
                ResourceOutput::new(Vec::new(), status)
            }
            other => return Err(self.not_implemented(other.as_str())),
        };

        tracing::debug!(
            request_id = %request.id(),
            resource = %self.identity(),
            method = %method,
            items = output.items.len(),
            "Request processed"
        );
        Ok(output)
    }
}
