//! Render cache decorator
//!
//! [`CachedDataProvider`] wraps any provider with the same contract. It
//! memoizes rendered items per user (or role) and per item. Lists go through
//! `get_index_ids` and then the cached `view_multiple`, so the cache never
//! stores list pages. Renders for write methods pass straight through.
//!
//! Entries carry tags built from the provider's lookup fragments. Updates
//! and removals clear every entry tagged with the item, for every user,
//! before they return. Entries that embed an item are tagged with it too.

pub mod key;
pub mod memory;

pub use key::CacheGranularity;
pub use memory::InMemoryRenderCache;

use crate::core::collection::ResourceFieldCollection;
use crate::core::error::{RestfulResult, StorageError};
use crate::core::provider::{
    DataProvider, ProviderMiddleware, RenderedItem, ResourceIdentity, order_by_ids,
};
use crate::core::request::ResourceRequest;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

const BACKEND: &str = "render_cache";

/// Storage for rendered items
#[async_trait]
pub trait RenderCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<RenderedItem>>;

    /// Store an item with the tags that can later clear it
    async fn set(&self, key: &str, item: RenderedItem, tags: Vec<String>) -> Result<()>;

    /// Clear one key, or every key under the part of `cid` before a `*`
    async fn invalidate(&self, cid: &str) -> Result<usize>;

    /// Clear every entry carrying any of the tags
    async fn clear_tags(&self, tags: &[String]) -> Result<usize>;
}

/// Caching wrapper around a provider
pub struct CachedDataProvider {
    inner: Arc<dyn DataProvider>,
    cache: Arc<dyn RenderCache>,
    granularity: CacheGranularity,
}

impl CachedDataProvider {
    pub fn new(
        inner: Arc<dyn DataProvider>,
        cache: Arc<dyn RenderCache>,
        granularity: CacheGranularity,
    ) -> Self {
        Self {
            inner,
            cache,
            granularity,
        }
    }

    pub fn granularity(&self) -> CacheGranularity {
        self.granularity
    }

    /// Key of one item as rendered for this request
    pub fn cache_key(&self, id: &str, request: &ResourceRequest) -> String {
        let params = request.is_read_method().then(|| request.input());
        let mut key = key::build_key(
            self.inner.identity(),
            self.granularity,
            request.account(),
            &self.inner.cache_fragments(id),
            params,
        );
        key.push_str(&key::embed_chain_suffix(request.embed_chain()));
        key
    }

    fn tags_for(&self, item: &RenderedItem) -> Vec<String> {
        let mut tags = vec![key::fragment_tag(
            self.inner.identity(),
            &self.inner.cache_fragments(&item.id),
        )];
        for descriptor in item.embedded.iter().flat_map(|d| d.flatten()) {
            let tag = key::reference_tag(&descriptor.resource_name, &descriptor.id);
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }

    /// Clear an exact key, or every key under the part of `cid` before a `*`
    pub async fn cache_invalidate(&self, cid: &str) -> RestfulResult<usize> {
        let cleared = self
            .cache
            .invalidate(cid)
            .await
            .map_err(|e| StorageError::write(BACKEND, e))?;
        debug!(cid, cleared, "Render cache invalidated");
        Ok(cleared)
    }

    /// Clear every entry of this resource version, for every user
    pub async fn clear_resource_rendered_cache(&self) -> RestfulResult<usize> {
        self.cache_invalidate(&key::resource_prefix(self.inner.identity()))
            .await
    }

    /// Clear every entry of one item, and entries embedding it, for every user
    pub async fn clear_rendered_cache(&self, id: &str) -> RestfulResult<usize> {
        let identity = self.inner.identity();
        let tags = vec![
            key::fragment_tag(identity, &self.inner.cache_fragments(id)),
            key::reference_tag(&identity.name, id),
        ];
        let cleared = self
            .cache
            .clear_tags(&tags)
            .await
            .map_err(|e| StorageError::write(BACKEND, e))?;
        debug!(resource = %identity, id, cleared, "Render cache cleared for item");
        Ok(cleared)
    }
}

#[async_trait]
impl DataProvider for CachedDataProvider {
    fn identity(&self) -> &ResourceIdentity {
        self.inner.identity()
    }

    fn fields(&self) -> &ResourceFieldCollection {
        self.inner.fields()
    }

    async fn index(&self, request: &ResourceRequest) -> RestfulResult<Vec<RenderedItem>> {
        let ids = self.inner.get_index_ids(request).await?;
        self.view_multiple(&ids, request).await
    }

    async fn count(&self, request: &ResourceRequest) -> RestfulResult<usize> {
        self.inner.count(request).await
    }

    async fn view_multiple(
        &self,
        ids: &[String],
        request: &ResourceRequest,
    ) -> RestfulResult<Vec<RenderedItem>> {
        // Renders answering a write are never stored
        if !request.is_read_method() {
            return self.inner.view_multiple(ids, request).await;
        }

        let mut found = Vec::with_capacity(ids.len());
        let mut misses = Vec::new();

        for id in ids {
            let key = self.cache_key(id, request);
            match self.cache.get(&key).await {
                Ok(Some(item)) => {
                    debug!(key = %key, "Render cache hit");
                    found.push(item);
                }
                Ok(None) => {
                    debug!(key = %key, "Render cache miss");
                    misses.push(id.clone());
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Render cache read failed");
                    misses.push(id.clone());
                }
            }
        }

        if !misses.is_empty() {
            for item in self.inner.view_multiple(&misses, request).await? {
                let key = self.cache_key(&item.id, request);
                let tags = self.tags_for(&item);
                if let Err(e) = self.cache.set(&key, item.clone(), tags).await {
                    warn!(key = %key, error = %e, "Render cache write failed");
                }
                found.push(item);
            }
        }

        Ok(order_by_ids(found, ids))
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
        let result = self.inner.update(id, payload, replace, request).await;
        self.clear_rendered_cache(id).await?;
        result
    }

    async fn remove(&self, id: &str, request: &ResourceRequest) -> RestfulResult<()> {
        let result = self.inner.remove(id, request).await;
        self.clear_rendered_cache(id).await?;
        result
    }

    async fn get_index_ids(&self, request: &ResourceRequest) -> RestfulResult<Vec<String>> {
        self.inner.get_index_ids(request).await
    }

    fn cache_fragments(&self, id: &str) -> Vec<(String, String)> {
        self.inner.cache_fragments(id)
    }
}

/// Middleware that puts a [`CachedDataProvider`] around providers
pub struct RenderCacheMiddleware {
    cache: Arc<dyn RenderCache>,
    granularity: CacheGranularity,
}

impl RenderCacheMiddleware {
    /// Fails when the granularity is not `per_user` or `per_role`
    pub fn new(cache: Arc<dyn RenderCache>, granularity: &str) -> RestfulResult<Self> {
        Ok(Self {
            cache,
            granularity: CacheGranularity::parse(granularity)?,
        })
    }
}

impl ProviderMiddleware for RenderCacheMiddleware {
    fn name(&self) -> &str {
        "render_cache"
    }

    fn wrap(&self, provider: Arc<dyn DataProvider>) -> RestfulResult<Arc<dyn DataProvider>> {
        Ok(Arc::new(CachedDataProvider::new(
            provider,
            self.cache.clone(),
            self.granularity,
        )))
    }
}
