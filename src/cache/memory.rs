//! In-memory render cache

use super::RenderCache;
use super::key::WILDCARD;
use crate::core::provider::RenderedItem;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
struct CacheEntry {
    item: RenderedItem,
    tags: Vec<String>,
}

/// Render cache held in a shared ordered map
///
/// Keys are ordered so prefix clears are a range scan.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRenderCache {
    entries: Arc<RwLock<BTreeMap<String, CacheEntry>>>,
}

impl InMemoryRenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RenderCache for InMemoryRenderCache {
    async fn get(&self, key: &str) -> Result<Option<RenderedItem>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        Ok(entries.get(key).map(|entry| entry.item.clone()))
    }

    async fn set(&self, key: &str, item: RenderedItem, tags: Vec<String>) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        entries.insert(key.to_string(), CacheEntry { item, tags });

        Ok(())
    }

    async fn invalidate(&self, cid: &str) -> Result<usize> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let Some((prefix, _)) = cid.split_once(WILDCARD) else {
            return Ok(usize::from(entries.remove(cid).is_some()));
        };

        let doomed: Vec<String> = entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.remove(key);
        }

        Ok(doomed.len())
    }

    async fn clear_tags(&self, tags: &[String]) -> Result<usize> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let before = entries.len();
        entries.retain(|_, entry| !entry.tags.iter().any(|tag| tags.contains(tag)));

        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn item(id: &str) -> RenderedItem {
        RenderedItem {
            id: id.to_string(),
            values: Map::new(),
            embedded: vec![],
            source_type: "node".to_string(),
            source_bundle: None,
        }
    }

    #[tokio::test]
    async fn test_exact_invalidation() {
        let cache = InMemoryRenderCache::new();
        cache.set("v1.0::a::uu1::pa::id:1", item("1"), vec![]).await.unwrap();
        cache.set("v1.0::a::uu1::pa::id:10", item("10"), vec![]).await.unwrap();

        assert_eq!(cache.invalidate("v1.0::a::uu1::pa::id:1").await.unwrap(), 1);
        assert!(cache.get("v1.0::a::uu1::pa::id:1").await.unwrap().is_none());
        assert!(cache.get("v1.0::a::uu1::pa::id:10").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_prefix_invalidation() {
        let cache = InMemoryRenderCache::new();
        cache.set("v1.0::a::uu1::pa::id:1", item("1"), vec![]).await.unwrap();
        cache.set("v1.0::a::uu2::pa::id:1", item("1"), vec![]).await.unwrap();
        cache.set("v1.0::b::uu1::pa::id:1", item("1"), vec![]).await.unwrap();

        assert_eq!(cache.invalidate("v1.0::a::*").await.unwrap(), 2);
        assert_eq!(cache.keys(), vec!["v1.0::b::uu1::pa::id:1".to_string()]);
    }

    #[tokio::test]
    async fn test_wildcard_truncates_the_key() {
        let cache = InMemoryRenderCache::new();
        cache.set("v1.0::a::uu1::pa::id:1", item("1"), vec![]).await.unwrap();
        cache.set("v1.0::a::uu2::pa::id:1", item("1"), vec![]).await.unwrap();
        cache.set("v1.0::b::uu1::pa::id:1", item("1"), vec![]).await.unwrap();

        assert_eq!(cache.invalidate("v1.0::a::uu*::pa::id:1").await.unwrap(), 2);
        assert_eq!(cache.keys(), vec!["v1.0::b::uu1::pa::id:1".to_string()]);
    }

    #[tokio::test]
    async fn test_tag_clear_spans_users() {
        let cache = InMemoryRenderCache::new();
        let tag = vec!["v1.0::a::id:1".to_string()];
        cache.set("v1.0::a::uu1::pa::id:1", item("1"), tag.clone()).await.unwrap();
        cache.set("v1.0::a::uu2::pa::id:1", item("1"), tag.clone()).await.unwrap();
        cache
            .set("v1.0::a::uu1::pa::id:2", item("2"), vec!["v1.0::a::id:2".to_string()])
            .await
            .unwrap();

        assert_eq!(cache.clear_tags(&tag).await.unwrap(), 2);
        assert_eq!(cache.len(), 1);
    }
}
