//! Registry of versioned resources

use crate::core::provider::DataProvider;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Providers by resource name and `(major, minor)` version
///
/// Filled while the host is built, then shared read-only through an `Arc`
/// by every request that may embed.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: HashMap<String, BTreeMap<(u32, u32), Arc<dyn DataProvider>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its identity; a same version replaces
    pub fn register(&mut self, provider: Arc<dyn DataProvider>) {
        let identity = provider.identity().clone();
        self.resources
            .entry(identity.name)
            .or_default()
            .insert((identity.major, identity.minor), provider);
    }

    pub fn get(&self, name: &str, major: u32, minor: u32) -> Option<Arc<dyn DataProvider>> {
        self.resources.get(name)?.get(&(major, minor)).cloned()
    }

    /// Highest registered version of a resource
    pub fn latest(&self, name: &str) -> Option<Arc<dyn DataProvider>> {
        self.resources
            .get(name)?
            .last_key_value()
            .map(|(_, provider)| provider.clone())
    }

    /// Look up a version; missing parts resolve to the latest match
    ///
    /// A major without a minor gives the highest minor of that major.
    pub fn resolve(
        &self,
        name: &str,
        major: Option<u32>,
        minor: Option<u32>,
    ) -> Option<Arc<dyn DataProvider>> {
        match (major, minor) {
            (Some(major), Some(minor)) => self.get(name, major, minor),
            (Some(major), None) => self
                .resources
                .get(name)?
                .range((major, 0)..=(major, u32::MAX))
                .next_back()
                .map(|(_, provider)| provider.clone()),
            _ => self.latest(name),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// Registered resource names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.resources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered versions of a resource, ascending
    pub fn versions(&self, name: &str) -> Vec<(u32, u32)> {
        self.resources
            .get(name)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let versions: BTreeMap<&str, Vec<(u32, u32)>> = self
            .resources
            .iter()
            .map(|(name, versions)| (name.as_str(), versions.keys().copied().collect()))
            .collect();
        f.debug_struct("ResourceRegistry")
            .field("resources", &versions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collection::ResourceFieldCollection;
    use crate::core::error::RestfulResult;
    use crate::core::provider::{RenderedItem, ResourceIdentity};
    use crate::core::request::ResourceRequest;
    use async_trait::async_trait;
    use serde_json::{Map, Value};

    /// Provider with an identity and nothing else
    struct Named {
        identity: ResourceIdentity,
        fields: ResourceFieldCollection,
    }

    fn named(name: &str, major: u32, minor: u32) -> Arc<dyn DataProvider> {
        Arc::new(Named {
            identity: ResourceIdentity::new(name, major, minor),
            fields: ResourceFieldCollection::default(),
        })
    }

    #[async_trait]
    impl DataProvider for Named {
        fn identity(&self) -> &ResourceIdentity {
            &self.identity
        }
        fn fields(&self) -> &ResourceFieldCollection {
            &self.fields
        }
        async fn count(&self, _request: &ResourceRequest) -> RestfulResult<usize> {
            Ok(0)
        }
        async fn view_multiple(
            &self,
            _ids: &[String],
            _request: &ResourceRequest,
        ) -> RestfulResult<Vec<RenderedItem>> {
            Ok(vec![])
        }
        async fn create(
            &self,
            _payload: &Map<String, Value>,
            _request: &ResourceRequest,
        ) -> RestfulResult<RenderedItem> {
            unimplemented!()
        }
        async fn update(
            &self,
            _id: &str,
            _payload: &Map<String, Value>,
            _replace: bool,
            _request: &ResourceRequest,
        ) -> RestfulResult<RenderedItem> {
            unimplemented!()
        }
        async fn remove(&self, _id: &str, _request: &ResourceRequest) -> RestfulResult<()> {
            Ok(())
        }
        async fn get_index_ids(&self, _request: &ResourceRequest) -> RestfulResult<Vec<String>> {
            Ok(vec![])
        }
    }

    fn version_of(provider: Option<Arc<dyn DataProvider>>) -> Option<(u32, u32)> {
        provider.map(|p| (p.identity().major, p.identity().minor))
    }

    #[test]
    fn test_new_registry_is_empty() {
        let registry = ResourceRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.latest("articles").is_none());
    }

    #[test]
    fn test_latest_version_wins() {
        let mut registry = ResourceRegistry::new();
        registry.register(named("articles", 1, 0));
        registry.register(named("articles", 2, 1));
        registry.register(named("articles", 1, 5));
        registry.register(named("users", 1, 0));

        assert_eq!(version_of(registry.latest("articles")), Some((2, 1)));
        assert_eq!(version_of(registry.resolve("articles", None, None)), Some((2, 1)));
        assert_eq!(version_of(registry.resolve("articles", Some(1), None)), Some((1, 5)));
        assert_eq!(
            version_of(registry.resolve("articles", Some(1), Some(0))),
            Some((1, 0))
        );
        assert!(registry.resolve("articles", Some(3), None).is_none());
        assert_eq!(registry.names(), vec!["articles", "users"]);
        assert_eq!(registry.versions("articles"), vec![(1, 0), (1, 5), (2, 1)]);
    }

    #[test]
    fn test_register_same_version_replaces() {
        let mut registry = ResourceRegistry::new();
        registry.register(named("articles", 1, 0));
        registry.register(named("articles", 1, 0));
        assert_eq!(registry.versions("articles").len(), 1);
    }
}
