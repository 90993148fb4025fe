//! ResourceHostBuilder for assembling resources from configuration

use super::host::ResourceHost;
use super::resource::Resource;
use crate::cache::{InMemoryRenderCache, RenderCache, RenderCacheMiddleware};
use crate::config::{RenderCacheConfig, ResourceConfig, RestfulConfig};
use crate::core::collection::ResourceFieldCollection;
use crate::core::error::{ConfigError, RestfulError, RestfulResult};
use crate::core::field::FieldDefinition;
use crate::core::provider::{
    DataProvider, ProviderCore, ProviderMiddleware, ResourceIdentity, apply_middleware,
};
use crate::core::store::{BackendKind, ObjectStore, PluginRegistry, SqlExecutor};
use crate::embed::ResourceRegistry;
use crate::storage::{DbQueryDataProvider, EntityDataProvider, PluginDataProvider};
use axum::http::Method;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Builder for a [`ResourceHost`]
///
/// Resources declared in config are built with the backend registered for
/// their kind. Providers built by hand join through
/// [`with_provider`](Self::with_provider).
///
/// # Example
///
/// ```ignore
/// let host = ResourceHostBuilder::new()
///     .with_config(config)
///     .with_sql_executor(executor)
///     .with_fields("pages", 1, 0, vec![
///         FieldDefinition::new("teaser").callback(|r| Ok(teaser(r))),
///     ])
///     .build()?;
/// ```
pub struct ResourceHostBuilder {
    configs: Vec<RestfulConfig>,
    object_store: Option<Arc<dyn ObjectStore>>,
    sql_executor: Option<Arc<dyn SqlExecutor>>,
    plugin_registry: Option<Arc<dyn PluginRegistry>>,
    render_cache: Option<Arc<dyn RenderCache>>,
    middleware: Vec<Arc<dyn ProviderMiddleware>>,
    extra_fields: HashMap<(String, u32, u32), Vec<FieldDefinition>>,
    providers: Vec<(Arc<dyn DataProvider>, Vec<Method>)>,
}

impl Default for ResourceHostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceHostBuilder {
    pub fn new() -> Self {
        Self {
            configs: Vec::new(),
            object_store: None,
            sql_executor: None,
            plugin_registry: None,
            render_cache: None,
            middleware: Vec::new(),
            extra_fields: HashMap::new(),
            providers: Vec::new(),
        }
    }

    /// Add a configuration; later ones win on conflicts
    pub fn with_config(mut self, config: RestfulConfig) -> Self {
        self.configs.push(config);
        self
    }

    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn with_sql_executor(mut self, executor: Arc<dyn SqlExecutor>) -> Self {
        self.sql_executor = Some(executor);
        self
    }

    pub fn with_plugin_registry(mut self, registry: Arc<dyn PluginRegistry>) -> Self {
        self.plugin_registry = Some(registry);
        self
    }

    /// Storage for rendered items; an in-memory cache is used when unset
    pub fn with_render_cache(mut self, cache: Arc<dyn RenderCache>) -> Self {
        self.render_cache = Some(cache);
        self
    }

    /// Wrap every provider; applied in order, inside the render cache
    pub fn with_middleware(mut self, middleware: Arc<dyn ProviderMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Fields declared in code (computed values, setters, custom voters)
    ///
    /// They are appended after the fields of the matching config entry.
    pub fn with_fields(
        mut self,
        name: &str,
        major: u32,
        minor: u32,
        definitions: Vec<FieldDefinition>,
    ) -> Self {
        self.extra_fields
            .entry((name.to_string(), major, minor))
            .or_default()
            .extend(definitions);
        self
    }

    /// Register a provider built outside of config
    pub fn with_provider(mut self, provider: Arc<dyn DataProvider>, methods: Vec<Method>) -> Self {
        self.providers.push((provider, methods));
        self
    }

    fn merged_config(&mut self) -> RestfulConfig {
        let mut configs = std::mem::take(&mut self.configs).into_iter();
        let mut merged = configs.next().unwrap_or_default();
        for config in configs {
            merged.merge(config);
        }
        merged
    }

    fn missing_backend(resource: &str, backend: &str) -> RestfulError {
        ConfigError::MissingKey {
            resource: resource.to_string(),
            key: backend.to_string(),
        }
        .into()
    }

    fn build_provider(
        &mut self,
        config: &RestfulConfig,
        resource: &ResourceConfig,
    ) -> RestfulResult<Arc<dyn DataProvider>> {
        let kind = resource.data_provider.kind;
        let mut definitions = resource.field_definitions()?;
        if let Some(extra) = self.extra_fields.remove(&(
            resource.name.clone(),
            resource.major,
            resource.minor,
        )) {
            definitions.extend(extra);
        }

        let fields =
            ResourceFieldCollection::from_definitions(definitions, kind, resource.id_field.as_deref())?;
        let core = ProviderCore::new(
            ResourceIdentity::new(&resource.name, resource.major, resource.minor),
            fields,
        )
        .with_range(config.range_for(resource), config.max_range);

        let provider: Arc<dyn DataProvider> = match kind {
            BackendKind::Entity => {
                let store = self
                    .object_store
                    .clone()
                    .ok_or_else(|| Self::missing_backend(&resource.name, "object_store"))?;
                Arc::new(EntityDataProvider::new(core, store, &resource.data_provider)?)
            }
            BackendKind::DbQuery => {
                let executor = self
                    .sql_executor
                    .clone()
                    .ok_or_else(|| Self::missing_backend(&resource.name, "sql_executor"))?;
                Arc::new(DbQueryDataProvider::new(core, executor, &resource.data_provider)?)
            }
            BackendKind::Memory => {
                let registry = self
                    .plugin_registry
                    .clone()
                    .ok_or_else(|| Self::missing_backend(&resource.name, "plugin_registry"))?;
                Arc::new(PluginDataProvider::new(core, registry))
            }
        };
        Ok(provider)
    }

    fn wrap(
        &mut self,
        provider: Arc<dyn DataProvider>,
        cache: &RenderCacheConfig,
    ) -> RestfulResult<Arc<dyn DataProvider>> {
        let mut layers = self.middleware.clone();
        if cache.enabled {
            let storage = self
                .render_cache
                .get_or_insert_with(|| Arc::new(InMemoryRenderCache::new()) as Arc<dyn RenderCache>)
                .clone();
            layers.push(Arc::new(RenderCacheMiddleware::new(
                storage,
                &cache.granularity,
            )?));
        }
        apply_middleware(provider, &layers)
    }

    /// Build every resource and the registry they share
    pub fn build(mut self) -> RestfulResult<ResourceHost> {
        let config = self.merged_config();
        let mut registry = ResourceRegistry::new();
        let mut resources = HashMap::new();

        let mut register = |provider: Arc<dyn DataProvider>, resource: Resource| {
            let identity = provider.identity().clone();
            info!(resource = %identity, "Resource registered");
            registry.register(provider);
            resources.insert((identity.name, identity.major, identity.minor), resource);
        };

        for resource_config in &config.resources {
            let provider = self.build_provider(&config, resource_config)?;
            let provider = self.wrap(provider, config.render_cache_for(resource_config))?;
            let resource = Resource::new(provider.clone(), resource_config.allowed_methods()?)
                .with_range(config.range_for(resource_config), config.max_range);
            register(provider, resource);
        }

        for (provider, methods) in std::mem::take(&mut self.providers) {
            let provider = self.wrap(provider, &config.render_cache)?;
            let resource = Resource::new(provider.clone(), methods)
                .with_range(config.default_range, config.max_range);
            register(provider, resource);
        }

        Ok(ResourceHost::from_parts(config, registry, resources))
    }
}
