//! Resource host
//!
//! The host holds every registered resource version and the registry that
//! embedding sub-requests resolve against. It is transport-agnostic: a REST
//! router, a CLI or a test builds a [`ResourceRequest`] through
//! [`ResourceHost::request`] and hands it to [`ResourceHost::process`].
//!
//! ```rust,ignore
//! let host = ResourceHost::builder()
//!     .with_config(RestfulConfig::from_yaml_file("restful.yaml")?)
//!     .with_object_store(store)
//!     .build()?;
//!
//! let request = host.request(Method::GET, "articles").with_input(json!({ "range": 10 }));
//! let output = host.process("articles", None, &request).await?;
//! ```

use super::builder::ResourceHostBuilder;
use super::resource::{Resource, ResourceOutput};
use crate::config::RestfulConfig;
use crate::core::error::{ResourceError, RestfulResult};
use crate::core::request::ResourceRequest;
use crate::embed::ResourceRegistry;
use axum::http::Method;
use std::collections::HashMap;
use std::sync::Arc;

/// All framework state needed to serve resources
pub struct ResourceHost {
    /// Configuration the host was built from
    pub config: Arc<RestfulConfig>,

    /// Providers by name and version, shared with sub-requests
    pub registry: Arc<ResourceRegistry>,

    resources: HashMap<(String, u32, u32), Resource>,
}

impl ResourceHost {
    pub fn builder() -> ResourceHostBuilder {
        ResourceHostBuilder::new()
    }

    pub(crate) fn from_parts(
        config: RestfulConfig,
        registry: ResourceRegistry,
        resources: HashMap<(String, u32, u32), Resource>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            resources,
        }
    }

    /// Look up a resource; a missing version part resolves to the latest
    pub fn resource(
        &self,
        name: &str,
        major: Option<u32>,
        minor: Option<u32>,
    ) -> RestfulResult<&Resource> {
        let unknown = || ResourceError::UnknownResource {
            name: name.to_string(),
            version: match (major, minor) {
                (Some(major), Some(minor)) => format!("v{}.{}", major, minor),
                (Some(major), None) => format!("v{}", major),
                _ => "latest".to_string(),
            },
        };

        let provider = self
            .registry
            .resolve(name, major, minor)
            .ok_or_else(unknown)?;
        let identity = provider.identity();
        self.resources
            .get(&(identity.name.clone(), identity.major, identity.minor))
            .ok_or_else(|| unknown().into())
    }

    /// Registered resource names, sorted
    pub fn resource_names(&self) -> Vec<&str> {
        self.registry.names()
    }

    /// A request that can embed any registered resource
    pub fn request(&self, method: Method, path: impl Into<String>) -> ResourceRequest {
        ResourceRequest::new(method, path)
            .with_registry(self.registry.clone())
            .with_max_embed_depth(self.config.max_embed_depth)
    }

    /// Dispatch a request to a resource version
    pub async fn process(
        &self,
        name: &str,
        version: Option<(u32, u32)>,
        request: &ResourceRequest,
    ) -> RestfulResult<ResourceOutput> {
        let (major, minor) = match version {
            Some((major, minor)) => (Some(major), Some(minor)),
            None => (None, None),
        };
        self.resource(name, major, minor)?.process(request).await
    }
}
