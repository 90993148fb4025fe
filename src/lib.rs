//! # Restful-RS
//!
//! Uniform CRUD and query resources over heterogeneous backends.
//!
//! ## Features
//!
//! - **One provider contract**: index, count, view, create, update, remove over
//!   typed objects, SQL tables or in-process registries
//! - **Declarative fields**: public names mapped to properties, columns or
//!   callbacks, with process callbacks and access voters
//! - **Query translation**: filters, sorts and pages validated before any
//!   backend call
//! - **Render cache**: per-user or per-role caching of rendered items, cleared
//!   for every user on writes
//! - **Embedding**: reference fields render the target resource in place,
//!   bounded by depth and cycle guards
//! - **Configuration-Based**: resources declared in YAML
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use restful::prelude::*;
//!
//! let config = RestfulConfig::from_yaml_str(r#"
//! resources:
//!   - name: articles
//!     id_field: id
//!     data_provider: { kind: entity, entity_type: node, bundles: [article] }
//!     fields:
//!       - { name: id, property: id }
//!       - { name: label, property: title }
//!       - { name: author, property: uid, resource: { name: users } }
//! "#)?;
//!
//! let host = ResourceHost::builder()
//!     .with_config(config)
//!     .with_object_store(Arc::new(InMemoryObjectStore::new()))
//!     .build()?;
//!
//! let request = host
//!     .request(Method::GET, "articles")
//!     .with_input(json!({ "sort": "-label", "range": 10 }));
//! let output = host.process("articles", None, &request).await?;
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod embed;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        account::{Account, AccountResolver, AnonymousResolver},
        collection::ResourceFieldCollection,
        error::{
            ConfigError, RequestError, ResourceError, RestfulError, RestfulResult, StorageError,
        },
        field::{
            Cardinality, FieldDefinition, ResourceField, ResourceReference,
            access::{AccessOperation, AccessVoter},
            process,
        },
        provider::{
            DataProvider, ProviderCore, ProviderMiddleware, RenderedItem, ResourceIdentity,
        },
        query::{OneOrMany, Operator, PaginationMeta, SortDirection},
        record::Record,
        request::ResourceRequest,
        store::{BackendKind, ObjectStore, PluginRegistry, SqlExecutor},
    };

    // === Embedding ===
    pub use crate::embed::{EmbedDescriptor, ResourceRegistry};

    // === Cache ===
    pub use crate::cache::{
        CacheGranularity, CachedDataProvider, InMemoryRenderCache, RenderCache,
        RenderCacheMiddleware,
    };

    // === Storage ===
    pub use crate::storage::{DbQueryDataProvider, EntityDataProvider, PluginDataProvider};
    #[cfg(feature = "in-memory")]
    pub use crate::storage::{InMemoryObjectStore, InMemoryPluginRegistry, InMemorySqlExecutor};

    // === Config ===
    pub use crate::config::{ProviderOptions, RenderCacheConfig, ResourceConfig, RestfulConfig};

    // === Server ===
    pub use crate::server::{Resource, ResourceHost, ResourceHostBuilder, ResourceOutput};

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use axum::http::{HeaderMap, Method, StatusCode};
    pub use serde_json::{Value, json};
    pub use std::sync::Arc;
}
