//! Configuration loading and management
//!
//! ```yaml
//! default_range: 50
//! max_range: 100
//! max_embed_depth: 5
//! render_cache:
//!   enabled: true
//!   granularity: per_role
//! resources:
//!   - name: articles
//!     major: 1
//!     minor: 0
//!     methods: [GET, POST, PATCH, DELETE]
//!     id_field: id
//!     data_provider:
//!       kind: entity
//!       entity_type: node
//!       bundles: [article]
//!     fields:
//!       - name: id
//!         property: id
//!       - name: label
//!         property: title
//!         process: [trim]
//!       - name: author
//!         property: uid
//!         resource: { name: users }
//! ```

use crate::core::error::{ConfigError, RestfulError, RestfulResult};
use crate::core::field::access::AccessVoter;
use crate::core::field::{FieldDefinition, ResourceReference, process};
use crate::core::provider::DEFAULT_RANGE;
use crate::core::request::DEFAULT_MAX_EMBED_DEPTH;
use crate::core::store::BackendKind;
use axum::http::Method;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_range() -> usize {
    DEFAULT_RANGE
}

fn default_max_embed_depth() -> usize {
    DEFAULT_MAX_EMBED_DEPTH
}

fn default_major() -> u32 {
    1
}

fn default_granularity() -> String {
    "per_role".to_string()
}

/// Render cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderCacheConfig {
    #[serde(default)]
    pub enabled: bool,

    /// `per_user` or `per_role`
    #[serde(default = "default_granularity")]
    pub granularity: String,
}

impl Default for RenderCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            granularity: default_granularity(),
        }
    }
}

/// Backend options of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderOptions {
    /// Adapter to build
    pub kind: BackendKind,

    /// Object-store type (entity adapter)
    #[serde(default)]
    pub entity_type: Option<String>,

    /// Restrict to these bundles (entity adapter)
    #[serde(default)]
    pub bundles: Vec<String>,

    /// Table name (db_query adapter)
    #[serde(default)]
    pub table: Option<String>,

    /// Identifier columns, joined with `::` (db_query adapter)
    #[serde(default)]
    pub id_columns: Vec<String>,

    /// Property holding the record id (entity adapter)
    #[serde(default)]
    pub id_property: Option<String>,

    /// Page size for this resource
    #[serde(default)]
    pub range: Option<usize>,

    /// Default `full_view` of reference fields declared in config
    #[serde(default)]
    pub full_view_default: Option<bool>,
}

impl ProviderOptions {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            entity_type: None,
            bundles: Vec::new(),
            table: None,
            id_columns: Vec::new(),
            id_property: None,
            range: None,
            full_view_default: None,
        }
    }

    /// A required string option
    pub fn require(&self, resource: &str, key: &str) -> RestfulResult<&str> {
        let value = match key {
            "entity_type" => self.entity_type.as_deref(),
            "table" => self.table.as_deref(),
            "id_property" => self.id_property.as_deref(),
            _ => None,
        };
        value
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| missing_key(resource, key))
    }

    /// A required, non-empty list option
    pub fn require_list(&self, resource: &str, key: &str) -> RestfulResult<&[String]> {
        let value: &[String] = match key {
            "bundles" => &self.bundles,
            "id_columns" => &self.id_columns,
            _ => &[],
        };
        if value.is_empty() {
            Err(missing_key(resource, key))
        } else {
            Ok(value)
        }
    }
}

fn missing_key(resource: &str, key: &str) -> RestfulError {
    tracing::warn!(resource, key, "Missing required data provider option");
    ConfigError::MissingKey {
        resource: resource.to_string(),
        key: key.to_string(),
    }
    .into()
}

/// Reference target of a field declared in config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceConfig {
    pub name: String,

    #[serde(default)]
    pub major: Option<u32>,

    #[serde(default)]
    pub minor: Option<u32>,

    #[serde(default)]
    pub full_view: Option<bool>,

    /// Method of the sub-request, the parent's when absent
    #[serde(default)]
    pub method: Option<String>,
}

/// A field declared in config
///
/// Computed fields need a callback and are declared in code instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,

    #[serde(default)]
    pub property: Option<String>,

    #[serde(default)]
    pub sub_property: Option<String>,

    #[serde(default)]
    pub column: Option<String>,

    /// `GET`, `POST`, ...; empty means every method
    #[serde(default)]
    pub methods: Vec<String>,

    /// `authenticated`, `read_only`, `role:<name>`
    #[serde(default)]
    pub access: Vec<String>,

    /// `trim`, `uppercase`, `lowercase`, `to_number`, `round:<decimals>`
    #[serde(default)]
    pub process: Vec<String>,

    #[serde(default)]
    pub resource: Option<ReferenceConfig>,

    #[serde(default)]
    pub many: bool,
}

fn parse_method(field: &str, raw: &str) -> RestfulResult<Method> {
    Method::from_bytes(raw.trim().to_uppercase().as_bytes()).map_err(|_| {
        ConfigError::InvalidField {
            field: field.to_string(),
            message: format!("unknown method '{}'", raw),
        }
        .into()
    })
}

impl FieldConfig {
    /// Turn the declaration into a field definition
    pub fn to_definition(&self, full_view_default: bool) -> RestfulResult<FieldDefinition> {
        let invalid = |message: String| -> RestfulError {
            ConfigError::InvalidField {
                field: self.name.clone(),
                message,
            }
            .into()
        };

        let mut definition = FieldDefinition::new(&self.name);
        definition.property = self.property.clone();
        definition.sub_property = self.sub_property.clone();
        definition.column = self.column.clone();

        let methods = self
            .methods
            .iter()
            .map(|raw| parse_method(&self.name, raw))
            .collect::<RestfulResult<Vec<_>>>()?;
        definition = definition.methods(&methods);

        for raw in &self.access {
            let voter = AccessVoter::parse(raw)
                .ok_or_else(|| invalid(format!("unknown access voter '{}'", raw)))?;
            definition = definition.access(voter);
        }

        for raw in &self.process {
            definition = match raw.as_str() {
                "trim" => definition.process(process::trim()),
                "uppercase" => definition.process(process::uppercase()),
                "lowercase" => definition.process(process::lowercase()),
                "to_number" => definition.process(process::to_number()),
                other => match other.strip_prefix("round:").map(str::parse::<u32>) {
                    Some(Ok(decimals)) => definition.process(process::round_decimals(decimals)),
                    _ => return Err(invalid(format!("unknown process callback '{}'", raw))),
                },
            };
        }

        if let Some(reference) = &self.resource {
            let mut target = ResourceReference::new(&reference.name)
                .full_view(reference.full_view.unwrap_or(full_view_default));
            target.major = reference.major;
            target.minor = reference.minor;
            if let Some(method) = &reference.method {
                target = target.method(parse_method(&self.name, method)?);
            }
            definition = definition.resource(target);
        }

        if self.many {
            definition = definition.many();
        }

        Ok(definition)
    }
}

/// One resource version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,

    #[serde(default = "default_major")]
    pub major: u32,

    #[serde(default)]
    pub minor: u32,

    /// Allowed HTTP methods; empty means all
    #[serde(default)]
    pub methods: Vec<String>,

    /// Public name of the identifier field
    #[serde(default)]
    pub id_field: Option<String>,

    #[serde(default)]
    pub fields: Vec<FieldConfig>,

    pub data_provider: ProviderOptions,

    /// Overrides the global render cache settings
    #[serde(default)]
    pub render_cache: Option<RenderCacheConfig>,
}

impl ResourceConfig {
    pub fn new(name: impl Into<String>, major: u32, minor: u32, data_provider: ProviderOptions) -> Self {
        Self {
            name: name.into(),
            major,
            minor,
            methods: Vec::new(),
            id_field: None,
            fields: Vec::new(),
            data_provider,
            render_cache: None,
        }
    }

    pub fn allowed_methods(&self) -> RestfulResult<Vec<Method>> {
        self.methods
            .iter()
            .map(|raw| parse_method(&self.name, raw))
            .collect()
    }

    /// Definitions of the fields declared in config
    pub fn field_definitions(&self) -> RestfulResult<Vec<FieldDefinition>> {
        let full_view_default = self.data_provider.full_view_default.unwrap_or(true);
        self.fields
            .iter()
            .map(|field| field.to_definition(full_view_default))
            .collect()
    }
}

/// Complete configuration, resolved once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestfulConfig {
    /// Page size when a request has no `range`
    #[serde(default = "default_range")]
    pub default_range: usize,

    /// Cap on requested page sizes
    #[serde(default)]
    pub max_range: Option<usize>,

    #[serde(default)]
    pub render_cache: RenderCacheConfig,

    /// Bound on nested embed sub-requests
    #[serde(default = "default_max_embed_depth")]
    pub max_embed_depth: usize,

    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl Default for RestfulConfig {
    fn default() -> Self {
        Self {
            default_range: DEFAULT_RANGE,
            max_range: None,
            render_cache: RenderCacheConfig::default(),
            max_embed_depth: DEFAULT_MAX_EMBED_DEPTH,
            resources: Vec::new(),
        }
    }
}

impl RestfulConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> RestfulResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> RestfulResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Fold another configuration into this one
    ///
    /// Settings come from `other`. Resources with the same name and version
    /// are replaced, new ones appended.
    pub fn merge(&mut self, other: RestfulConfig) {
        self.default_range = other.default_range;
        self.max_range = other.max_range;
        self.render_cache = other.render_cache;
        self.max_embed_depth = other.max_embed_depth;

        for resource in other.resources {
            match self.resources.iter_mut().find(|existing| {
                existing.name == resource.name
                    && existing.major == resource.major
                    && existing.minor == resource.minor
            }) {
                Some(existing) => *existing = resource,
                None => self.resources.push(resource),
            }
        }
    }

    pub fn resource(&self, name: &str, major: u32, minor: u32) -> Option<&ResourceConfig> {
        self.resources
            .iter()
            .find(|r| r.name == name && r.major == major && r.minor == minor)
    }

    /// Render cache settings of a resource, its override first
    pub fn render_cache_for<'a>(&'a self, resource: &'a ResourceConfig) -> &'a RenderCacheConfig {
        resource.render_cache.as_ref().unwrap_or(&self.render_cache)
    }

    /// Page size of a resource, its own `range` first
    pub fn range_for(&self, resource: &ResourceConfig) -> usize {
        resource.data_provider.range.unwrap_or(self.default_range)
    }
}
