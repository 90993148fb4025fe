//! Reference resolution for reads and writes

use crate::core::collection::value_to_id;
use crate::core::error::{RequestError, ResourceError, RestfulError, RestfulResult};
use crate::core::field::{Cardinality, ResourceField, ResourceReference};
use crate::core::provider::{DataProvider, RenderedItem};
use crate::core::query::OneOrMany;
use crate::core::record::Record;
use crate::core::request::ResourceRequest;
use crate::embed::EmbedDescriptor;
use axum::http::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Result of resolving a reference for output
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub value: Value,
    pub embedded: Vec<EmbedDescriptor>,
}

impl Resolved {
    fn raw(value: Value) -> Self {
        Self {
            value,
            embedded: Vec::new(),
        }
    }
}

/// Resolves reference fields against the registry carried by a request
///
/// Recursion is bounded twice: by the request's `max_embed_depth`, and by
/// the chain of `(resource, id)` pairs already being rendered. When either
/// trips, the raw identifier is rendered instead.
pub struct ReferenceResolver<'a> {
    request: &'a ResourceRequest,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(request: &'a ResourceRequest) -> Self {
        Self { request }
    }

    /// Target provider, `None` when the request carries no registry
    fn provider(&self, target: &ResourceReference) -> RestfulResult<Option<Arc<dyn DataProvider>>> {
        let Some(registry) = self.request.registry() else {
            return Ok(None);
        };

        registry
            .resolve(&target.name, target.major, target.minor)
            .map(Some)
            .ok_or_else(|| {
                let version = match (target.major, target.minor) {
                    (Some(major), Some(minor)) => format!("v{}.{}", major, minor),
                    (Some(major), None) => format!("v{}", major),
                    _ => "latest".to_string(),
                };
                RestfulError::from(ResourceError::UnknownResource {
                    name: target.name.clone(),
                    version,
                })
            })
    }

    /// Replace raw identifier(s) with the target's rendered item(s)
    ///
    /// Identifiers with no matching item stay raw. Lists keep their order.
    pub async fn resolve_read(
        &self,
        field: &ResourceField,
        target: &ResourceReference,
        raw: Value,
        record: &Record,
        parent_resource: &str,
    ) -> RestfulResult<Resolved> {
        if raw.is_null() || !target.full_view {
            return Ok(Resolved::raw(raw));
        }

        let Some(provider) = self.provider(target)? else {
            debug!(field = field.id(), target = %target.name, "No registry on request, keeping raw reference");
            return Ok(Resolved::raw(raw));
        };

        if self.request.depth() >= self.request.max_embed_depth() {
            debug!(
                field = field.id(),
                target = %target.name,
                depth = self.request.depth(),
                "Embed depth limit reached, keeping raw reference"
            );
            return Ok(Resolved::raw(raw));
        }

        let parent_id = record.id.clone().unwrap_or_default();
        let visited = |id: &str| {
            (parent_resource == target.name && parent_id == id)
                || self.request.has_visited(&target.name, id)
        };

        let mut fetch: Vec<String> = Vec::new();
        for id in OneOrMany::from_value(raw.clone())
            .as_slice()
            .iter()
            .filter_map(value_to_id)
        {
            if visited(&id) {
                debug!(field = field.id(), target = %target.name, id = %id, "Embed cycle, keeping raw reference");
            } else if !fetch.contains(&id) {
                fetch.push(id);
            }
        }
        if fetch.is_empty() {
            return Ok(Resolved::raw(raw));
        }

        let sub = self.request.sub_request(
            field.id(),
            parent_resource,
            &parent_id,
            target.method.clone(),
        );
        debug!(
            request_id = %sub.id(),
            field = field.id(),
            target = %provider.identity(),
            ids = ?fetch,
            depth = sub.depth(),
            "Dispatching embed sub-request"
        );

        let rendered: HashMap<String, RenderedItem> = provider
            .view_multiple(&fetch, &sub)
            .await?
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();

        let mut embedded = Vec::new();
        let mut embed = |value: &Value| -> Value {
            match value_to_id(value).and_then(|id| rendered.get(&id)) {
                Some(item) => {
                    embedded.push(EmbedDescriptor {
                        parent_id: parent_id.clone(),
                        field: field.id().to_string(),
                        id: item.id.clone(),
                        source_type: item.source_type.clone(),
                        source_bundle: item.source_bundle.clone(),
                        resource_name: target.name.clone(),
                        nested: item.embedded.clone(),
                    });
                    Value::Object(item.values.clone())
                }
                None => value.clone(),
            }
        };

        let value = match &raw {
            Value::Array(items) => Value::Array(items.iter().map(&mut embed).collect()),
            single => embed(single),
        };

        Ok(Resolved { value, embedded })
    }

    /// Turn an incoming reference value into identifier(s) to store
    ///
    /// A bare identifier is kept. `{"id"?, "values": {...}}` is merged
    /// through the target provider (update when `id` is present, create
    /// otherwise) and replaced by the resulting identifier. `Many` fields map
    /// over a list.
    pub async fn resolve_write(
        &self,
        field: &ResourceField,
        target: &ResourceReference,
        value: Value,
    ) -> RestfulResult<Value> {
        match (field.cardinality(), value) {
            (Cardinality::Many, Value::Array(entries)) => {
                let mut ids = Vec::with_capacity(entries.len());
                for entry in entries {
                    ids.push(self.write_one(field, target, entry).await?);
                }
                Ok(Value::Array(ids))
            }
            (Cardinality::Many, Value::Null) => Ok(Value::Null),
            (Cardinality::Many, single) => {
                Ok(Value::Array(vec![self.write_one(field, target, single).await?]))
            }
            (Cardinality::Single, Value::Array(_)) => Err(RequestError::InvalidValue {
                field: field.id().to_string(),
                message: "expects a single reference".to_string(),
            }
            .into()),
            (Cardinality::Single, single) => self.write_one(field, target, single).await,
        }
    }

    async fn write_one(
        &self,
        field: &ResourceField,
        target: &ResourceReference,
        entry: Value,
    ) -> RestfulResult<Value> {
        let invalid = |message: &str| -> RestfulError {
            RequestError::InvalidValue {
                field: field.id().to_string(),
                message: message.to_string(),
            }
            .into()
        };

        let Value::Object(mut object) = entry else {
            return Ok(entry);
        };

        let Some(values) = object.remove("values") else {
            return object
                .remove("id")
                .ok_or_else(|| invalid("a reference needs an 'id' or a 'values' block"));
        };
        let Value::Object(payload) = values else {
            return Err(invalid("'values' must be an object"));
        };

        let provider = self
            .provider(target)?
            .ok_or_else(|| invalid("nested writes need the resource registry"))?;

        let id = object.get("id").and_then(value_to_id);
        let method = if id.is_some() { Method::PATCH } else { Method::POST };
        let sub = self.request.nested_request(field.id(), Some(method));

        debug!(
            field = field.id(),
            target = %provider.identity(),
            id = ?id,
            "Merging nested reference payload"
        );
        let item = provider.merge(id.as_deref(), &payload, &sub).await?;
        Ok(Value::String(item.id))
    }
}
