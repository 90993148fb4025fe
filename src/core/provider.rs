//! Data provider contract
//!
//! A [`DataProvider`] turns the generic CRUD+query operations of a resource
//! into calls against one backend, and maps each raw [`Record`] through the
//! resource's field collection into a [`RenderedItem`].
//!
//! [`ProviderCore`] holds what every adapter shares: rendering, payload
//! validation, and translating filter/sort/pagination input against the
//! collection. Adapters only add the backend calls.

use crate::core::collection::ResourceFieldCollection;
use crate::core::error::{RequestError, ResourceError, RestfulError, RestfulResult};
use crate::core::field::ResourceField;
use crate::core::field::access::AccessOperation;
use crate::core::query::{ConditionGroup, Pagination, SortDirection};
use crate::core::record::Record;
use crate::core::request::ResourceRequest;
use crate::embed::{EmbedDescriptor, ReferenceResolver};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Default page size
pub const DEFAULT_RANGE: usize = 50;

/// Name and version of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceIdentity {
    pub name: String,
    pub major: u32,
    pub minor: u32,
}

impl ResourceIdentity {
    pub fn new(name: impl Into<String>, major: u32, minor: u32) -> Self {
        Self {
            name: name.into(),
            major,
            minor,
        }
    }

    /// `v{major}.{minor}`
    pub fn version(&self) -> String {
        format!("v{}.{}", self.major, self.minor)
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version())
    }
}

/// One rendered item, ready for a formatter
///
/// `embedded` lists the values that came from other resources so a formatter
/// can relocate them (HAL `_embedded`, JSON:API `included`, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedItem {
    pub id: String,
    pub values: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embedded: Vec<EmbedDescriptor>,
    pub source_type: String,
    pub source_bundle: Option<String>,
}

impl RenderedItem {
    pub fn get(&self, public_name: &str) -> Option<&Value> {
        self.values.get(public_name)
    }
}

/// Uniform CRUD+query contract over one backend
#[async_trait]
pub trait DataProvider: Send + Sync {
    fn identity(&self) -> &ResourceIdentity;

    fn fields(&self) -> &ResourceFieldCollection;

    /// Items of the current list query (filter, sort, page)
    async fn index(&self, request: &ResourceRequest) -> RestfulResult<Vec<RenderedItem>> {
        let ids = self.get_index_ids(request).await?;
        self.view_multiple(&ids, request).await
    }

    /// Number of items matching the list filter, ignoring sort and page
    async fn count(&self, request: &ResourceRequest) -> RestfulResult<usize>;

    /// One item; missing is `NotFound`
    async fn view(&self, id: &str, request: &ResourceRequest) -> RestfulResult<RenderedItem> {
        let mut items = self.view_multiple(&[id.to_string()], request).await?;
        if items.is_empty() {
            return Err(ResourceError::NotFound {
                resource: self.identity().name.clone(),
                id: id.to_string(),
            }
            .into());
        }
        Ok(items.swap_remove(0))
    }

    /// Items in the order asked for; unknown ids are omitted
    async fn view_multiple(
        &self,
        ids: &[String],
        request: &ResourceRequest,
    ) -> RestfulResult<Vec<RenderedItem>>;

    /// Create from a payload keyed by public field name
    async fn create(
        &self,
        payload: &Map<String, Value>,
        request: &ResourceRequest,
    ) -> RestfulResult<RenderedItem>;

    /// Update; `replace` nulls writable fields missing from the payload
    async fn update(
        &self,
        id: &str,
        payload: &Map<String, Value>,
        replace: bool,
        request: &ResourceRequest,
    ) -> RestfulResult<RenderedItem>;

    /// Delete; signals 204 on the request
    async fn remove(&self, id: &str, request: &ResourceRequest) -> RestfulResult<()>;

    /// Identifiers of the current list query
    async fn get_index_ids(&self, request: &ResourceRequest) -> RestfulResult<Vec<String>>;

    /// Backend lookup fragments identifying one item
    fn cache_fragments(&self, id: &str) -> Vec<(String, String)> {
        vec![("id".to_string(), id.to_string())]
    }

    /// Partial update of an existing item, or create when `id` is `None`
    async fn merge(
        &self,
        id: Option<&str>,
        payload: &Map<String, Value>,
        request: &ResourceRequest,
    ) -> RestfulResult<RenderedItem> {
        match id {
            Some(id) => self.update(id, payload, false, request).await,
            None => self.create(payload, request).await,
        }
    }
}

/// Wraps a provider with a cross-cutting concern
///
/// Middleware is applied in registration order, so the last one added is the
/// outermost layer.
pub trait ProviderMiddleware: Send + Sync {
    fn name(&self) -> &str;

    fn wrap(&self, provider: Arc<dyn DataProvider>) -> RestfulResult<Arc<dyn DataProvider>>;
}

/// Apply middleware in order
pub fn apply_middleware(
    provider: Arc<dyn DataProvider>,
    middleware: &[Arc<dyn ProviderMiddleware>],
) -> RestfulResult<Arc<dyn DataProvider>> {
    middleware
        .iter()
        .try_fold(provider, |provider, layer| layer.wrap(provider))
}

/// Logic shared by every adapter
#[derive(Debug, Clone)]
pub struct ProviderCore {
    identity: ResourceIdentity,
    fields: ResourceFieldCollection,
    default_range: usize,
    max_range: Option<usize>,
}

impl ProviderCore {
    pub fn new(identity: ResourceIdentity, fields: ResourceFieldCollection) -> Self {
        Self {
            identity,
            fields,
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
        &self.identity
    }

    pub fn fields(&self) -> &ResourceFieldCollection {
        &self.fields
    }

    pub fn pagination(&self, request: &ResourceRequest) -> RestfulResult<Pagination> {
        request.pagination(self.default_range, self.max_range)
    }

    /// Translate the request filter into ANDed condition groups
    ///
    /// `column` maps a field to the name the backend filters on; a field
    /// without one cannot be filtered.
    pub fn filter_groups<F>(
        &self,
        request: &ResourceRequest,
        column: F,
    ) -> RestfulResult<Vec<ConditionGroup>>
    where
        F: Fn(&ResourceField) -> Option<String>,
    {
        request
            .filters()?
            .iter()
            .map(|item| -> RestfulResult<ConditionGroup> {
                let field = self.fields.get(&item.public_field).ok_or_else(|| {
                    RequestError::UnknownFilterField {
                        field: item.public_field.clone(),
                    }
                })?;
                let column = column(field).ok_or_else(|| RequestError::InvalidFilter {
                    field: item.public_field.clone(),
                    message: "field cannot be filtered".to_string(),
                })?;
                Ok(item.to_group(&column))
            })
            .collect()
    }

    /// Translate the request sort, falling back to `default`
    pub fn sort_columns<F>(
        &self,
        request: &ResourceRequest,
        column: F,
        default: Vec<(String, SortDirection)>,
    ) -> RestfulResult<Vec<(String, SortDirection)>>
    where
        F: Fn(&ResourceField) -> Option<String>,
    {
        let Some(spec) = request.sort()? else {
            return Ok(default);
        };

        spec.iter()
            .map(|(public_field, direction)| {
                self.fields
                    .get(public_field)
                    .and_then(&column)
                    .map(|column| (column, *direction))
                    .ok_or_else(|| {
                        RestfulError::from(RequestError::UnknownSortField {
                            field: public_field.clone(),
                        })
                    })
            })
            .collect()
    }

    /// Map a record through the collection
    ///
    /// Fields are skipped when they are not selected, do not apply to the
    /// method, or fail view access.
    pub async fn render(
        &self,
        record: &Record,
        request: &ResourceRequest,
    ) -> RestfulResult<RenderedItem> {
        let id = self.fields.record_id(record).unwrap_or_default();
        let with_id: Cow<'_, Record> = if record.id.as_deref() == Some(id.as_str()) {
            Cow::Borrowed(record)
        } else {
            Cow::Owned(record.clone().with_id(id.clone()))
        };
        let record: &Record = &with_id;

        let selection = request.field_selection();
        let method = request.method();
        let mut values = Map::new();
        let mut embedded = Vec::new();

        for field in self.fields.limit_fields(selection.as_deref())? {
            if !field.applies_to(method)
                || !field.access(AccessOperation::View, request.account(), method, Some(record))
            {
                continue;
            }
            let output = field.render(record, request, &self.identity.name).await?;
            values.insert(field.id().to_string(), output.value);
            embedded.extend(output.embedded);
        }

        Ok(RenderedItem {
            id,
            values,
            embedded,
            source_type: record.source_type.clone(),
            source_bundle: record.bundle.clone(),
        })
    }

    pub async fn render_all(
        &self,
        records: &[Record],
        request: &ResourceRequest,
    ) -> RestfulResult<Vec<RenderedItem>> {
        let mut items = Vec::with_capacity(records.len());
        for record in records {
            items.push(self.render(record, request).await?);
        }
        Ok(items)
    }

    /// Check a payload against the collection
    ///
    /// Every key must name a field that applies to the method, is writable
    /// and passes edit access. All offending keys are reported together.
    /// With `replace`, writable fields missing from the payload are added
    /// with `null`.
    pub fn validate_payload<'a>(
        &'a self,
        payload: &Map<String, Value>,
        request: &ResourceRequest,
        replace: bool,
    ) -> RestfulResult<Vec<(&'a ResourceField, Value)>> {
        let method = request.method();
        let account = request.account();
        let editable = |field: &ResourceField| {
            field.applies_to(method)
                && field.is_writable()
                && field.access(AccessOperation::Edit, account, method, None)
        };

        let mut illegal = Vec::new();
        let mut values = Vec::new();
        for (key, value) in payload {
            match self.fields.get(key) {
                Some(field) if editable(field) => values.push((field, value.clone())),
                _ => illegal.push(key.clone()),
            }
        }

        if !illegal.is_empty() {
            tracing::warn!(
                resource = %self.identity,
                keys = ?illegal,
                "Rejected payload keys"
            );
            return Err(RequestError::IllegalPayloadKeys { keys: illegal }.into());
        }
        if values.is_empty() {
            return Err(RequestError::NoValuesSent.into());
        }

        if replace {
            let id_field = self.fields.id_field().map(ResourceField::id);
            for field in self.fields.iter() {
                if payload.contains_key(field.id())
                    || Some(field.id()) == id_field
                    || field.is_computed()
                    || !editable(field)
                {
                    continue;
                }
                values.push((field, Value::Null));
            }
        }

        Ok(values)
    }

    /// Run edit access again, now against the stored record
    ///
    /// [`validate_payload`](Self::validate_payload) votes before anything is
    /// loaded, so voters see no record there. Updates call this once the
    /// record is loaded. Denied keys the caller sent are rejected; denied
    /// fields that only `replace` added are left untouched.
    pub fn check_record_access<'a>(
        &self,
        values: Vec<(&'a ResourceField, Value)>,
        payload: &Map<String, Value>,
        record: &Record,
        request: &ResourceRequest,
    ) -> RestfulResult<Vec<(&'a ResourceField, Value)>> {
        let mut illegal = Vec::new();
        let mut allowed = Vec::with_capacity(values.len());
        for (field, value) in values {
            if field.access(
                AccessOperation::Edit,
                request.account(),
                request.method(),
                Some(record),
            ) {
                allowed.push((field, value));
            } else if payload.contains_key(field.id()) {
                illegal.push(field.id().to_string());
            }
        }

        if !illegal.is_empty() {
            tracing::warn!(
                resource = %self.identity,
                keys = ?illegal,
                "Rejected payload keys for stored record"
            );
            return Err(RequestError::IllegalPayloadKeys { keys: illegal }.into());
        }
        Ok(allowed)
    }

    /// Write validated values into a record
    ///
    /// Reference fields resolve nested payloads through their target first.
    pub async fn apply_payload(
        &self,
        record: &mut Record,
        values: Vec<(&ResourceField, Value)>,
        request: &ResourceRequest,
    ) -> RestfulResult<()> {
        for (field, value) in values {
            let value = match field.reference() {
                Some(target) => {
                    ReferenceResolver::new(request)
                        .resolve_write(field, target, value)
                        .await?
                }
                None => value,
            };
            field.set(value, record)?;
        }
        Ok(())
    }

    pub fn not_found(&self, id: &str) -> RestfulError {
        ResourceError::NotFound {
            resource: self.identity.name.clone(),
            id: id.to_string(),
        }
        .into()
    }
}

/// Keep `order`, dropping ids with no item
pub fn order_by_ids(mut items: Vec<RenderedItem>, order: &[String]) -> Vec<RenderedItem> {
    let mut ordered = Vec::with_capacity(items.len());
    for id in order {
        if let Some(position) = items.iter().position(|item| &item.id == id) {
            ordered.push(items.swap_remove(position));
        }
    }
    ordered
}
