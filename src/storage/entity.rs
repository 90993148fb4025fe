//! Entity adapter over an [`ObjectStore`]

use crate::config::ProviderOptions;
use crate::core::collection::{ResourceFieldCollection, value_to_id};
use crate::core::error::{RestfulResult, StorageError};
use crate::core::field::ResourceField;
use crate::core::provider::{
    DataProvider, ProviderCore, RenderedItem, ResourceIdentity, order_by_ids,
};
use crate::core::query::SortDirection;
use crate::core::record::Record;
use crate::core::request::ResourceRequest;
use crate::core::store::{EntityQuery, ObjectStore};
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

const BACKEND: &str = "entity";

/// Column the object store uses for record identifiers
const ID_COLUMN: &str = "id";

/// Resource backed by typed objects
///
/// Requires `entity_type`. `bundles` restricts lists and is stamped on new
/// records when it names exactly one bundle. The record id is exposed to the
/// field collection under `id_property` (default `id`).
pub struct EntityDataProvider {
    core: ProviderCore,
    store: Arc<dyn ObjectStore>,
    entity_type: String,
    bundles: Vec<String>,
    id_property: String,
}

impl EntityDataProvider {
    pub fn new(
        core: ProviderCore,
        store: Arc<dyn ObjectStore>,
        options: &ProviderOptions,
    ) -> RestfulResult<Self> {
        let resource = core.identity().name.clone();
        let entity_type = options.require(&resource, "entity_type")?.to_string();
        let id_property = options
            .id_property
            .clone()
            .unwrap_or_else(|| ID_COLUMN.to_string());

        Ok(Self {
            core,
            store,
            entity_type,
            bundles: options.bundles.clone(),
            id_property,
        })
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn is_id_field(&self, field: &ResourceField) -> bool {
        self.core
            .fields()
            .id_field()
            .is_some_and(|id| id.id() == field.id())
    }

    fn column(&self, field: &ResourceField) -> Option<String> {
        if self.is_id_field(field) {
            Some(ID_COLUMN.to_string())
        } else {
            field.column_for_query().map(str::to_string)
        }
    }

    fn query(&self, request: &ResourceRequest, paged: bool) -> RestfulResult<EntityQuery> {
        let mut query = EntityQuery {
            entity_type: self.entity_type.clone(),
            bundles: self.bundles.clone(),
            conditions: self.core.filter_groups(request, |f| self.column(f))?,
            ..Default::default()
        };

        if paged {
            query.sort = self.core.sort_columns(
                request,
                |f| self.column(f),
                vec![(ID_COLUMN.to_string(), SortDirection::Asc)],
            )?;
            let pagination = self.core.pagination(request)?;
            query.range = Some((pagination.offset(), pagination.range));
        }

        Ok(query)
    }

    /// Load records and expose their id under `id_property`
    async fn load(&self, ids: &[String]) -> RestfulResult<Vec<Record>> {
        let records = self
            .store
            .load_multiple(&self.entity_type, ids)
            .await
            .map_err(|e| StorageError::query(BACKEND, e))?;

        Ok(records
            .into_iter()
            .map(|mut record| {
                if let Some(id) = record.id.clone() {
                    record.set(self.id_property.clone(), Value::String(id));
                }
                record
            })
            .collect())
    }

    async fn save(&self, mut record: Record) -> RestfulResult<String> {
        if let Some(id) = record.values.remove(&self.id_property).as_ref().and_then(value_to_id) {
            record.id = Some(id);
        }
        let saved = self
            .store
            .save(record)
            .await
            .map_err(|e| StorageError::write(BACKEND, e))?;
        Ok(saved.id.unwrap_or_default())
    }
}

#[async_trait]
impl DataProvider for EntityDataProvider {
    fn identity(&self) -> &ResourceIdentity {
        self.core.identity()
    }

    fn fields(&self) -> &ResourceFieldCollection {
        self.core.fields()
    }

    async fn count(&self, request: &ResourceRequest) -> RestfulResult<usize> {
        let query = self.query(request, false)?;
        self.store
            .count(&query)
            .await
            .map_err(|e| StorageError::query(BACKEND, e).into())
    }

    async fn view_multiple(
        &self,
        ids: &[String],
        request: &ResourceRequest,
    ) -> RestfulResult<Vec<RenderedItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.load(ids).await?;
        let items = self.core.render_all(&records, request).await?;
        Ok(order_by_ids(items, ids))
    }

    async fn create(
        &self,
        payload: &Map<String, Value>,
        request: &ResourceRequest,
    ) -> RestfulResult<RenderedItem> {
        let values = self.core.validate_payload(payload, request, false)?;

        let mut record = Record::new(&self.entity_type);
        if let [bundle] = self.bundles.as_slice() {
            record.bundle = Some(bundle.clone());
        }
        self.core.apply_payload(&mut record, values, request).await?;

        let id = self.save(record).await?;
        debug!(resource = %self.identity(), id = %id, "Entity created");
        self.view(&id, request).await
    }

    async fn update(
        &self,
        id: &str,
        payload: &Map<String, Value>,
        replace: bool,
        request: &ResourceRequest,
    ) -> RestfulResult<RenderedItem> {
        let values = self.core.validate_payload(payload, request, replace)?;

        let mut record = self
            .load(&[id.to_string()])
            .await?
            .pop()
            .ok_or_else(|| self.core.not_found(id))?;
        let values = self
            .core
            .check_record_access(values, payload, &record, request)?;
        self.core.apply_payload(&mut record, values, request).await?;
        record.set(self.id_property.clone(), Value::String(id.to_string()));

        self.save(record).await?;
        self.view(id, request).await
    }

    async fn remove(&self, id: &str, request: &ResourceRequest) -> RestfulResult<()> {
        let removed = self
            .store
            .delete(&self.entity_type, id)
            .await
            .map_err(|e| StorageError::write(BACKEND, e))?;
        if !removed {
            return Err(self.core.not_found(id));
        }
        request.set_status(StatusCode::NO_CONTENT);
        Ok(())
    }

    async fn get_index_ids(&self, request: &ResourceRequest) -> RestfulResult<Vec<String>> {
        let query = self.query(request, true)?;
        debug!(resource = %self.identity(), query = ?query, "Entity query");
        self.store
            .query_ids(&query)
            .await
            .map_err(|e| StorageError::query(BACKEND, e).into())
    }

    fn cache_fragments(&self, id: &str) -> Vec<(String, String)> {
        vec![
            ("entity".to_string(), self.entity_type.clone()),
            ("id".to_string(), id.to_string()),
        ]
    }
}
