//! Plugin adapter over a [`PluginRegistry`]
//!
//! Registries cannot query, so filtering, sorting and paging run here over
//! the plain field values of every definition.

use crate::core::collection::ResourceFieldCollection;
use crate::core::error::{RequestError, RestfulResult, StorageError};
use crate::core::provider::{
    DataProvider, ProviderCore, RenderedItem, ResourceIdentity, order_by_ids,
};
use crate::core::query::{SortDirection, compare_values};
use crate::core::record::Record;
use crate::core::request::ResourceRequest;
use crate::core::store::PluginRegistry;
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;

const BACKEND: &str = "plugin";

/// Resource backed by an in-process definition registry
///
/// The identifier field must be declared; its value is the definition id.
pub struct PluginDataProvider {
    core: ProviderCore,
    registry: Arc<dyn PluginRegistry>,
}

/// A definition with its plain values keyed by public name
struct Row {
    id: String,
    values: Map<String, Value>,
}

impl PluginDataProvider {
    pub fn new(core: ProviderCore, registry: Arc<dyn PluginRegistry>) -> Self {
        Self { core, registry }
    }

    fn row(&self, record: &Record) -> RestfulResult<Option<Row>> {
        let Some(id) = self.core.fields().record_id(record) else {
            return Ok(None);
        };
        let mut values = Map::new();
        for field in self.core.fields().iter() {
            values.insert(field.id().to_string(), field.value(record)?);
        }
        Ok(Some(Row { id, values }))
    }

    async fn matching(&self, request: &ResourceRequest) -> RestfulResult<Vec<Row>> {
        let groups = self
            .core
            .filter_groups(request, |field| Some(field.id().to_string()))?;

        let definitions = self
            .registry
            .definitions()
            .await
            .map_err(|e| StorageError::query(BACKEND, e))?;

        let mut rows = Vec::with_capacity(definitions.len());
        for record in &definitions {
            if let Some(row) = self.row(record)?
                && self.core.fields().evaluate_filter(&groups, &row.values)
            {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn id_of(&self, record: &Record) -> RestfulResult<String> {
        self.core.fields().record_id(record).ok_or_else(|| {
            RequestError::InvalidValue {
                field: self
                    .core
                    .fields()
                    .id_field()
                    .map(|field| field.id().to_string())
                    .unwrap_or_else(|| "id".to_string()),
                message: "definitions need an identifier".to_string(),
            }
            .into()
        })
    }

    async fn load(&self, id: &str) -> RestfulResult<Option<Record>> {
        self.registry
            .get(id)
            .await
            .map_err(|e| StorageError::query(BACKEND, e).into())
    }

    async fn save(&self, record: Record) -> RestfulResult<()> {
        self.registry
            .save(record)
            .await
            .map_err(|e| StorageError::write(BACKEND, e))?;
        Ok(())
    }
}

#[async_trait]
impl DataProvider for PluginDataProvider {
    fn identity(&self) -> &ResourceIdentity {
        self.core.identity()
    }

    fn fields(&self) -> &ResourceFieldCollection {
        self.core.fields()
    }

    async fn count(&self, request: &ResourceRequest) -> RestfulResult<usize> {
        Ok(self.matching(request).await?.len())
    }

    async fn view_multiple(
        &self,
        ids: &[String],
        request: &ResourceRequest,
    ) -> RestfulResult<Vec<RenderedItem>> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.load(id).await? {
                records.push(record);
            }
        }
        let items = self.core.render_all(&records, request).await?;
        Ok(order_by_ids(items, ids))
    }

    async fn create(
        &self,
        payload: &Map<String, Value>,
        request: &ResourceRequest,
    ) -> RestfulResult<RenderedItem> {
        let values = self.core.validate_payload(payload, request, false)?;

        let mut record = Record::new(BACKEND);
        self.core.apply_payload(&mut record, values, request).await?;
        let id = self.id_of(&record)?;
        if self.load(&id).await?.is_some() {
            return Err(RequestError::InvalidValue {
                field: "id".to_string(),
                message: format!("definition '{}' already exists", id),
            }
            .into());
        }

        record.id = Some(id.clone());
        self.save(record).await?;
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
            .load(id)
            .await?
            .ok_or_else(|| self.core.not_found(id))?;
        let values = self
            .core
            .check_record_access(values, payload, &record, request)?;
        self.core.apply_payload(&mut record, values, request).await?;
        record.id = Some(id.to_string());

        self.save(record).await?;
        self.view(id, request).await
    }

    async fn remove(&self, id: &str, request: &ResourceRequest) -> RestfulResult<()> {
        let removed = self
            .registry
            .remove(id)
            .await
            .map_err(|e| StorageError::write(BACKEND, e))?;
        if !removed {
            return Err(self.core.not_found(id));
        }
        request.set_status(StatusCode::NO_CONTENT);
        Ok(())
    }

    async fn get_index_ids(&self, request: &ResourceRequest) -> RestfulResult<Vec<String>> {
        let default = self
            .core
            .fields()
            .id_field()
            .map(|field| vec![(field.id().to_string(), SortDirection::Asc)])
            .unwrap_or_default();
        let sort = self
            .core
            .sort_columns(request, |field| Some(field.id().to_string()), default)?;
        let pagination = self.core.pagination(request)?;

        let mut rows = self.matching(request).await?;
        rows.sort_by(|a, b| {
            sort.iter()
                .map(|(column, direction)| {
                    let left = a.values.get(column).unwrap_or(&Value::Null);
                    let right = b.values.get(column).unwrap_or(&Value::Null);
                    match direction {
                        SortDirection::Asc => compare_values(left, right),
                        SortDirection::Desc => compare_values(right, left),
                    }
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or_else(|| a.id.cmp(&b.id))
        });

        Ok(rows
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.range)
            .map(|row| row.id)
            .collect())
    }

    fn cache_fragments(&self, id: &str) -> Vec<(String, String)> {
        vec![
            ("plugin".to_string(), self.identity().name.clone()),
            ("id".to_string(), id.to_string()),
        ]
    }
}
