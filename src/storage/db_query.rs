//! Table adapter over a [`SqlExecutor`]

use crate::config::ProviderOptions;
use crate::core::collection::{ResourceFieldCollection, value_to_id};
use crate::core::error::{RequestError, RestfulResult, StorageError};
use crate::core::field::ResourceField;
use crate::core::provider::{
    DataProvider, ProviderCore, RenderedItem, ResourceIdentity, order_by_ids,
};
use crate::core::query::{Condition, ConditionGroup, Operator, SortDirection};
use crate::core::record::Record;
use crate::core::request::ResourceRequest;
use crate::core::store::{SelectQuery, SqlExecutor, check_identifier};
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

const BACKEND: &str = "db_query";

/// Separator between the column values of a composite identifier
pub const ID_SEPARATOR: &str = "::";

/// Identifier spanning one or more key columns
///
/// `"3::en"` over `[nid, langcode]` is `nid = 3 AND langcode = 'en'`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeId {
    parts: Vec<(String, String)>,
}

impl CompositeId {
    /// Split `raw` on `::`; the part count must match the columns
    pub fn parse(raw: &str, columns: &[String]) -> RestfulResult<Self> {
        let values: Vec<&str> = raw.split(ID_SEPARATOR).collect();
        if values.len() != columns.len() || values.iter().any(|value| value.is_empty()) {
            return Err(RequestError::InvalidIdentifier {
                id: raw.to_string(),
                expected: columns.len(),
            }
            .into());
        }

        Ok(Self {
            parts: columns
                .iter()
                .cloned()
                .zip(values.into_iter().map(str::to_string))
                .collect(),
        })
    }

    /// Identifier of a row; `None` when a key column is empty
    pub fn of_row(row: &Map<String, Value>, columns: &[String]) -> Option<String> {
        let values = columns
            .iter()
            .map(|column| row.get(column).and_then(value_to_id))
            .collect::<Option<Vec<_>>>()?;
        Some(values.join(ID_SEPARATOR))
    }

    /// One equality condition per key column
    pub fn conditions(&self) -> Vec<Condition> {
        self.parts
            .iter()
            .map(|(column, value)| Condition::new(column, Operator::Eq, Value::String(value.clone())))
            .collect()
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().map(|(_, value)| value.as_str())
    }
}

/// Resource backed by one table
///
/// Requires `table` and `id_columns`. Both are checked as SQL identifiers
/// when the provider is built.
pub struct DbQueryDataProvider {
    core: ProviderCore,
    executor: Arc<dyn SqlExecutor>,
    table: String,
    id_columns: Vec<String>,
}

impl DbQueryDataProvider {
    pub fn new(
        core: ProviderCore,
        executor: Arc<dyn SqlExecutor>,
        options: &ProviderOptions,
    ) -> RestfulResult<Self> {
        let resource = core.identity().name.clone();
        let table = check_identifier(options.require(&resource, "table")?)?.to_string();
        let id_columns = options
            .require_list(&resource, "id_columns")?
            .iter()
            .map(|column| check_identifier(column).map(str::to_string))
            .collect::<RestfulResult<Vec<_>>>()?;

        Ok(Self {
            core,
            executor,
            table,
            id_columns,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn column(field: &ResourceField) -> Option<String> {
        field.column_for_query().map(str::to_string)
    }

    fn default_sort(&self) -> Vec<(String, SortDirection)> {
        self.id_columns
            .iter()
            .map(|column| (column.clone(), SortDirection::Asc))
            .collect()
    }

    fn list_query(&self, request: &ResourceRequest, paged: bool) -> RestfulResult<SelectQuery> {
        let mut query = SelectQuery::new(&self.table);
        query.conditions = self.core.filter_groups(request, Self::column)?;

        if paged {
            query.order_by =
                self.core
                    .sort_columns(request, Self::column, self.default_sort())?;
            let pagination = self.core.pagination(request)?;
            query.offset = Some(pagination.offset());
            query.limit = Some(pagination.range);
        }

        Ok(query)
    }

    fn record(&self, row: Map<String, Value>) -> Record {
        Record {
            id: CompositeId::of_row(&row, &self.id_columns),
            source_type: self.table.clone(),
            bundle: None,
            values: row,
        }
    }

    async fn select(&self, query: &SelectQuery) -> RestfulResult<Vec<Record>> {
        debug!(resource = %self.identity(), sql = ?query.to_sql().ok(), "Table query");
        let rows = self
            .executor
            .select(query)
            .await
            .map_err(|e| StorageError::query(BACKEND, e))?;
        Ok(rows.into_iter().map(|row| self.record(row)).collect())
    }

    /// Rows for the given ids, in no particular order
    async fn load(&self, ids: &[String]) -> RestfulResult<Vec<Record>> {
        let parsed = ids
            .iter()
            .map(|id| CompositeId::parse(id, &self.id_columns))
            .collect::<RestfulResult<Vec<_>>>()?;

        if let [column] = self.id_columns.as_slice() {
            let values: Vec<Value> = parsed
                .iter()
                .flat_map(|id| id.values().map(|v| Value::String(v.to_string())))
                .collect();
            let mut query = SelectQuery::new(&self.table);
            query.conditions = vec![ConditionGroup::single(Condition::new(
                column,
                Operator::In,
                Value::Array(values),
            ))];
            return self.select(&query).await;
        }

        let mut records = Vec::with_capacity(parsed.len());
        for id in parsed {
            let mut query = SelectQuery::new(&self.table);
            query.conditions = id
                .conditions()
                .into_iter()
                .map(ConditionGroup::single)
                .collect();
            query.limit = Some(1);
            records.extend(self.select(&query).await?);
        }
        Ok(records)
    }
}

#[async_trait]
impl DataProvider for DbQueryDataProvider {
    fn identity(&self) -> &ResourceIdentity {
        self.core.identity()
    }

    fn fields(&self) -> &ResourceFieldCollection {
        self.core.fields()
    }

    /// Renders the selected page directly instead of selecting twice
    async fn index(&self, request: &ResourceRequest) -> RestfulResult<Vec<RenderedItem>> {
        let query = self.list_query(request, true)?;
        let records = self.select(&query).await?;
        self.core.render_all(&records, request).await
    }

    async fn count(&self, request: &ResourceRequest) -> RestfulResult<usize> {
        let query = self.list_query(request, false)?;
        self.executor
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

        let mut record = Record::new(&self.table);
        self.core.apply_payload(&mut record, values, request).await?;

        let mut row = record.values;
        let serial = self
            .executor
            .insert(&self.table, row.clone())
            .await
            .map_err(|e| StorageError::write(BACKEND, e))?;
        if let (Some(serial), [column]) = (serial, self.id_columns.as_slice()) {
            row.insert(column.clone(), serial);
        }

        let id = CompositeId::of_row(&row, &self.id_columns).ok_or_else(|| {
            RequestError::InvalidValue {
                field: self.id_columns.join(","),
                message: "new rows need a value for every key column".to_string(),
            }
        })?;
        debug!(resource = %self.identity(), id = %id, "Row inserted");
        self.view(&id, request).await
    }

    async fn update(
        &self,
        id: &str,
        payload: &Map<String, Value>,
        replace: bool,
        request: &ResourceRequest,
    ) -> RestfulResult<RenderedItem> {
        let key = CompositeId::parse(id, &self.id_columns)?;
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

        self.executor
            .update(&self.table, &key.conditions(), record.values)
            .await
            .map_err(|e| StorageError::write(BACKEND, e))?;
        self.view(id, request).await
    }

    async fn remove(&self, id: &str, request: &ResourceRequest) -> RestfulResult<()> {
        let key = CompositeId::parse(id, &self.id_columns)?;
        let affected = self
            .executor
            .delete(&self.table, &key.conditions())
            .await
            .map_err(|e| StorageError::write(BACKEND, e))?;
        if affected == 0 {
            return Err(self.core.not_found(id));
        }
        request.set_status(StatusCode::NO_CONTENT);
        Ok(())
    }

    async fn get_index_ids(&self, request: &ResourceRequest) -> RestfulResult<Vec<String>> {
        let query = self.list_query(request, true)?;
        Ok(self
            .select(&query)
            .await?
            .into_iter()
            .filter_map(|record| record.id)
            .collect())
    }

    fn cache_fragments(&self, id: &str) -> Vec<(String, String)> {
        vec![
            ("table".to_string(), self.table.clone()),
            ("column".to_string(), self.id_columns.join(",")),
            ("id".to_string(), id.to_string()),
        ]
    }
}
