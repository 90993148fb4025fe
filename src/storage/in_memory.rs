//! In-memory backends for testing and development
//!
//! Each store counts the calls made to it so callers can check that
//! validation failures never reach the backend.

use crate::core::query::{Condition, ConditionGroup, SortDirection, compare, compare_values, matches};
use crate::core::record::Record;
use crate::core::store::{EntityQuery, ObjectStore, PluginRegistry, SelectQuery, SqlExecutor};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

fn compare_by<'a, F, G>(a: F, b: G, sort: &[(String, SortDirection)]) -> Ordering
where
    F: Fn(&str) -> Option<&'a Value>,
    G: Fn(&str) -> Option<&'a Value>,
{
    for (column, direction) in sort {
        let left = a(column).unwrap_or(&Value::Null);
        let right = b(column).unwrap_or(&Value::Null);
        let ordering = match direction {
            SortDirection::Asc => compare_values(left, right),
            SortDirection::Desc => compare_values(right, left),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn page<T>(items: Vec<T>, offset: usize, limit: Option<usize>) -> Vec<T> {
    let items = items.into_iter().skip(offset);
    match limit {
        Some(limit) => items.take(limit).collect(),
        None => items.collect(),
    }
}

// =============================================================================
// Object store
// =============================================================================

/// In-memory [`ObjectStore`]
///
/// Records are grouped by entity type. New records get sequential numeric
/// ids.
#[derive(Clone, Default)]
pub struct InMemoryObjectStore {
    records: Arc<RwLock<HashMap<String, BTreeMap<String, Record>>>>,
    next_id: Arc<AtomicU64>,
    calls: Arc<AtomicUsize>,
}

/// A stored record with its id as a JSON value, for condition lookups
struct Indexed<'a> {
    record: &'a Record,
    id: Value,
}

impl<'a> Indexed<'a> {
    fn new(record: &'a Record) -> Self {
        Self {
            record,
            id: Value::String(record.id.clone().unwrap_or_default()),
        }
    }

    fn lookup(&self, column: &str) -> Option<&Value> {
        if column == "id" {
            Some(&self.id)
        } else {
            self.record.values.get(column)
        }
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of backend calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
    }

    fn matching(&self, query: &EntityQuery) -> Result<Vec<Record>> {
        let records = self
            .records
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        let Some(of_type) = records.get(&query.entity_type) else {
            return Ok(Vec::new());
        };

        let mut found: Vec<Indexed<'_>> = of_type
            .values()
            .filter(|record| {
                query.bundles.is_empty()
                    || record
                        .bundle
                        .as_ref()
                        .is_some_and(|bundle| query.bundles.contains(bundle))
            })
            .map(Indexed::new)
            .filter(|indexed| {
                query
                    .conditions
                    .iter()
                    .all(|group| matches(group, |column| indexed.lookup(column)))
            })
            .collect();

        found.sort_by(|a, b| {
            compare_by(|c| a.lookup(c), |c| b.lookup(c), &query.sort)
                .then_with(|| compare_values(&a.id, &b.id))
        });

        Ok(found.into_iter().map(|indexed| indexed.record.clone()).collect())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn load_multiple(&self, entity_type: &str, ids: &[String]) -> Result<Vec<Record>> {
        self.touch();
        let records = self
            .records
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        let Some(of_type) = records.get(entity_type) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| of_type.get(id).cloned()).collect())
    }

    async fn query_ids(&self, query: &EntityQuery) -> Result<Vec<String>> {
        self.touch();
        let found = self.matching(query)?;
        let (offset, limit) = match query.range {
            Some((offset, limit)) => (offset, Some(limit)),
            None => (0, None),
        };
        Ok(page(found, offset, limit)
            .into_iter()
            .filter_map(|record| record.id)
            .collect())
    }

    async fn count(&self, query: &EntityQuery) -> Result<usize> {
        self.touch();
        Ok(self.matching(query)?.len())
    }

    async fn save(&self, mut record: Record) -> Result<Record> {
        self.touch();
        let mut records = self
            .records
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let id = match &record.id {
            Some(id) => id.clone(),
            None => (self.next_id.fetch_add(1, AtomicOrdering::SeqCst) + 1).to_string(),
        };
        record.id = Some(id.clone());

        records
            .entry(record.source_type.clone())
            .or_default()
            .insert(id, record.clone());

        Ok(record)
    }

    async fn delete(&self, entity_type: &str, id: &str) -> Result<bool> {
        self.touch();
        let mut records = self
            .records
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        Ok(records
            .get_mut(entity_type)
            .is_some_and(|of_type| of_type.remove(id).is_some()))
    }
}

// =============================================================================
// SQL
// =============================================================================

#[derive(Default)]
struct Table {
    rows: Vec<Map<String, Value>>,
    serial: Option<String>,
    last_serial: u64,
}

/// In-memory [`SqlExecutor`]
///
/// Evaluates [`SelectQuery`] conditions directly and keeps every rendered
/// statement for inspection.
#[derive(Clone, Default)]
pub struct InMemorySqlExecutor {
    tables: Arc<RwLock<HashMap<String, Table>>>,
    statements: Arc<RwLock<Vec<String>>>,
    calls: Arc<AtomicUsize>,
}

fn matches_all(row: &Map<String, Value>, groups: &[ConditionGroup]) -> bool {
    groups
        .iter()
        .all(|group| matches(group, |column| row.get(column)))
}

fn matches_keys(row: &Map<String, Value>, keys: &[Condition]) -> bool {
    keys.iter().all(|key| {
        compare(
            key.operator,
            row.get(&key.column).unwrap_or(&Value::Null),
            &key.value,
        )
    })
}

impl InMemorySqlExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table; `serial` names an auto-increment column
    pub fn with_table(self, table: &str, serial: Option<&str>) -> Self {
        if let Ok(mut tables) = self.tables.write() {
            tables.entry(table.to_string()).or_default().serial = serial.map(str::to_string);
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    /// Rendered SQL of every select and count, oldest first
    pub fn statements(&self) -> Vec<String> {
        self.statements
            .read()
            .map(|statements| statements.clone())
            .unwrap_or_default()
    }

    fn touch(&self) {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
    }

    fn log(&self, sql: String) -> Result<()> {
        tracing::debug!(sql = %sql, "In-memory SQL");
        self.statements
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?
            .push(sql);
        Ok(())
    }

    fn matching(&self, query: &SelectQuery) -> Result<Vec<Map<String, Value>>> {
        let tables = self
            .tables
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        let table = tables
            .get(&query.table)
            .ok_or_else(|| anyhow!("Table '{}' does not exist", query.table))?;

        let mut rows: Vec<&Map<String, Value>> = table
            .rows
            .iter()
            .filter(|row| matches_all(row, &query.conditions))
            .collect();
        rows.sort_by(|a, b| compare_by(|c| a.get(c), |c| b.get(c), &query.order_by));

        Ok(rows.into_iter().cloned().collect())
    }
}

#[async_trait]
impl SqlExecutor for InMemorySqlExecutor {
    async fn select(&self, query: &SelectQuery) -> Result<Vec<Map<String, Value>>> {
        self.touch();
        let (sql, _params) = query.to_sql()?;
        self.log(sql)?;
        let rows = self.matching(query)?;
        Ok(page(rows, query.offset.unwrap_or(0), query.limit))
    }

    async fn count(&self, query: &SelectQuery) -> Result<usize> {
        self.touch();
        let (sql, _params) = query.to_count_sql()?;
        self.log(sql)?;
        Ok(self.matching(query)?.len())
    }

    async fn insert(&self, table: &str, mut row: Map<String, Value>) -> Result<Option<Value>> {
        self.touch();
        let mut tables = self
            .tables
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let table = tables
            .get_mut(table)
            .ok_or_else(|| anyhow!("Table '{}' does not exist", table))?;

        let mut generated = None;
        if let Some(serial) = table.serial.clone() {
            match row.get(&serial).and_then(Value::as_u64) {
                Some(given) => table.last_serial = table.last_serial.max(given),
                None => {
                    table.last_serial += 1;
                    let value = Value::from(table.last_serial);
                    row.insert(serial, value.clone());
                    generated = Some(value);
                }
            }
        }

        table.rows.push(row);
        Ok(generated)
    }

    async fn update(
        &self,
        table: &str,
        keys: &[Condition],
        row: Map<String, Value>,
    ) -> Result<u64> {
        self.touch();
        let mut tables = self
            .tables
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let table = tables
            .get_mut(table)
            .ok_or_else(|| anyhow!("Table '{}' does not exist", table))?;

        let mut affected = 0;
        for existing in table.rows.iter_mut().filter(|r| matches_keys(r, keys)) {
            for (column, value) in &row {
                existing.insert(column.clone(), value.clone());
            }
            affected += 1;
        }
        Ok(affected)
    }

    async fn delete(&self, table: &str, keys: &[Condition]) -> Result<u64> {
        self.touch();
        let mut tables = self
            .tables
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        let table = tables
            .get_mut(table)
            .ok_or_else(|| anyhow!("Table '{}' does not exist", table))?;

        let before = table.rows.len();
        table.rows.retain(|row| !matches_keys(row, keys));
        Ok((before - table.rows.len()) as u64)
    }
}

// =============================================================================
// Plugin registry
// =============================================================================

/// In-memory [`PluginRegistry`]
#[derive(Clone, Default)]
pub struct InMemoryPluginRegistry {
    definitions: Arc<RwLock<BTreeMap<String, Record>>>,
    calls: Arc<AtomicUsize>,
}

impl InMemoryPluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

#[async_trait]
impl PluginRegistry for InMemoryPluginRegistry {
    async fn definitions(&self) -> Result<Vec<Record>> {
        self.touch();
        let definitions = self
            .definitions
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        Ok(definitions.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Record>> {
        self.touch();
        let definitions = self
            .definitions
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        Ok(definitions.get(id).cloned())
    }

    async fn save(&self, record: Record) -> Result<Record> {
        self.touch();
        let id = record
            .id
            .clone()
            .ok_or_else(|| anyhow!("Plugin definitions need an id"))?;

        let mut definitions = self
            .definitions
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        definitions.insert(id, record.clone());
        Ok(record)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        self.touch();
        let mut definitions = self
            .definitions
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;

        Ok(definitions.remove(id).is_some())
    }
}
