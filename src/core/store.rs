//! Backend contracts
//!
//! Concrete storage engines live outside this crate. Each adapter in
//! [`crate::storage`] talks to one of these traits, so any engine that
//! implements them can be exposed as a resource:
//!
//! - [`ObjectStore`]: typed objects with bundles (entity-style storage)
//! - [`SqlExecutor`]: relational tables queried through [`SelectQuery`]
//! - [`PluginRegistry`]: a keyed set of definitions held in memory

use crate::core::error::{ConfigError, RestfulResult};
use crate::core::query::{Condition, ConditionGroup, Operator, SortDirection};
use crate::core::record::Record;
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Backend family a resource is stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Entity,
    DbQuery,
    #[serde(alias = "plugin")]
    Memory,
}

// =============================================================================
// Object store
// =============================================================================

/// List query against an object store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityQuery {
    pub entity_type: String,
    /// Restrict to these bundles; empty means all
    pub bundles: Vec<String>,
    /// ANDed groups
    pub conditions: Vec<ConditionGroup>,
    pub sort: Vec<(String, SortDirection)>,
    /// `(offset, limit)`
    pub range: Option<(usize, usize)>,
}

/// Typed object storage
///
/// In conditions and sorts the column `id` names the record identifier.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Load records by id; unknown ids are omitted
    async fn load_multiple(&self, entity_type: &str, ids: &[String]) -> Result<Vec<Record>>;

    /// Ids matching a query, in query order
    async fn query_ids(&self, query: &EntityQuery) -> Result<Vec<String>>;

    /// Number of records matching a query, ignoring sort and range
    async fn count(&self, query: &EntityQuery) -> Result<usize>;

    /// Insert or replace; assigns an id when the record has none
    async fn save(&self, record: Record) -> Result<Record>;

    /// Delete by id; returns whether a record was removed
    async fn delete(&self, entity_type: &str, id: &str) -> Result<bool>;
}

// =============================================================================
// SQL
// =============================================================================

/// Select statement over one table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub table: String,
    /// ANDed groups
    pub conditions: Vec<ConditionGroup>,
    pub order_by: Vec<(String, SortDirection)>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

fn identifier_regex() -> &'static Regex {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").unwrap()
    })
}

/// Reject anything that is not a plain (optionally table-qualified) identifier
pub fn check_identifier(identifier: &str) -> RestfulResult<&str> {
    if identifier_regex().is_match(identifier) {
        Ok(identifier)
    } else {
        Err(ConfigError::Unsupported {
            what: "SQL identifier".to_string(),
            value: identifier.to_string(),
        }
        .into())
    }
}

fn escape_like(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn render_condition(condition: &Condition, params: &mut Vec<Value>) -> RestfulResult<String> {
    let column = check_identifier(&condition.column)?;
    let values = condition.value.as_slice();
    let first = values.first().cloned().unwrap_or(Value::Null);

    let sql = match condition.operator {
        Operator::Eq if first.is_null() => format!("{} IS NULL", column),
        Operator::NotEq if first.is_null() => format!("{} IS NOT NULL", column),
        Operator::In | Operator::NotIn => {
            let placeholders = vec!["?"; values.len()].join(", ");
            params.extend(values.iter().cloned());
            format!("{} {} ({})", column, condition.operator.as_sql(), placeholders)
        }
        Operator::Between => {
            params.extend(values.iter().take(2).cloned());
            format!("{} BETWEEN ? AND ?", column)
        }
        Operator::Contains => {
            params.push(Value::String(format!("%{}%", escape_like(&first))));
            format!("{} LIKE ?", column)
        }
        Operator::StartsWith => {
            params.push(Value::String(format!("{}%", escape_like(&first))));
            format!("{} LIKE ?", column)
        }
        operator => {
            params.push(first);
            format!("{} {} ?", column, operator.as_sql())
        }
    };
    Ok(sql)
}

/// Render a group as a parenthesised expression
pub fn render_group(group: &ConditionGroup, params: &mut Vec<Value>) -> RestfulResult<String> {
    let parts = group
        .conditions
        .iter()
        .map(|condition| render_condition(condition, params))
        .collect::<RestfulResult<Vec<_>>>()?;
    let glue = format!(" {} ", group.conjunction);
    Ok(format!("({})", parts.join(&glue)))
}

impl SelectQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    fn where_clause(&self, params: &mut Vec<Value>) -> RestfulResult<String> {
        let groups = self
            .conditions
            .iter()
            .filter(|group| !group.conditions.is_empty())
            .map(|group| render_group(group, params))
            .collect::<RestfulResult<Vec<_>>>()?;

        if groups.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!(" WHERE {}", groups.join(" AND ")))
        }
    }

    /// Parameterised `SELECT` with `?` placeholders
    pub fn to_sql(&self) -> RestfulResult<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let table = check_identifier(&self.table)?;
        let mut sql = format!("SELECT * FROM {}", table);
        sql.push_str(&self.where_clause(&mut params)?);

        if !self.order_by.is_empty() {
            let order = self
                .order_by
                .iter()
                .map(|(column, direction)| {
                    check_identifier(column).map(|c| format!("{} {}", c, direction.as_sql()))
                })
                .collect::<RestfulResult<Vec<_>>>()?;
            sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        Ok((sql, params))
    }

    /// Parameterised `SELECT COUNT(*)` over the same conditions
    pub fn to_count_sql(&self) -> RestfulResult<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let table = check_identifier(&self.table)?;
        let mut sql = format!("SELECT COUNT(*) FROM {}", table);
        sql.push_str(&self.where_clause(&mut params)?);
        Ok((sql, params))
    }
}

/// Relational table access
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Rows matching a select
    async fn select(&self, query: &SelectQuery) -> Result<Vec<Map<String, Value>>>;

    /// Number of rows matching a select's conditions
    async fn count(&self, query: &SelectQuery) -> Result<usize>;

    /// Insert a row; returns the generated serial key if the table has one
    async fn insert(&self, table: &str, row: Map<String, Value>) -> Result<Option<Value>>;

    /// Update rows matching every key condition; returns affected rows
    async fn update(&self, table: &str, keys: &[Condition], row: Map<String, Value>)
    -> Result<u64>;

    /// Delete rows matching every key condition; returns affected rows
    async fn delete(&self, table: &str, keys: &[Condition]) -> Result<u64>;
}

// =============================================================================
// Plugin registry
// =============================================================================

/// In-process registry of definitions (each a record keyed by id)
#[async_trait]
pub trait PluginRegistry: Send + Sync {
    async fn definitions(&self) -> Result<Vec<Record>>;

    async fn get(&self, id: &str) -> Result<Option<Record>>;

    async fn save(&self, record: Record) -> Result<Record>;

    async fn remove(&self, id: &str) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::Conjunction;
    use serde_json::json;

    #[test]
    fn test_select_sql() {
        let query = SelectQuery {
            table: "articles".to_string(),
            conditions: vec![ConditionGroup::single(Condition::new(
                "status",
                Operator::Gt,
                json!(1),
            ))],
            order_by: vec![("created".to_string(), SortDirection::Desc)],
            offset: Some(20),
            limit: Some(10),
        };

        let (sql, params) = query.to_sql().unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM articles WHERE (status > ?) ORDER BY created DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(params, vec![json!(1)]);

        let (count_sql, count_params) = query.to_count_sql().unwrap();
        assert_eq!(count_sql, "SELECT COUNT(*) FROM articles WHERE (status > ?)");
        assert_eq!(count_params, vec![json!(1)]);
    }

    #[test]
    fn test_grouped_and_multi_value_conditions() {
        let query = SelectQuery {
            table: "t".to_string(),
            conditions: vec![
                ConditionGroup {
                    conjunction: Conjunction::Or,
                    conditions: vec![
                        Condition::new("a", Operator::Contains, json!("x_y")),
                        Condition::new("a", Operator::StartsWith, json!("p")),
                    ],
                },
                ConditionGroup::single(Condition::new("b", Operator::In, json!([1, 2, 3]))),
                ConditionGroup::single(Condition::new("c", Operator::Between, json!([1, 9]))),
                ConditionGroup::single(Condition::new("d", Operator::Eq, Value::Null)),
            ],
            ..Default::default()
        };

        let (sql, params) = query.to_sql().unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM t WHERE (a LIKE ? OR a LIKE ?) AND (b IN (?, ?, ?)) \
             AND (c BETWEEN ? AND ?) AND (d IS NULL)"
        );
        assert_eq!(params[0], json!("%x\\_y%"));
        assert_eq!(params[1], json!("p%"));
        assert_eq!(params.len(), 7);
    }

    #[test]
    fn test_unsafe_identifiers_are_rejected() {
        assert!(check_identifier("node.title").is_ok());
        assert!(check_identifier("title; DROP TABLE x").is_err());
        let query = SelectQuery::new("bad table");
        assert!(query.to_sql().is_err());
    }
}
