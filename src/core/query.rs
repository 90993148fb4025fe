//! Request query parsing and the backend-neutral condition model
//!
//! List requests carry up to four query concerns:
//!
//! ```text
//! GET /articles?filter[status]=1                          shorthand, operator '='
//! GET /articles?filter[status][value]=1&filter[status][operator]=>
//! GET /articles?filter[id][value][]=1&filter[id][value][]=3&filter[id][operator]=IN
//! GET /articles?sort=-created,id                          '-' means DESC
//! GET /articles?page=2&range=10                           offset 10
//! GET /articles?fields=id,author.name                     sparse fieldset
//! ```
//!
//! This module turns those inputs into validated structures ([`FilterItem`],
//! [`SortSpec`], [`Pagination`]) and defines the condition model every
//! adapter translates from ([`Condition`], [`ConditionGroup`]). It also owns
//! the one in-memory evaluator ([`matches`]) shared by backends that cannot
//! filter natively.

use crate::core::error::{RequestError, RestfulResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// Input keys that select or order items rather than shape them
pub const LIST_PARAMS: &[&str] = &["filter", "sort", "page", "range"];

// =============================================================================
// OneOrMany
// =============================================================================

/// A value that is either a single item or a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Single(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn is_many(&self) -> bool {
        matches!(self, OneOrMany::Many(_))
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Single(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::Single(item) => std::slice::from_ref(item),
            OneOrMany::Many(items) => items,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl OneOrMany<Value> {
    /// Arrays become `Many`, everything else `Single`
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => OneOrMany::Many(items),
            other => OneOrMany::Single(other),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            OneOrMany::Single(value) => value,
            OneOrMany::Many(items) => Value::Array(items),
        }
    }
}

// =============================================================================
// Operators & conjunctions
// =============================================================================

/// Filter operators accepted from requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Between,
    Contains,
    StartsWith,
}

impl Operator {
    /// Parse a request operator, case-insensitively
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_uppercase();
        let operator = match normalized.as_str() {
            "=" => Operator::Eq,
            "!=" | "<>" => Operator::NotEq,
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            "IN" => Operator::In,
            "NOT IN" => Operator::NotIn,
            "BETWEEN" => Operator::Between,
            "CONTAINS" => Operator::Contains,
            "STARTS_WITH" => Operator::StartsWith,
            _ => return None,
        };
        Some(operator)
    }

    /// Operators whose value is a whole list passed as one condition
    pub fn is_multi_value(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn | Operator::Between)
    }

    /// SQL rendering of the operator
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Between => "BETWEEN",
            Operator::Contains | Operator::StartsWith => "LIKE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operator::Contains => "CONTAINS",
            Operator::StartsWith => "STARTS_WITH",
            other => other.as_sql(),
        };
        write!(f, "{}", label)
    }
}

/// How the conditions of one filter item combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conjunction {
    #[default]
    And,
    Or,
}

impl Conjunction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "AND" => Some(Conjunction::And),
            "OR" => Some(Conjunction::Or),
            _ => None,
        }
    }
}

impl fmt::Display for Conjunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conjunction::And => write!(f, "AND"),
            Conjunction::Or => write!(f, "OR"),
        }
    }
}

// =============================================================================
// Filters
// =============================================================================

/// One parsed filter entry
///
/// `operators` and `values` are parallel: condition `i` is
/// `public_field operators[i] values[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterItem {
    pub public_field: String,
    pub operators: Vec<Operator>,
    pub values: Vec<OneOrMany<Value>>,
    pub conjunction: Conjunction,
}

impl FilterItem {
    /// Shorthand `filter[field]=value`
    pub fn equals(public_field: impl Into<String>, value: Value) -> Self {
        Self {
            public_field: public_field.into(),
            operators: vec![Operator::Eq],
            values: vec![OneOrMany::Single(value)],
            conjunction: Conjunction::And,
        }
    }

    /// Translate into a grouped condition on a backend column
    pub fn to_group(&self, column: &str) -> ConditionGroup {
        let conditions = self
            .operators
            .iter()
            .zip(self.values.iter())
            .map(|(operator, value)| Condition {
                column: column.to_string(),
                operator: *operator,
                value: value.clone(),
            })
            .collect();

        ConditionGroup {
            conjunction: self.conjunction,
            conditions,
        }
    }
}

/// Parse the `filter` input
///
/// Accepts the shorthand (`{"status": 1}`) and verbose
/// (`{"status": {"value": 1, "operator": ">"}}`) forms.
pub fn parse_filters(input: Option<&Value>) -> RestfulResult<Vec<FilterItem>> {
    let Some(input) = input else {
        return Ok(Vec::new());
    };

    let Value::Object(entries) = input else {
        return Err(RequestError::InvalidFilter {
            field: "filter".to_string(),
            message: "filter must be keyed by field name".to_string(),
        }
        .into());
    };

    entries
        .iter()
        .map(|(field, spec)| parse_filter_item(field, spec))
        .collect()
}

fn parse_filter_item(field: &str, spec: &Value) -> RestfulResult<FilterItem> {
    let (value, operator, conjunction) = match spec {
        Value::Object(verbose) => {
            let value = verbose.get("value").cloned().ok_or_else(|| {
                RequestError::InvalidFilter {
                    field: field.to_string(),
                    message: "missing 'value'".to_string(),
                }
            })?;
            (
                value,
                verbose.get("operator").cloned(),
                verbose.get("conjunction").cloned(),
            )
        }
        Value::Array(_) => (spec.clone(), Some(Value::from("IN")), None),
        scalar => (scalar.clone(), None, None),
    };

    let conjunction = match conjunction {
        None | Some(Value::Null) => Conjunction::And,
        Some(Value::String(raw)) => {
            Conjunction::parse(&raw).ok_or_else(|| RequestError::InvalidConjunction {
                field: field.to_string(),
                conjunction: raw.clone(),
            })?
        }
        Some(other) => {
            return Err(RequestError::InvalidConjunction {
                field: field.to_string(),
                conjunction: other.to_string(),
            }
            .into());
        }
    };

    let operators = match operator {
        None | Some(Value::Null) => vec![Operator::Eq],
        Some(Value::Array(raw)) => raw
            .iter()
            .map(|op| parse_operator(field, op))
            .collect::<RestfulResult<Vec<_>>>()?,
        Some(op) => vec![parse_operator(field, &op)?],
    };

    let values = pair_values(field, &operators, value)?;
    let operators = if operators.len() == 1 && values.len() > 1 {
        vec![operators[0]; values.len()]
    } else {
        operators
    };

    for (operator, value) in operators.iter().zip(values.iter()) {
        if *operator == Operator::Between && value.len() != 2 {
            return Err(RequestError::InvalidFilter {
                field: field.to_string(),
                message: "BETWEEN needs exactly two values".to_string(),
            }
            .into());
        }
        if operator.is_multi_value() && value.is_empty() {
            return Err(RequestError::InvalidFilter {
                field: field.to_string(),
                message: format!("{} needs at least one value", operator),
            }
            .into());
        }
    }

    Ok(FilterItem {
        public_field: field.to_string(),
        operators,
        values,
        conjunction,
    })
}

fn parse_operator(field: &str, raw: &Value) -> RestfulResult<Operator> {
    raw.as_str().and_then(Operator::parse).ok_or_else(|| {
        RequestError::InvalidOperator {
            field: field.to_string(),
            operator: raw.as_str().map_or_else(|| raw.to_string(), str::to_string),
        }
        .into()
    })
}

/// Line values up with operators
///
/// - one multi-value operator: the whole list is one value
/// - one scalar operator and a list: the operator repeats per value
/// - several operators: the list must have the same length
fn pair_values(
    field: &str,
    operators: &[Operator],
    value: Value,
) -> RestfulResult<Vec<OneOrMany<Value>>> {
    if operators.len() == 1 {
        if operators[0].is_multi_value() {
            return Ok(vec![OneOrMany::Many(OneOrMany::from_value(value).into_vec())]);
        }
        return Ok(match value {
            Value::Array(items) if !items.is_empty() => {
                items.into_iter().map(OneOrMany::Single).collect()
            }
            other => vec![OneOrMany::Single(other)],
        });
    }

    let Value::Array(items) = value else {
        return Err(RequestError::InvalidFilter {
            field: field.to_string(),
            message: "several operators need a list of values".to_string(),
        }
        .into());
    };

    if items.len() != operators.len() {
        return Err(RequestError::InvalidFilter {
            field: field.to_string(),
            message: format!(
                "{} operator(s) but {} value(s)",
                operators.len(),
                items.len()
            ),
        }
        .into());
    }

    Ok(operators
        .iter()
        .zip(items)
        .map(|(operator, item)| {
            if operator.is_multi_value() {
                OneOrMany::Many(OneOrMany::from_value(item).into_vec())
            } else {
                OneOrMany::Single(item)
            }
        })
        .collect())
}

// =============================================================================
// Condition model
// =============================================================================

/// A single backend-neutral condition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub value: OneOrMany<Value>,
}

impl Condition {
    pub fn new(column: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            column: column.into(),
            operator,
            value: if operator.is_multi_value() {
                OneOrMany::Many(OneOrMany::from_value(value).into_vec())
            } else {
                OneOrMany::Single(value)
            },
        }
    }
}

/// Conditions combined by one conjunction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionGroup {
    pub conjunction: Conjunction,
    pub conditions: Vec<Condition>,
}

impl ConditionGroup {
    /// A group holding a single condition
    pub fn single(condition: Condition) -> Self {
        Self {
            conjunction: Conjunction::And,
            conditions: vec![condition],
        }
    }
}

/// Evaluate a group against a record
///
/// `lookup` returns the record's value for a column. Groups are ANDed by the
/// caller; inside a group the conjunction decides.
pub fn matches<'a, F>(group: &ConditionGroup, lookup: F) -> bool
where
    F: Fn(&str) -> Option<&'a Value>,
{
    let mut results = group.conditions.iter().map(|condition| {
        let actual = lookup(&condition.column).unwrap_or(&Value::Null);
        compare(condition.operator, actual, &condition.value)
    });

    match group.conjunction {
        Conjunction::And => results.all(|r| r),
        Conjunction::Or => results.any(|r| r),
    }
}

/// Compare one record value against a condition value
///
/// A list-valued record matches when any of its entries matches.
pub fn compare(operator: Operator, actual: &Value, expected: &OneOrMany<Value>) -> bool {
    if let Value::Array(items) = actual {
        return match operator {
            Operator::NotEq | Operator::NotIn => {
                items.iter().all(|item| compare(operator, item, expected))
            }
            _ => items.iter().any(|item| compare(operator, item, expected)),
        };
    }

    let expected = expected.as_slice();
    let first = expected.first().unwrap_or(&Value::Null);

    match operator {
        Operator::Eq => loosely_equal(actual, first),
        Operator::NotEq => !loosely_equal(actual, first),
        Operator::Gt => !actual.is_null() && compare_values(actual, first) == Ordering::Greater,
        Operator::Gte => !actual.is_null() && compare_values(actual, first) != Ordering::Less,
        Operator::Lt => !actual.is_null() && compare_values(actual, first) == Ordering::Less,
        Operator::Lte => !actual.is_null() && compare_values(actual, first) != Ordering::Greater,
        Operator::In => expected.iter().any(|v| loosely_equal(actual, v)),
        Operator::NotIn => !expected.iter().any(|v| loosely_equal(actual, v)),
        Operator::Between => match expected {
            [low, high] => {
                !actual.is_null()
                    && compare_values(actual, low) != Ordering::Less
                    && compare_values(actual, high) != Ordering::Greater
            }
            _ => false,
        },
        Operator::Contains => match (as_text(actual), as_text(first)) {
            (Some(haystack), Some(needle)) => haystack.contains(needle.as_str()),
            _ => false,
        },
        Operator::StartsWith => match (as_text(actual), as_text(first)) {
            (Some(haystack), Some(prefix)) => haystack.starts_with(prefix.as_str()),
            _ => false,
        },
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Equality that treats `1` and `"1"` as the same value
pub fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => as_text(a) == as_text(b),
        },
    }
}

/// Total order over JSON scalars: nulls first, numbers numerically, text
/// lexically
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => as_text(a)
                .unwrap_or_else(|| a.to_string())
                .cmp(&as_text(b).unwrap_or_else(|| b.to_string())),
        },
    }
}

// =============================================================================
// Sort
// =============================================================================

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Ordered mapping of public field to direction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortSpec(pub IndexMap<String, SortDirection>);

impl SortSpec {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SortDirection)> {
        self.0.iter()
    }

    pub fn push(&mut self, field: impl Into<String>, direction: SortDirection) {
        self.0.entry(field.into()).or_insert(direction);
    }
}

/// Parse `sort=-name,id` into `{name: DESC, id: ASC}`
pub fn parse_sort(raw: &str) -> RestfulResult<SortSpec> {
    let mut spec = SortSpec::default();

    for segment in raw.split(',') {
        let segment = segment.trim();
        let (field, direction) = match segment.strip_prefix('-') {
            Some(field) => (field.trim(), SortDirection::Desc),
            None => (segment, SortDirection::Asc),
        };
        if field.is_empty() {
            return Err(RequestError::InvalidSort {
                message: format!("empty sort key in '{}'", raw),
            }
            .into());
        }
        spec.push(field, direction);
    }

    Ok(spec)
}

// =============================================================================
// Pagination
// =============================================================================

/// Page number and page size of a list request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub range: usize,
}

impl Pagination {
    /// Read `page` and `range` from the input
    ///
    /// Both must be positive integers when present. `max_range` caps the
    /// range silently and never raises it.
    pub fn from_input(
        input: &Map<String, Value>,
        default_range: usize,
        max_range: Option<usize>,
    ) -> RestfulResult<Self> {
        let page = match input.get("page") {
            Some(raw) => positive_integer("page", raw)?,
            None => 1,
        };
        let range = match input.get("range") {
            Some(raw) => positive_integer("range", raw)?,
            None => default_range.max(1),
        };
        let range = match max_range {
            Some(max) if max > 0 => range.min(max),
            _ => range,
        };

        // The offset must fit in a usize
        if (page - 1).checked_mul(range).is_none() {
            return Err(RequestError::InvalidPagination {
                param: "page".to_string(),
                value: page.to_string(),
            }
            .into());
        }

        Ok(Self { page, range })
    }

    /// Number of items skipped before this page
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.range)
    }
}

fn positive_integer(param: &str, raw: &Value) -> RestfulResult<usize> {
    let parsed = match raw {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    };

    match parsed {
        Some(n) if n > 0 => Ok(n),
        _ => Err(RequestError::InvalidPagination {
            param: param.to_string(),
            value: raw.as_str().map_or_else(|| raw.to_string(), str::to_string),
        }
        .into()),
    }
}

/// Pagination metadata for list responses
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PaginationMeta {
    /// Current page number (starts at 1)
    pub page: usize,

    /// Number of items per page
    pub range: usize,

    /// Total number of items (after filters)
    pub total: usize,

    /// Total number of pages
    pub total_pages: usize,

    /// Whether there is a next page
    pub has_next: bool,

    /// Whether there is a previous page
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(pagination: Pagination, total: usize) -> Self {
        let range = pagination.range.max(1);
        let total_pages = if total == 0 { 0 } else { total.div_ceil(range) };

        Self {
            page: pagination.page,
            range,
            total,
            total_pages,
            has_next: pagination.offset().saturating_add(range) < total,
            has_prev: pagination.page > 1,
        }
    }
}

// =============================================================================
// Field lists
// =============================================================================

/// Parse a `fields`/`include` value into a de-duplicated list
///
/// Accepts a comma-separated string or a list of strings.
pub fn parse_field_list(raw: &Value) -> Vec<String> {
    let parts: Vec<String> = match raw {
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };

    let mut fields: Vec<String> = Vec::new();
    for part in parts {
        let part = part.trim();
        if !part.is_empty() && !fields.iter().any(|f| f == part) {
            fields.push(part.to_string());
        }
    }
    fields
}
