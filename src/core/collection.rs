//! Ordered field collections

use crate::core::error::{ConfigError, RequestError, RestfulResult};
use crate::core::field::{FieldDefinition, ResourceField};
use crate::core::query::{ConditionGroup, matches};
use crate::core::record::Record;
use crate::core::store::BackendKind;
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// The public fields of a resource, in declaration order
///
/// At most one field is the identifier field. Collections are immutable once
/// built and shared by every request of the resource.
#[derive(Debug, Clone, Default)]
pub struct ResourceFieldCollection {
    fields: IndexMap<String, ResourceField>,
    id_field: Option<String>,
}

impl ResourceFieldCollection {
    /// Build from fields; public names must be unique
    pub fn new(fields: Vec<ResourceField>, id_field: Option<&str>) -> RestfulResult<Self> {
        let mut map = IndexMap::with_capacity(fields.len());
        for field in fields {
            let name = field.id().to_string();
            if map.insert(name.clone(), field).is_some() {
                return Err(ConfigError::InvalidField {
                    field: name,
                    message: "duplicate public name".to_string(),
                }
                .into());
            }
        }

        if let Some(id) = id_field
            && !map.contains_key(id)
        {
            return Err(ConfigError::InvalidField {
                field: id.to_string(),
                message: "identifier field is not part of the collection".to_string(),
            }
            .into());
        }

        Ok(Self {
            fields: map,
            id_field: id_field.map(str::to_string),
        })
    }

    /// Build from definitions, picking each field's kind for `backend`
    pub fn from_definitions(
        definitions: Vec<FieldDefinition>,
        backend: BackendKind,
        id_field: Option<&str>,
    ) -> RestfulResult<Self> {
        let fields = definitions
            .into_iter()
            .map(|definition| ResourceField::from_definition(definition, backend))
            .collect::<RestfulResult<Vec<_>>>()?;
        Self::new(fields, id_field)
    }

    pub fn get(&self, public_name: &str) -> Option<&ResourceField> {
        self.fields.get(public_name)
    }

    pub fn contains(&self, public_name: &str) -> bool {
        self.fields.contains_key(public_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceField> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The identifier field, if one is declared
    pub fn id_field(&self) -> Option<&ResourceField> {
        self.id_field.as_deref().and_then(|name| self.fields.get(name))
    }

    /// Identifier of a record: the backend id, else the id field's value
    ///
    /// Backends may key records on more than the id field (composite table
    /// keys), so the backend id wins once a record has one.
    pub fn record_id(&self, record: &Record) -> Option<String> {
        record.id.clone().or_else(|| {
            self.id_field()
                .and_then(|field| field.value(record).ok())
                .and_then(|value| value_to_id(&value))
        })
    }

    /// Fields to compute for a sparse selection, in declaration order
    ///
    /// Each entry is a dotted path; only its first segment names a field of
    /// this collection (`author.name` selects `author`). `None` selects
    /// everything. Unknown names are rejected.
    pub fn limit_fields(&self, selection: Option<&[String]>) -> RestfulResult<Vec<&ResourceField>> {
        let Some(selection) = selection else {
            return Ok(self.fields.values().collect());
        };

        let mut wanted: Vec<&str> = Vec::new();
        for path in selection {
            let top = path.split('.').next().unwrap_or(path.as_str());
            if !self.fields.contains_key(top) {
                return Err(RequestError::InvalidValue {
                    field: "fields".to_string(),
                    message: format!("unknown field '{}'", top),
                }
                .into());
            }
            if !wanted.contains(&top) {
                wanted.push(top);
            }
        }

        Ok(self
            .fields
            .values()
            .filter(|field| wanted.contains(&field.id()))
            .collect())
    }

    /// Evaluate ANDed groups against rendered values keyed by public name
    pub fn evaluate_filter(&self, groups: &[ConditionGroup], values: &Map<String, Value>) -> bool {
        groups
            .iter()
            .all(|group| matches(group, |column| values.get(column)))
    }
}

/// Stringify a scalar identifier; `None` for null and structured values
pub fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::{Condition, Operator};
    use serde_json::json;

    fn collection() -> ResourceFieldCollection {
        ResourceFieldCollection::from_definitions(
            vec![
                FieldDefinition::new("id").property("nid"),
                FieldDefinition::new("label").property("title"),
                FieldDefinition::new("author").property("uid"),
                FieldDefinition::new("status").property("status"),
            ],
            BackendKind::Memory,
            Some("id"),
        )
        .unwrap()
    }

    fn names(fields: Vec<&ResourceField>) -> Vec<&str> {
        fields.into_iter().map(ResourceField::id).collect()
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = ResourceFieldCollection::from_definitions(
            vec![
                FieldDefinition::new("label").property("a"),
                FieldDefinition::new("label").property("b"),
            ],
            BackendKind::Memory,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_id_field_rejected() {
        let result = ResourceFieldCollection::from_definitions(
            vec![FieldDefinition::new("label").property("a")],
            BackendKind::Memory,
            Some("id"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_limit_fields_keeps_order_and_parents() {
        let fields = collection();
        let selection = vec!["author.name".to_string(), "id".to_string()];
        assert_eq!(names(fields.limit_fields(Some(&selection)).unwrap()), vec!["id", "author"]);
        assert_eq!(fields.limit_fields(None).unwrap().len(), 4);
    }

    #[test]
    fn test_limit_fields_is_idempotent() {
        let fields = collection();
        let once = vec!["label".to_string()];
        let twice = vec!["label".to_string(), "label".to_string()];
        assert_eq!(
            names(fields.limit_fields(Some(&once)).unwrap()),
            names(fields.limit_fields(Some(&twice)).unwrap())
        );
    }

    #[test]
    fn test_limit_fields_rejects_unknown() {
        let fields = collection();
        let err = fields
            .limit_fields(Some(&["nope".to_string()]))
            .unwrap_err();
        assert!(err.is_bad_request());
    }

    #[test]
    fn test_record_id() {
        let fields = collection();
        let record = Record::from_values("node", json!({ "nid": 12 })).with_id("12::en");
        assert_eq!(fields.record_id(&record), Some("12::en".to_string()));

        let unsaved = Record::from_values("node", json!({ "nid": 12 }));
        assert_eq!(fields.record_id(&unsaved), Some("12".to_string()));

        assert_eq!(fields.record_id(&Record::new("node")), None);
    }

    #[test]
    fn test_evaluate_filter() {
        let fields = collection();
        let values = json!({ "label": "Hello", "status": 1 });
        let values = values.as_object().unwrap();

        let published = [ConditionGroup::single(Condition::new("status", Operator::Eq, json!("1")))];
        assert!(fields.evaluate_filter(&published, values));

        let both = [
            ConditionGroup::single(Condition::new("status", Operator::Eq, json!(1))),
            ConditionGroup::single(Condition::new("label", Operator::StartsWith, json!("X"))),
        ];
        assert!(!fields.evaluate_filter(&both, values));
    }
}
