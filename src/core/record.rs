//! Raw backend records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A record as a backend returns it, before field mapping
///
/// `source_type` is the backend's own type name (entity type, table name,
/// plugin kind) and `bundle` its optional sub-type. Both travel into
/// embedding metadata so a formatter can tell where an embedded value came
/// from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    /// Backend identifier, `None` until first saved
    pub id: Option<String>,

    pub source_type: String,

    pub bundle: Option<String>,

    pub values: Map<String, Value>,
}

impl Record {
    pub fn new(source_type: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_bundle(mut self, bundle: impl Into<String>) -> Self {
        self.bundle = Some(bundle.into());
        self
    }

    pub fn with_value(mut self, property: impl Into<String>, value: Value) -> Self {
        self.values.insert(property.into(), value);
        self
    }

    /// Build a record from a JSON object; non-objects give an empty record
    pub fn from_values(source_type: impl Into<String>, values: Value) -> Self {
        let values = match values {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            values,
            ..Self::new(source_type)
        }
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }

    /// Follow a path of nested object keys
    pub fn get_path(&self, property: &str, path: &[&str]) -> Option<&Value> {
        let mut current = self.values.get(property)?;
        for key in path {
            current = current.as_object()?.get(*key)?;
        }
        Some(current)
    }

    pub fn set(&mut self, property: impl Into<String>, value: Value) {
        self.values.insert(property.into(), value);
    }

    /// Write into a nested object path, creating objects on the way
    pub fn set_path(&mut self, property: &str, path: &[&str], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            self.set(property, value);
            return;
        };

        let mut current = self
            .values
            .entry(property.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        for key in parents {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            let Value::Object(object) = current else {
                return;
            };
            current = object
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        if let Some(object) = current.as_object_mut() {
            object.insert(last.to_string(), value);
        }
    }
}
