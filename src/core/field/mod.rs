//! Resource fields
//!
//! A [`ResourceField`] maps one public attribute of a resource to its source
//! in a backend record, together with the rules that decide when the field is
//! present (methods, access voters) and how its value is post-processed.
//!
//! Fields come in a few kinds, picked once from the declared definition by
//! [`ResourceField::from_definition`]:
//!
//! | Declared | Kind |
//! |---|---|
//! | callback, no property | [`FieldKind::Computed`] |
//! | `column`, or a property on a relational backend | [`FieldKind::DbColumn`] |
//! | `sub_property`, or a property on an object store | [`FieldKind::EntityAttribute`] |
//! | anything else | [`FieldKind::KeyValue`] |
//! | any of the above plus `resource` | [`FieldKind::Reference`] wrapping it |

pub mod access;
pub mod process;

use crate::core::account::Account;
use crate::core::error::{ConfigError, RestfulError, RestfulResult};
use crate::core::record::Record;
use crate::core::request::ResourceRequest;
use crate::core::store::BackendKind;
use crate::embed::{EmbedDescriptor, ReferenceResolver};
use access::{AccessContext, AccessOperation, AccessVoter, check_access};
use axum::http::Method;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Computes a field value from a record
pub type ValueCallback = Arc<dyn Fn(&Record) -> anyhow::Result<Value> + Send + Sync>;

/// Writes a value for a computed field
pub type SetCallback = Arc<dyn Fn(Value, &mut Record) -> anyhow::Result<()> + Send + Sync>;

/// Transforms a value after it is read
pub type ProcessCallback = Arc<dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync>;

/// How many values a field holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Cardinality {
    #[default]
    Single,
    Many,
}

/// Target of a field that embeds another resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceReference {
    pub name: String,
    /// `None` resolves to the latest registered version
    pub major: Option<u32>,
    pub minor: Option<u32>,
    /// When false only the raw identifier is rendered
    pub full_view: bool,
    /// Method for the sub-request; the parent's when `None`
    pub method: Option<Method>,
}

impl ResourceReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            major: None,
            minor: None,
            full_view: true,
            method: None,
        }
    }

    pub fn version(mut self, major: u32, minor: u32) -> Self {
        self.major = Some(major);
        self.minor = Some(minor);
        self
    }

    pub fn full_view(mut self, full_view: bool) -> Self {
        self.full_view = full_view;
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }
}

/// The kind of a field, decided at construction
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Value produced by a callback only
    Computed,
    /// Value read straight off the record
    KeyValue,
    /// Relational column; `column` overrides the property for queries
    DbColumn { column: Option<String> },
    /// Object-store attribute with an optional nested path (`body.value`)
    EntityAttribute { sub_property: Option<String> },
    /// Embeds another resource; `base` reads the raw identifier(s)
    Reference {
        target: ResourceReference,
        base: Box<FieldKind>,
    },
}

/// Declared configuration of a field, before a kind is picked
#[derive(Clone, Default)]
pub struct FieldDefinition {
    pub public_name: String,
    pub property: Option<String>,
    pub sub_property: Option<String>,
    pub column: Option<String>,
    pub callback: Option<ValueCallback>,
    pub setter: Option<SetCallback>,
    pub process_callbacks: Vec<ProcessCallback>,
    pub access_callbacks: Vec<AccessVoter>,
    pub methods: Vec<Method>,
    pub resource: Option<ResourceReference>,
    pub cardinality: Cardinality,
}

impl FieldDefinition {
    pub fn new(public_name: impl Into<String>) -> Self {
        Self {
            public_name: public_name.into(),
            ..Default::default()
        }
    }

    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn sub_property(mut self, sub_property: impl Into<String>) -> Self {
        self.sub_property = Some(sub_property.into());
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn callback<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(f));
        self
    }

    pub fn setter<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, &mut Record) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(f));
        self
    }

    pub fn process<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.process_callbacks.push(Arc::new(f));
        self
    }

    pub fn access(mut self, voter: AccessVoter) -> Self {
        self.access_callbacks.push(voter);
        self
    }

    pub fn methods(mut self, methods: &[Method]) -> Self {
        self.methods = methods.to_vec();
        self
    }

    pub fn resource(mut self, reference: ResourceReference) -> Self {
        self.resource = Some(reference);
        self
    }

    pub fn many(mut self) -> Self {
        self.cardinality = Cardinality::Many;
        self
    }
}

fn public_name_regex() -> &'static Regex {
    static PUBLIC_NAME: OnceLock<Regex> = OnceLock::new();
    PUBLIC_NAME.get_or_init(|| {
        // '.' and ',' are reserved by sparse fieldsets
        Regex::new(r"^[A-Za-z0-9_\-]+$").unwrap()
    })
}

/// Rendered value of one field plus the embeds it produced
#[derive(Debug, Clone, PartialEq)]
pub struct FieldOutput {
    pub value: Value,
    pub embedded: Vec<EmbedDescriptor>,
}

/// A public field of a resource
#[derive(Clone)]
pub struct ResourceField {
    public_name: String,
    kind: FieldKind,
    property: Option<String>,
    callback: Option<ValueCallback>,
    setter: Option<SetCallback>,
    process_callbacks: Vec<ProcessCallback>,
    access_callbacks: Vec<AccessVoter>,
    methods: Vec<Method>,
    cardinality: Cardinality,
}

impl ResourceField {
    /// Build a field, picking its kind from what the definition declares
    pub fn from_definition(
        definition: FieldDefinition,
        backend: BackendKind,
    ) -> RestfulResult<Self> {
        let invalid = |message: &str| -> RestfulError {
            ConfigError::InvalidField {
                field: definition.public_name.clone(),
                message: message.to_string(),
            }
            .into()
        };

        if !public_name_regex().is_match(&definition.public_name) {
            return Err(invalid("public name must be non-empty and use [A-Za-z0-9_-]"));
        }
        if definition.property.is_none()
            && (definition.column.is_some() || definition.sub_property.is_some())
        {
            return Err(invalid("'column' and 'sub_property' need a 'property'"));
        }

        let base = match (
            definition.callback.is_some(),
            definition.property.is_some(),
            &definition.column,
            &definition.sub_property,
            backend,
        ) {
            (true, false, ..) => FieldKind::Computed,
            (_, _, Some(column), _, _) => FieldKind::DbColumn {
                column: Some(column.clone()),
            },
            (_, _, None, Some(sub_property), _) => FieldKind::EntityAttribute {
                sub_property: Some(sub_property.clone()),
            },
            (_, true, None, None, BackendKind::DbQuery) => FieldKind::DbColumn { column: None },
            (_, true, None, None, BackendKind::Entity) => {
                FieldKind::EntityAttribute { sub_property: None }
            }
            _ => FieldKind::KeyValue,
        };

        let kind = match definition.resource {
            Some(target) => FieldKind::Reference {
                target,
                base: Box::new(base),
            },
            None => base,
        };

        Ok(Self {
            public_name: definition.public_name,
            kind,
            property: definition.property,
            callback: definition.callback,
            setter: definition.setter,
            process_callbacks: definition.process_callbacks,
            access_callbacks: definition.access_callbacks,
            methods: definition.methods,
            cardinality: definition.cardinality,
        })
    }

    /// Public name of the field
    pub fn id(&self) -> &str {
        &self.public_name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn property(&self) -> Option<&str> {
        self.property.as_deref()
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Kind of the field with any reference wrapper peeled off
    pub fn base_kind(&self) -> &FieldKind {
        match &self.kind {
            FieldKind::Reference { base, .. } => base,
            other => other,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self.base_kind(), FieldKind::Computed)
    }

    /// Target resource when the field embeds one
    pub fn reference(&self) -> Option<&ResourceReference> {
        match &self.kind {
            FieldKind::Reference { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Computed fields accept writes only through a setter
    pub fn is_writable(&self) -> bool {
        !self.is_computed() || self.setter.is_some()
    }

    /// Name used when the field takes part in a backend filter or sort
    pub fn column_for_query(&self) -> Option<&str> {
        match self.base_kind() {
            FieldKind::Computed => None,
            FieldKind::DbColumn {
                column: Some(column),
            } => Some(column),
            _ => self.property.as_deref(),
        }
    }

    /// Whether the field exists for the active method
    pub fn applies_to(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    /// Run the access voters
    pub fn access(
        &self,
        operation: AccessOperation,
        account: &Account,
        method: &Method,
        record: Option<&Record>,
    ) -> bool {
        let context = AccessContext {
            operation,
            account,
            method,
            record,
        };
        check_access(&self.access_callbacks, &context)
    }

    /// Read the plain value: callback first, then the backing property
    ///
    /// For reference fields this is the raw identifier(s), before any
    /// embedding. A field with neither callback nor property gives `null`.
    pub fn value(&self, record: &Record) -> RestfulResult<Value> {
        if let Some(callback) = &self.callback {
            return callback(record).map_err(|e| self.callback_error(e));
        }

        let Some(property) = self.property.as_deref() else {
            return Ok(Value::Null);
        };

        let value = match self.base_kind() {
            FieldKind::Computed => None,
            FieldKind::EntityAttribute {
                sub_property: Some(path),
            } => {
                let path: Vec<&str> = path.split('.').collect();
                record.get_path(property, &path)
            }
            _ => record.get(property),
        };

        Ok(value.cloned().unwrap_or(Value::Null))
    }

    /// Render the field for output
    ///
    /// Reference fields with no value from their callback resolve the raw
    /// identifier(s) through the reference resolver. Process callbacks run on
    /// non-null results.
    pub async fn render(
        &self,
        record: &Record,
        request: &ResourceRequest,
        parent_resource: &str,
    ) -> RestfulResult<FieldOutput> {
        let mut embedded = Vec::new();

        let value = match &self.kind {
            FieldKind::Reference { target, .. } => {
                let decorated = match &self.callback {
                    Some(callback) => callback(record).map_err(|e| self.callback_error(e))?,
                    None => Value::Null,
                };

                if !decorated.is_null() {
                    decorated
                } else {
                    let raw = self.raw_reference(record);
                    let resolved = ReferenceResolver::new(request)
                        .resolve_read(self, target, raw, record, parent_resource)
                        .await?;
                    embedded = resolved.embedded;
                    resolved.value
                }
            }
            _ => self.value(record)?,
        };

        let value = self.process(value)?;
        Ok(FieldOutput { value, embedded })
    }

    /// Raw identifier(s) stored under the property, ignoring the callback
    fn raw_reference(&self, record: &Record) -> Value {
        let Some(property) = self.property.as_deref() else {
            return Value::Null;
        };
        let value = match self.base_kind() {
            FieldKind::EntityAttribute {
                sub_property: Some(path),
            } => {
                let path: Vec<&str> = path.split('.').collect();
                record.get_path(property, &path)
            }
            _ => record.get(property),
        };
        value.cloned().unwrap_or(Value::Null)
    }

    /// Apply process callbacks in order
    pub fn process(&self, value: Value) -> RestfulResult<Value> {
        if value.is_null() {
            return Ok(value);
        }
        self.process_callbacks
            .iter()
            .try_fold(value, |value, callback| {
                callback(value).map_err(|e| self.callback_error(e))
            })
    }

    /// Write a value into the record
    ///
    /// Computed fields without a setter ignore writes.
    pub fn set(&self, value: Value, record: &mut Record) -> RestfulResult<()> {
        if let Some(setter) = &self.setter {
            return setter(value, record).map_err(|e| self.callback_error(e));
        }

        let Some(property) = self.property.as_deref() else {
            return Ok(());
        };

        match self.base_kind() {
            FieldKind::Computed => {}
            FieldKind::EntityAttribute {
                sub_property: Some(path),
            } => {
                let path: Vec<&str> = path.split('.').collect();
                record.set_path(property, &path, value);
            }
            _ => record.set(property, value),
        }
        Ok(())
    }

    fn callback_error(&self, err: anyhow::Error) -> RestfulError {
        crate::core::error::RequestError::InvalidValue {
            field: self.public_name.clone(),
            message: err.to_string(),
        }
        .into()
    }
}

impl fmt::Debug for ResourceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceField")
            .field("public_name", &self.public_name)
            .field("kind", &self.kind)
            .field("property", &self.property)
            .field("methods", &self.methods)
            .field("access_callbacks", &self.access_callbacks)
            .field("cardinality", &self.cardinality)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(definition: FieldDefinition, backend: BackendKind) -> ResourceField {
        ResourceField::from_definition(definition, backend).unwrap()
    }

    #[test]
    fn test_factory_picks_kinds() {
        let computed = field(
            FieldDefinition::new("label").callback(|_| Ok(json!("x"))),
            BackendKind::Memory,
        );
        assert_eq!(computed.kind(), &FieldKind::Computed);
        assert!(computed.is_computed());
        assert!(!computed.is_writable());

        let key_value = field(FieldDefinition::new("name").property("name"), BackendKind::Memory);
        assert_eq!(key_value.kind(), &FieldKind::KeyValue);

        let column = field(FieldDefinition::new("name").property("title"), BackendKind::DbQuery);
        assert_eq!(column.kind(), &FieldKind::DbColumn { column: None });

        let attribute = field(
            FieldDefinition::new("body").property("body").sub_property("value"),
            BackendKind::Memory,
        );
        assert_eq!(
            attribute.kind(),
            &FieldKind::EntityAttribute {
                sub_property: Some("value".to_string())
            }
        );

        let reference = field(
            FieldDefinition::new("author")
                .property("uid")
                .resource(ResourceReference::new("users")),
            BackendKind::Entity,
        );
        assert!(matches!(reference.kind(), FieldKind::Reference { .. }));
        assert_eq!(
            reference.base_kind(),
            &FieldKind::EntityAttribute { sub_property: None }
        );
    }

    #[test]
    fn test_factory_rejects_bad_definitions() {
        assert!(ResourceField::from_definition(FieldDefinition::new(""), BackendKind::Memory).is_err());
        assert!(
            ResourceField::from_definition(FieldDefinition::new("a.b"), BackendKind::Memory)
                .is_err()
        );
        assert!(
            ResourceField::from_definition(
                FieldDefinition::new("x").column("x_col"),
                BackendKind::DbQuery
            )
            .is_err()
        );
    }

    #[test]
    fn test_column_for_query() {
        let renamed = field(
            FieldDefinition::new("label").property("title").column("node_title"),
            BackendKind::DbQuery,
        );
        assert_eq!(renamed.column_for_query(), Some("node_title"));

        let plain = field(FieldDefinition::new("label").property("title"), BackendKind::DbQuery);
        assert_eq!(plain.column_for_query(), Some("title"));

        let computed = field(
            FieldDefinition::new("label").callback(|_| Ok(Value::Null)),
            BackendKind::DbQuery,
        );
        assert_eq!(computed.column_for_query(), None);
    }

    #[test]
    fn test_value_sources() {
        let record = Record::from_values("node", json!({ "title": "Hello", "body": { "value": "B" } }));

        let plain = field(FieldDefinition::new("label").property("title"), BackendKind::Memory);
        assert_eq!(plain.value(&record).unwrap(), json!("Hello"));

        let nested = field(
            FieldDefinition::new("body").property("body").sub_property("value"),
            BackendKind::Entity,
        );
        assert_eq!(nested.value(&record).unwrap(), json!("B"));

        let computed = field(
            FieldDefinition::new("shout").callback(|r| {
                Ok(json!(r.get("title").and_then(Value::as_str).unwrap_or("").to_uppercase()))
            }),
            BackendKind::Memory,
        );
        assert_eq!(computed.value(&record).unwrap(), json!("HELLO"));

        let missing = field(FieldDefinition::new("gone").property("gone"), BackendKind::Memory);
        assert_eq!(missing.value(&record).unwrap(), Value::Null);
    }

    #[test]
    fn test_field_without_source_is_null() {
        let record = Record::from_values("node", json!({ "nothing": 1 }));
        let empty = field(FieldDefinition::new("nothing"), BackendKind::Memory);
        assert_eq!(empty.value(&record).unwrap(), Value::Null);
    }

    #[test]
    fn test_process_callbacks_run_in_order() {
        let f = field(
            FieldDefinition::new("name")
                .property("name")
                .process(process::trim())
                .process(process::uppercase()),
            BackendKind::Memory,
        );
        assert_eq!(f.process(json!("  bob ")).unwrap(), json!("BOB"));
        assert_eq!(f.process(Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_set_writes_property_or_path() {
        let mut record = Record::new("node");

        let plain = field(FieldDefinition::new("label").property("title"), BackendKind::Memory);
        plain.set(json!("New"), &mut record).unwrap();
        assert_eq!(record.get("title"), Some(&json!("New")));

        let nested = field(
            FieldDefinition::new("body").property("body").sub_property("value"),
            BackendKind::Entity,
        );
        nested.set(json!("Text"), &mut record).unwrap();
        assert_eq!(record.get("body"), Some(&json!({ "value": "Text" })));

        let computed = field(
            FieldDefinition::new("label2").callback(|_| Ok(Value::Null)),
            BackendKind::Memory,
        );
        computed.set(json!("ignored"), &mut record).unwrap();
        assert_eq!(record.values.len(), 2);
    }

    #[test]
    fn test_methods_allow_list() {
        let password = field(
            FieldDefinition::new("password")
                .property("pass")
                .methods(&[Method::POST, Method::PATCH]),
            BackendKind::Memory,
        );
        assert!(!password.applies_to(&Method::GET));
        assert!(password.applies_to(&Method::POST));

        let everywhere = field(FieldDefinition::new("name").property("name"), BackendKind::Memory);
        assert!(everywhere.applies_to(&Method::DELETE));
    }

    #[test]
    fn test_access_voters() {
        let secret = field(
            FieldDefinition::new("secret")
                .property("secret")
                .access(AccessVoter::HasRole(vec!["admin".to_string()])),
            BackendKind::Memory,
        );
        let admin = Account::authenticated("1", vec!["admin".to_string()]);
        let visitor = Account::anonymous();

        assert!(secret.access(AccessOperation::View, &admin, &Method::GET, None));
        assert!(!secret.access(AccessOperation::View, &visitor, &Method::GET, None));
    }
}
