//! Core module containing the resource contracts and the types they share

pub mod account;
pub mod collection;
pub mod error;
pub mod field;
pub mod provider;
pub mod query;
pub mod record;
pub mod request;
pub mod store;

pub use account::{Account, AccountResolver, AnonymousResolver};
pub use collection::ResourceFieldCollection;
pub use error::{RestfulError, RestfulResult};
pub use field::{Cardinality, FieldDefinition, ResourceField, ResourceReference};
pub use provider::{DataProvider, ProviderCore, ProviderMiddleware, RenderedItem, ResourceIdentity};
pub use query::{OneOrMany, Operator, Pagination, PaginationMeta, SortDirection};
pub use record::Record;
pub use request::ResourceRequest;
pub use store::{BackendKind, ObjectStore, PluginRegistry, SqlExecutor};
