//! Data provider adapters for the supported backend families

pub mod db_query;
pub mod entity;
#[cfg(feature = "in-memory")]
pub mod in_memory;
pub mod plug;

pub use db_query::{CompositeId, DbQueryDataProvider};
pub use entity::EntityDataProvider;
#[cfg(feature = "in-memory")]
pub use in_memory::{InMemoryObjectStore, InMemoryPluginRegistry, InMemorySqlExecutor};
pub use plug::PluginDataProvider;
