//! Resource-to-resource embedding
//!
//! A field that references another resource renders that resource's item in
//! place of the raw identifier. The item is fetched through the target's own
//! provider with a scoped sub-request, and an [`EmbedDescriptor`] records
//! where the value came from so formatters can relocate it.

pub mod registry;
pub mod resolver;

pub use registry::ResourceRegistry;
pub use resolver::{ReferenceResolver, Resolved};

use serde::Serialize;

/// Where an embedded value came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedDescriptor {
    /// Identifier of the record holding the reference
    pub parent_id: String,

    /// Public name of the reference field
    pub field: String,

    /// Identifier of the embedded item
    pub id: String,

    pub source_type: String,

    pub source_bundle: Option<String>,

    pub resource_name: String,

    /// Descriptors of the embedded item's own embeds
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<EmbedDescriptor>,
}

impl EmbedDescriptor {
    /// This descriptor and every nested one, depth first
    pub fn flatten(&self) -> Vec<&EmbedDescriptor> {
        let mut all = vec![self];
        for child in &self.nested {
            all.extend(child.flatten());
        }
        all
    }
}
