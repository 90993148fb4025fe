//! Resource hosting
//!
//! This module assembles resources from configuration and dispatches requests:
//! - `ResourceHostBuilder` builds providers, applies middleware, registers versions
//! - `ResourceHost` resolves a resource version and hands it the request
//! - `Resource` maps HTTP methods onto the data provider contract

pub mod builder;
pub mod host;
pub mod resource;

pub use builder::ResourceHostBuilder;
pub use host::ResourceHost;
pub use resource::{Resource, ResourceOutput};
