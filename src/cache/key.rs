//! Render cache keys
//!
//! ```text
//! v1.0::articles::uu7::pa::id:12::fields:id,label
//! │     │         │    │   │      └ normalized request params (reads only)
//! │     │         │    │   └ lookup fragments from the provider
//! │     │         │    └ marker
//! │     │         └ user (uu<id>) or role (ur<roles>) discriminator
//! │     └ resource name
//! └ version
//! ```
//!
//! Items rendered inside another item also carry the embed chain
//! (`::em:articles.12`), since cycle and depth guards shape their output.

use crate::core::account::Account;
use crate::core::error::{ConfigError, RestfulResult};
use crate::core::provider::ResourceIdentity;
use crate::core::query::LIST_PARAMS;
use serde_json::{Map, Value};
use std::fmt;

/// Trailing marker that turns an invalidation into a prefix clear
pub const WILDCARD: char = '*';

/// Routing parameters that never reach the key
pub const ROUTING_PARAMS: &[&str] = &["q", "path"];

/// Whose rendering an entry is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheGranularity {
    PerUser,
    PerRole,
}

impl CacheGranularity {
    /// Parse `per_user`/`per_role`; anything else is unsupported
    pub fn parse(raw: &str) -> RestfulResult<Self> {
        match raw {
            "per_user" => Ok(CacheGranularity::PerUser),
            "per_role" => Ok(CacheGranularity::PerRole),
            other => {
                tracing::warn!(granularity = other, "Unsupported render cache granularity");
                Err(ConfigError::Unsupported {
                    what: "render cache granularity".to_string(),
                    value: other.to_string(),
                }
                .into())
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheGranularity::PerUser => "per_user",
            CacheGranularity::PerRole => "per_role",
        }
    }

    /// `uu<identity>` or `ur<sorted roles>`
    pub fn discriminator(&self, account: &Account) -> String {
        match self {
            CacheGranularity::PerUser => format!("uu{}", account.identity()),
            CacheGranularity::PerRole => format!("ur{}", account.sorted_roles().join(",")),
        }
    }
}

impl fmt::Display for CacheGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `v{major}.{minor}::{resource}`
pub fn resource_base(identity: &ResourceIdentity) -> String {
    format!("{}::{}", identity.version(), identity.name)
}

/// Prefix matching every entry of a resource, wildcard included
pub fn resource_prefix(identity: &ResourceIdentity) -> String {
    format!("{}::{}", resource_base(identity), WILDCARD)
}

fn join_fragments(fragments: &[(String, String)]) -> String {
    fragments
        .iter()
        .map(|(key, value)| format!("{}:{}", key, value))
        .collect::<Vec<_>>()
        .join("::")
}

/// Tag shared by every user's entry for one item
pub fn fragment_tag(identity: &ResourceIdentity, fragments: &[(String, String)]) -> String {
    format!("{}::{}", resource_base(identity), join_fragments(fragments))
}

/// Tag carried by entries that embed `resource`/`id`
pub fn reference_tag(resource: &str, id: &str) -> String {
    format!("ref::{}::{}", resource, id)
}

/// Request parameters that shape an item, sorted by key
///
/// List parameters and routing parameters are dropped. List values are
/// sorted and de-duplicated.
pub fn normalize_params(input: &Map<String, Value>) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = input
        .iter()
        .filter(|(key, _)| {
            !LIST_PARAMS.contains(&key.as_str()) && !ROUTING_PARAMS.contains(&key.as_str())
        })
        .map(|(key, value)| (key.clone(), normalize_value(value)))
        .collect();
    params.sort();
    params
}

fn normalize_value(value: &Value) -> String {
    let mut parts: Vec<String> = match value {
        Value::String(s) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .collect(),
        other => return other.to_string(),
    };
    parts.sort();
    parts.dedup();
    parts.join(",")
}

/// `::em:<resource>.<id>,...`, empty for top-level requests
pub fn embed_chain_suffix(chain: &[(String, String)]) -> String {
    if chain.is_empty() {
        return String::new();
    }
    let parents: Vec<String> = chain
        .iter()
        .map(|(resource, id)| format!("{}.{}", resource, id))
        .collect();
    format!("::em:{}", parents.join(","))
}

/// Full cache key for one item
///
/// `params` is only passed for read methods.
pub fn build_key(
    identity: &ResourceIdentity,
    granularity: CacheGranularity,
    account: &Account,
    fragments: &[(String, String)],
    params: Option<&Map<String, Value>>,
) -> String {
    let mut key = format!(
        "{}::{}::pa",
        resource_base(identity),
        granularity.discriminator(account)
    );
    if !fragments.is_empty() {
        key.push_str("::");
        key.push_str(&join_fragments(fragments));
    }
    for (name, value) in params.map(normalize_params).unwrap_or_default() {
        key.push_str(&format!("::{}:{}", name, value));
    }
    key
}
