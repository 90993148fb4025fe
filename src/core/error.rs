//! Typed error handling for restful resources
//!
//! Every failure a resource operation can produce is one of a few classes,
//! each mapped to a stable HTTP status:
//!
//! - [`RequestError`]: malformed or unknown filter, sort, pagination, payload
//!   keys or identifiers. Always caller-fixable (400).
//! - [`ResourceError`]: missing records (404), denied access (403), operations
//!   a resource does not support (501).
//! - [`ConfigError`]: a resource registered with incomplete or unsupported
//!   configuration (503).
//! - [`StorageError`]: the backend failed to read or write (503).
//!
//! # Example
//!
//! ```rust,ignore
//! match provider.view(&request, "42").await {
//!     Ok(item) => println!("{:?}", item.values),
//!     Err(RestfulError::Resource(ResourceError::NotFound { id, .. })) => {
//!         println!("record {} does not exist", id);
//!     }
//!     Err(e) => eprintln!("{} ({})", e, e.status_code()),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// The main error type for resource operations
#[derive(Debug, Error)]
pub enum RestfulError {
    /// Caller-fixable request problems
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Resource-level outcomes (not found, forbidden, not implemented)
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Registration-time configuration problems
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Backend failures
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl RestfulError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RestfulError::Request(_) => StatusCode::BAD_REQUEST,
            RestfulError::Resource(e) => e.status_code(),
            RestfulError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            RestfulError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            RestfulError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            RestfulError::Request(e) => e.error_code(),
            RestfulError::Resource(e) => e.error_code(),
            RestfulError::Config(e) => e.error_code(),
            RestfulError::Storage(_) => "STORAGE_ERROR",
            RestfulError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for the caller-fixable class
    pub fn is_bad_request(&self) -> bool {
        self.status_code() == StatusCode::BAD_REQUEST
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            RestfulError::Request(RequestError::IllegalPayloadKeys { keys }) => {
                Some(serde_json::json!({ "fields": keys }))
            }
            RestfulError::Request(RequestError::UnknownFilterField { field })
            | RestfulError::Request(RequestError::UnknownSortField { field }) => {
                Some(serde_json::json!({ "field": field }))
            }
            RestfulError::Resource(ResourceError::NotFound { resource, id }) => {
                Some(serde_json::json!({ "resource": resource, "id": id }))
            }
            RestfulError::Config(ConfigError::MissingKey { resource, key }) => {
                Some(serde_json::json!({ "resource": resource, "key": key }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for RestfulError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors caused by the request itself (400)
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("The filter '{field}' is not allowed for this path")]
    UnknownFilterField { field: String },

    #[error("The sort '{field}' is not allowed for this path")]
    UnknownSortField { field: String },

    #[error("Operator '{operator}' is not allowed for filtering on '{field}'")]
    InvalidOperator { field: String, operator: String },

    #[error("Conjunction '{conjunction}' is not allowed for filtering on '{field}'")]
    InvalidConjunction { field: String, conjunction: String },

    #[error("Invalid filter on '{field}': {message}")]
    InvalidFilter { field: String, message: String },

    #[error("Invalid sort: {message}")]
    InvalidSort { message: String },

    #[error("\"{param}\" property should be a positive integer, got '{value}'")]
    InvalidPagination { param: String, value: String },

    #[error("Unknown or not allowed properties sent: {}", keys.join(", "))]
    IllegalPayloadKeys { keys: Vec<String> },

    #[error("No values were sent with the request")]
    NoValuesSent,

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("Invalid identifier '{id}': expected {expected} part(s) separated by '::'")]
    InvalidIdentifier { id: String, expected: usize },

    #[error("Invalid request body: {message}")]
    InvalidBody { message: String },
}

impl RequestError {
    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::UnknownFilterField { .. } => "UNKNOWN_FILTER_FIELD",
            RequestError::UnknownSortField { .. } => "UNKNOWN_SORT_FIELD",
            RequestError::InvalidOperator { .. } => "INVALID_OPERATOR",
            RequestError::InvalidConjunction { .. } => "INVALID_CONJUNCTION",
            RequestError::InvalidFilter { .. } => "INVALID_FILTER",
            RequestError::InvalidSort { .. } => "INVALID_SORT",
            RequestError::InvalidPagination { .. } => "INVALID_PAGINATION",
            RequestError::IllegalPayloadKeys { .. } => "ILLEGAL_PAYLOAD_KEYS",
            RequestError::NoValuesSent => "NO_VALUES_SENT",
            RequestError::InvalidValue { .. } => "INVALID_VALUE",
            RequestError::InvalidIdentifier { .. } => "INVALID_IDENTIFIER",
            RequestError::InvalidBody { .. } => "INVALID_BODY",
        }
    }
}

// =============================================================================
// Resource Errors
// =============================================================================

/// Errors about a resource or one of its records
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("The record '{id}' of resource '{resource}' was not found")]
    NotFound { resource: String, id: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Operation '{operation}' is not implemented for resource '{resource}'")]
    NotImplemented { resource: String, operation: String },

    #[error("Resource '{name}' (version {version}) is not registered")]
    UnknownResource { name: String, version: String },
}

impl ResourceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ResourceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ResourceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ResourceError::NotImplemented { .. } => StatusCode::NOT_IMPLEMENTED,
            ResourceError::UnknownResource { .. } => StatusCode::NOT_FOUND,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ResourceError::NotFound { .. } => "NOT_FOUND",
            ResourceError::Forbidden { .. } => "FORBIDDEN",
            ResourceError::NotImplemented { .. } => "NOT_IMPLEMENTED",
            ResourceError::UnknownResource { .. } => "UNKNOWN_RESOURCE",
        }
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors raised while registering a resource
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required data provider option '{key}' for resource '{resource}'")]
    MissingKey { resource: String, key: String },

    #[error("{what} '{value}' is not supported")]
    Unsupported { what: String, value: String },

    #[error("Invalid field definition '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("IO error: {message}")]
    IoError { message: String },
}

impl ConfigError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigError::MissingKey { .. } => "CONFIG_MISSING_KEY",
            ConfigError::Unsupported { .. } => "CONFIG_UNSUPPORTED",
            ConfigError::InvalidField { .. } => "CONFIG_INVALID_FIELD",
            ConfigError::ParseError { .. } => "CONFIG_PARSE_ERROR",
            ConfigError::IoError { .. } => "CONFIG_IO_ERROR",
        }
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors surfaced by a backend adapter
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{backend} query error: {message}")]
    QueryError { backend: String, message: String },

    #[error("{backend} write error: {message}")]
    WriteError { backend: String, message: String },
}

impl StorageError {
    /// Wrap a backend read failure
    pub fn query(backend: &str, err: anyhow::Error) -> Self {
        StorageError::QueryError {
            backend: backend.to_string(),
            message: err.to_string(),
        }
    }

    /// Wrap a backend write failure
    pub fn write(backend: &str, err: anyhow::Error) -> Self {
        StorageError::WriteError {
            backend: backend.to_string(),
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_json::Error> for RestfulError {
    fn from(err: serde_json::Error) -> Self {
        RestfulError::Request(RequestError::InvalidBody {
            message: err.to_string(),
        })
    }
}

impl From<serde_yaml::Error> for RestfulError {
    fn from(err: serde_yaml::Error) -> Self {
        RestfulError::Config(ConfigError::ParseError {
            message: err.to_string(),
        })
    }
}

impl From<std::io::Error> for RestfulError {
    fn from(err: std::io::Error) -> Self {
        RestfulError::Config(ConfigError::IoError {
            message: err.to_string(),
        })
    }
}

/// A specialized Result type for resource operations
pub type RestfulResult<T> = Result<T, RestfulError>;
