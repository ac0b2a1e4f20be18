//! Error types for the cache inspector

use std::fmt;

#[derive(Debug)]
pub enum InspectError {
    Cache(disk_lru_cache::CacheError),
    Json(serde_json::Error),
    Config(String),
}

impl fmt::Display for InspectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InspectError::Cache(err) => write!(f, "Cache error: {}", err),
            InspectError::Json(err) => write!(f, "JSON error: {}", err),
            InspectError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for InspectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InspectError::Cache(err) => Some(err),
            InspectError::Json(err) => Some(err),
            InspectError::Config(_) => None,
        }
    }
}

impl From<disk_lru_cache::CacheError> for InspectError {
    fn from(err: disk_lru_cache::CacheError) -> Self {
        InspectError::Cache(err)
    }
}

impl From<serde_json::Error> for InspectError {
    fn from(err: serde_json::Error) -> Self {
        InspectError::Json(err)
    }
}

impl From<tracing_subscriber::filter::ParseError> for InspectError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        InspectError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InspectError>;
