//! Error types for the disk cache

use std::fmt;

#[derive(Debug)]
pub enum CacheError {
    /// A filesystem operation failed
    Io {
        message: String,
        source: Option<Box<std::io::Error>>,
    },
    /// Journal header mismatch or unparseable record
    MalformedJournal(String),
    /// API misuse, e.g. a second editor on the same key
    IllegalState(String),
    /// Key does not match `[A-Za-z0-9_-]{1,120}`
    InvalidKey(String),
    /// Invalid construction parameters
    Config(String),
    Closed,
}

impl CacheError {
    pub(crate) fn io(message: impl Into<String>) -> Self {
        CacheError::Io {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn io_with(message: impl Into<String>, err: std::io::Error) -> Self {
        CacheError::Io {
            message: message.into(),
            source: Some(Box::new(err)),
        }
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io { message, .. } => write!(f, "{}", message),
            CacheError::MalformedJournal(msg) => write!(f, "Malformed journal: {}", msg),
            CacheError::IllegalState(msg) => write!(f, "{}", msg),
            CacheError::InvalidKey(key) => write!(f, "Invalid key: {}", key),
            CacheError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CacheError::Closed => write!(f, "cache is closed"),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io {
                source: Some(err), ..
            } => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io {
            message: format!("IO error: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
