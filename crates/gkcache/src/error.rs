//! Error types for gkcache

use std::fmt;

use crate::kind::RequestType;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Device, kind or value not present in the cache
    NotFound,

    /// Request type does not address the tree the operation works on
    InvalidKind(RequestType),

    /// Raw request type outside the known enumeration
    InvalidRequestType(i32),

    /// Attribute value is empty
    MissingValue,

    /// Cache holds `max_entries` records, new record rejected
    CacheFull {
        /// Configured capacity
        max_entries: u64,
    },

    /// Hardware address text could not be parsed
    InvalidMac(String),

    /// Configuration rejected by validation
    InvalidConfig(String),
}

impl Error {
    /// True for the `NotFound` outcome, which callers treat as a plain miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound => write!(f, "Entry not found"),
            Error::InvalidKind(kind) => write!(f, "Invalid request type for operation: {}", kind),
            Error::InvalidRequestType(raw) => write!(f, "Unknown request type: {}", raw),
            Error::MissingValue => write!(f, "Attribute value is empty"),
            Error::CacheFull { max_entries } => write!(f, "Cache full: max {} entries", max_entries),
            Error::InvalidMac(text) => write!(f, "Invalid MAC address: {}", text),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
