//! Error types for sharecache operations

use crate::RegistrationId;
use thiserror::Error;

/// Persistent store errors.
///
/// Every variant surfaces to `store` callers as
/// [`CacheError::StoreUnavailable`]; `find` turns them into misses.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Failed to open store environment at {path}: {reason}")]
    EnvOpen { path: String, reason: String },

    #[error("Transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("Key of {len} bytes exceeds the store limit of {limit}")]
    KeyTooLong { len: usize, limit: usize },

    #[error("Corrupt record: {reason}")]
    Corrupt { reason: String },

    #[error("I/O error at {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for the cache engine.
///
/// Filtering and staleness are never errors; they are reported through
/// the normal outcome types of the engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cannot replace roots of confirmed registration {registration}")]
    CannotReplace { registration: RegistrationId },

    #[error("Root index {index} out of range for classpath of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Unknown registration: {registration}")]
    UnknownRegistration { registration: RegistrationId },

    #[error("Registration limit of {limit} reached")]
    TooManyRegistrations { limit: usize },

    #[error("Invalid root at index {index}: {reason}")]
    InvalidRoot { index: usize, reason: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry lock poisoned")]
    LockPoisoned,

    #[error("Background task failed: {reason}")]
    Task { reason: String },
}

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// TESTS
// =============================================================================
