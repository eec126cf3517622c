//! Error types for mica operations
//!
//! The caching layer distinguishes failures that propagate to callers
//! (query/statement failures, cache-store failures during a miss compute)
//! from failures that are logged and swallowed (best-effort deletes, tag
//! invalidation). The swallowing happens at the call sites in `mica-sql`;
//! the types here carry no propagation policy of their own.

use thiserror::Error;

/// Underlying SQL connection errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Query failed: {sql}: {reason}")]
    QueryFailed { sql: String, reason: String },

    #[error("Statement failed: {sql}: {reason}")]
    StatementFailed { sql: String, reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("Unknown savepoint: {name}")]
    UnknownSavepoint { name: String },

    #[error("Connection is closed")]
    Closed,

    #[error("Value conversion failed for type {type_name}: {reason}")]
    ConversionFailed { type_name: String, reason: String },
}

/// Tag-aware cache store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheStoreError {
    #[error("Serialization failed for key {key}: {reason}")]
    SerializationFailed { key: String, reason: String },

    #[error("Deserialization failed for key {key}: {reason}")]
    DeserializationFailed { key: String, reason: String },

    #[error("Store failed for key {key}: {reason}")]
    StoreFailed { key: String, reason: String },

    #[error("Delete failed for key {key}: {reason}")]
    DeleteFailed { key: String, reason: String },

    #[error("Tag invalidation failed: {reason}")]
    InvalidationFailed { reason: String },

    #[error("Cache lock poisoned")]
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
}

/// Master error type for all mica errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MicaError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheStoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for mica operations.
pub type MicaResult<T> = Result<T, MicaError>;

// =============================================================================
// TESTS
// =============================================================================
