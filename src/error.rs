//! Error types shared by the key model, dialects and backends.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by tuplegrid.
///
/// Key violations signal metadata bugs in the mapping layer and are never
/// recovered internally. Backend failures propagate unchanged to the host
/// transaction boundary, which decides whether to roll back.
#[derive(Error, Debug)]
pub enum GridError {
    // Key model
    #[error("Column names do not match column values for table {table}: {names} names, {values} values")]
    KeyConstruction {
        table: String,
        names: usize,
        values: usize,
    },

    #[error("Given column {column} is not part of this key: {key}")]
    KeyColumnLookup { column: String, key: String },

    #[error("Invalid mapping metadata: {0}")]
    InvalidMetadata(String),

    // Backend failures
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Optimistic lock failure for {key}")]
    OptimisticLock { key: String },

    #[error("Tuple not found: {0}")]
    TupleNotFound(String),

    #[error("Dialect does not support the {0} facet")]
    UnsupportedFacet(&'static str),

    #[error("Storage backend error: {0}")]
    Backend(String),

    // Conversion errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl GridError {
    /// True for failures caused by a uniqueness conflict, whichever
    /// duplicate-insert prevention strategy detected it.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, GridError::DuplicateKey(_))
    }
}
