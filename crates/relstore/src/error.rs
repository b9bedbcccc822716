//! Error types for the storage layer.

use thiserror::Error;

/// Failure reported by an underlying driver (connection, statement or cursor).
///
/// Drivers return this boxed error; the storage layer wraps it into
/// [`StoreError::Storage`] together with a description of the operation, so
/// callers never see a driver-specific error type.
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for storage operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Configuration error (missing connector field, incomplete type mapping, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Table schema is invalid (bad column type, duplicate column, etc.)
    #[error("Schema error in table {table}: {message}")]
    Schema { table: String, message: String },

    /// Engine failure while executing a statement or moving a cursor
    #[error("Storage error: {context}")]
    Storage {
        context: String,
        #[source]
        source: DriverError,
    },

    /// Filter tree cannot be rendered into a predicate
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Operation is not supported by this table variant
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// API misuse (empty bulk insert, duplicate parameter, double close)
    #[error("Usage error: {0}")]
    Usage(String),

    /// Resource was already closed
    #[error("Closed: {0}")]
    Closed(String),

    /// Record could not be packed or unpacked
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error (config file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl StoreError {
    /// Wrap a driver failure with context about the operation that hit it.
    pub fn storage(context: impl Into<String>, source: impl Into<DriverError>) -> Self {
        StoreError::Storage {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Create a Config error.
    pub fn config(message: impl Into<String>) -> Self {
        StoreError::Config(message.into())
    }

    /// Create a Schema error for a table.
    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Schema {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether the failure came from the engine and may succeed on retry.
    ///
    /// Everything else is a configuration or programming error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Storage { .. })
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
