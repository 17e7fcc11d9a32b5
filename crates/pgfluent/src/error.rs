//! Error types for pgfluent

use std::fmt;
use thiserror::Error;

/// Result type alias for pgfluent operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Boxed driver error carried by [`OrmError::Execution`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// How a result set violated an "exactly one row" contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCount {
    /// The statement produced no rows.
    None,
    /// The statement produced a second row after the first.
    Multiple,
}

impl fmt::Display for RowCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("no records"),
            Self::Multiple => f.write_str("multiple records"),
        }
    }
}

/// Error types for statement building, binding and fetching
#[derive(Debug, Error)]
pub enum OrmError {
    /// Bad constructor arguments (empty column list, malformed database URL, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// A value that cannot be rendered as SQL or bound as a parameter
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// Malformed option, e.g. an unrecognized conflict-update keyword
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// API misuse: one-shot step called twice, empty bind map, commit after rollback
    #[error("Usage error: {0}")]
    Usage(String),

    /// Zero or multiple rows where exactly one was required
    #[error("{operation} returned {found}")]
    Cardinality {
        operation: &'static str,
        found: RowCount,
    },

    /// The underlying statement failed to prepare, execute or fetch
    #[error("{operation} failed: {source}")]
    Execution {
        operation: String,
        #[source]
        source: BoxError,
    },

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),
}

impl OrmError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an unsupported type error
    pub fn unsupported_type(message: impl Into<String>) -> Self {
        Self::UnsupportedType(message.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Create a cardinality error for the named operation
    pub fn cardinality(operation: &'static str, found: RowCount) -> Self {
        Self::Cardinality { operation, found }
    }

    /// Wrap a driver error, naming the step that failed
    pub fn execution(
        operation: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Execution {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Prefix an execution error with the high-level operation it happened in.
    ///
    /// Other variants pass through untouched.
    pub fn within(self, operation: &str) -> Self {
        match self {
            Self::Execution {
                operation: step,
                source,
            } => Self::Execution {
                operation: format!("{operation} ({step})"),
                source,
            },
            other => other,
        }
    }

    /// Check if this is a cardinality error
    pub fn is_cardinality(&self) -> bool {
        matches!(self, Self::Cardinality { .. })
    }

    /// Check if this is a usage error
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }

    /// Check if this is an invalid argument error
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// Check if this is an unsupported type error
    pub fn is_unsupported_type(&self) -> bool {
        matches!(self, Self::UnsupportedType(_))
    }

    /// Check if this is an execution error
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution { .. })
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinality_message_names_operation() {
        let err = OrmError::cardinality("MappedQuery::single", RowCount::Multiple);
        assert_eq!(
            err.to_string(),
            "MappedQuery::single returned multiple records"
        );
        assert!(err.is_cardinality());
    }

    #[test]
    fn within_prefixes_execution_errors_only() {
        let err = OrmError::execution("execute", "relation \"nope\" does not exist")
            .within("Query::execute");
        assert_eq!(
            err.to_string(),
            "Query::execute (execute) failed: relation \"nope\" does not exist"
        );

        let err = OrmError::usage("bind map is empty").within("Query::execute");
        assert!(err.is_usage());
    }
}
