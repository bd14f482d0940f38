//! Error types for books-migrate.

use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for books-migrate operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
        /// Source error if any
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// MongoDB connection error
    #[error("MongoDB connection error: {message}")]
    MongoConnection {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<mongodb::error::Error>,
    },

    /// MongoDB query error
    #[error("MongoDB query error on collection '{collection}': {message}")]
    MongoQuery {
        /// Collection name
        collection: String,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<mongodb::error::Error>,
    },

    /// PostgreSQL connection error
    #[error("PostgreSQL connection error: {message}")]
    PostgresConnection {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// PostgreSQL query error
    #[error("PostgreSQL query error on table '{table}': {message}")]
    PostgresQuery {
        /// Table name
        table: String,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<tokio_postgres::Error>,
    },

    /// A transformed record the destination cannot accept
    #[error("Malformed record '{id}': {message}")]
    MalformedRecord {
        /// Identity of the offending record
        id: String,
        /// Error message
        message: String,
    },

    /// Schema error
    #[error("Schema error: {message}")]
    Schema {
        /// Error message
        message: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with source.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a MongoDB connection error.
    pub fn mongo_connection(message: impl Into<String>, source: mongodb::error::Error) -> Self {
        Self::MongoConnection {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a MongoDB query error.
    pub fn mongo_query(
        collection: impl Into<String>,
        message: impl Into<String>,
        source: mongodb::error::Error,
    ) -> Self {
        Self::MongoQuery {
            collection: collection.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a PostgreSQL connection error.
    ///
    /// Accepts any error so TLS setup failures and driver errors share one variant.
    pub fn postgres_connection(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::PostgresConnection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a PostgreSQL query error.
    pub fn postgres_query(
        table: impl Into<String>,
        message: impl Into<String>,
        source: tokio_postgres::Error,
    ) -> Self {
        Self::PostgresQuery {
            table: table.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a malformed record error.
    pub fn malformed_record(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if this error only concerns a single record.
    ///
    /// Query errors raised by one insert and malformed records are record-level;
    /// everything else (connections, configuration, schema) ends the run.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            Error::PostgresQuery { .. } | Error::MalformedRecord { .. }
        )
    }

    /// Get the error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "CONFIG_ERROR",
            Error::MongoConnection { .. } => "MONGO_CONNECTION_ERROR",
            Error::MongoQuery { .. } => "MONGO_QUERY_ERROR",
            Error::PostgresConnection { .. } => "PG_CONNECTION_ERROR",
            Error::PostgresQuery { .. } => "PG_QUERY_ERROR",
            Error::MalformedRecord { .. } => "MALFORMED_RECORD",
            Error::Schema { .. } => "SCHEMA_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// Message of the innermost driver error, if there is one.
    ///
    /// `tokio_postgres::Error` only says "db error" in its `Display`; the server
    /// message lives on the wrapped `DbError`.
    pub fn detail(&self) -> Option<String> {
        match self {
            Error::PostgresQuery {
                source: Some(source),
                ..
            } => Some(
                source
                    .as_db_error()
                    .map(|db| db.message().to_string())
                    .unwrap_or_else(|| source.to_string()),
            ),
            Error::MongoQuery {
                source: Some(source),
                ..
            }
            | Error::MongoConnection {
                source: Some(source),
                ..
            } => Some(source.to_string()),
            _ => None,
        }
    }
}

/// Error context extension trait.
pub trait ErrorContext<T> {
    /// Add context with a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ErrorContext<T>
    for std::result::Result<T, E>
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| Error::config_with_source(f(), e))
    }
}
