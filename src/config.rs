//! Configuration types and builders for books-migrate.

use crate::error::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Main configuration for a migration run.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MigrateConfig {
    /// MongoDB (source) configuration
    #[validate(nested)]
    pub mongo: MongoConfig,

    /// PostgreSQL (destination) configuration
    #[validate(nested)]
    pub postgres: PostgresConfig,

    /// Migration behavior configuration
    #[serde(default)]
    #[validate(nested)]
    pub migration: MigrationBehaviorConfig,
}

impl MigrateConfig {
    /// Create a new configuration builder.
    pub fn builder() -> MigrateConfigBuilder {
        MigrateConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup (the process environment in practice).
    ///
    /// Required: `MONGO_URI`, `MONGO_DB`, `PG_HOST`, `PG_DATABASE`, `PG_USER`.
    /// Optional: `PG_PASSWORD`, `PG_PORT`, `PG_SSLMODE`, `MONGO_COLLECTION`, `BOOKS_TABLE`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::config(format!("{} not set", key)))
        };

        let mut builder = Self::builder()
            .mongo_uri(required("MONGO_URI")?)
            .mongo_database(required("MONGO_DB")?)
            .postgres_host(required("PG_HOST")?)
            .postgres_database(required("PG_DATABASE")?)
            .postgres_user(required("PG_USER")?)
            .postgres_password(lookup("PG_PASSWORD").unwrap_or_default());

        if let Some(port) = lookup("PG_PORT") {
            let port = port
                .trim()
                .parse::<u16>()
                .with_context(|| format!("Invalid PG_PORT: {}", port))?;
            builder = builder.postgres_port(port);
        }

        if let Some(mode) = lookup("PG_SSLMODE") {
            builder = builder.ssl_mode(mode.parse()?);
        }

        if let Some(collection) = lookup("MONGO_COLLECTION") {
            builder = builder.mongo_collection(collection);
        }

        if let Some(table) = lookup("BOOKS_TABLE") {
            builder = builder.target_table(table);
        }

        builder.build()
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;

        let config: Self =
            toml::from_str(&content).with_context(|| format!("Failed to parse {}", path))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self)
            .map_err(|e| Error::validation(format!("Config validation failed: {}", e)))?;
        self.mongo.connect_timeout()?;
        self.postgres.connect_timeout()?;
        Ok(())
    }
}

/// MongoDB connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MongoConfig {
    /// Connection URI
    #[validate(custom(function = "validate_mongo_uri"))]
    pub uri: String,

    /// Database name
    #[validate(length(min = 1, max = 64))]
    pub database: String,

    /// Source collection
    #[validate(length(min = 1, max = 255))]
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Cursor batch size for the collection scan
    #[validate(range(min = 1, max = 100000))]
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Connect / server selection timeout, e.g. "30s"
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
}

impl MongoConfig {
    /// Parsed connect timeout.
    pub fn connect_timeout(&self) -> Result<Duration> {
        parse_timeout("mongo.connect_timeout", &self.connect_timeout)
    }
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            database: String::new(),
            collection: default_collection(),
            batch_size: default_batch_size(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// PostgreSQL connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PostgresConfig {
    /// Server host
    #[validate(length(min = 1))]
    pub host: String,

    /// Server port
    #[validate(range(min = 1))]
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name
    #[validate(length(min = 1, max = 63))]
    pub database: String,

    /// User name
    #[validate(length(min = 1))]
    pub user: String,

    /// Password
    #[serde(default, skip_serializing)]
    pub password: String,

    /// SSL mode
    #[serde(default)]
    pub ssl_mode: SslMode,

    /// Accept certificates that fail verification (self-signed poolers).
    /// Only honoured by the `tls-native` backend; other builds refuse to connect.
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Connect timeout, e.g. "30s"
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
}

impl PostgresConfig {
    /// Parsed connect timeout.
    pub fn connect_timeout(&self) -> Result<Duration> {
        parse_timeout("postgres.connect_timeout", &self.connect_timeout)
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_pg_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            ssl_mode: SslMode::default(),
            accept_invalid_certs: false,
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// SSL mode for PostgreSQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    /// Disable SSL
    Disable,
    /// Prefer SSL (default)
    #[default]
    Prefer,
    /// Require SSL
    Require,
}

impl std::str::FromStr for SslMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            other => Err(Error::config(format!(
                "Invalid SSL mode '{}': expected disable, prefer or require",
                other
            ))),
        }
    }
}

impl From<SslMode> for tokio_postgres::config::SslMode {
    fn from(mode: SslMode) -> Self {
        match mode {
            SslMode::Disable => tokio_postgres::config::SslMode::Disable,
            SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
            SslMode::Require => tokio_postgres::config::SslMode::Require,
        }
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MigrationBehaviorConfig {
    /// Destination table, optionally schema-qualified
    #[validate(custom(function = "validate_table_name"))]
    #[serde(default = "default_target_table")]
    pub target_table: String,
}

impl Default for MigrationBehaviorConfig {
    fn default() -> Self {
        Self {
            target_table: default_target_table(),
        }
    }
}

/// Builder for MigrateConfig.
#[derive(Debug, Default)]
pub struct MigrateConfigBuilder {
    mongo_uri: Option<String>,
    mongo_database: Option<String>,
    mongo_collection: Option<String>,
    batch_size: Option<u32>,
    postgres_host: Option<String>,
    postgres_port: Option<u16>,
    postgres_database: Option<String>,
    postgres_user: Option<String>,
    postgres_password: Option<String>,
    ssl_mode: Option<SslMode>,
    target_table: Option<String>,
}

impl MigrateConfigBuilder {
    /// Set MongoDB connection URI.
    pub fn mongo_uri(mut self, uri: impl Into<String>) -> Self {
        self.mongo_uri = Some(uri.into());
        self
    }

    /// Set MongoDB database name.
    pub fn mongo_database(mut self, db: impl Into<String>) -> Self {
        self.mongo_database = Some(db.into());
        self
    }

    /// Set source collection name.
    pub fn mongo_collection(mut self, collection: impl Into<String>) -> Self {
        self.mongo_collection = Some(collection.into());
        self
    }

    /// Set cursor batch size for the scan.
    pub fn batch_size(mut self, size: u32) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Set PostgreSQL host.
    pub fn postgres_host(mut self, host: impl Into<String>) -> Self {
        self.postgres_host = Some(host.into());
        self
    }

    /// Set PostgreSQL port.
    pub fn postgres_port(mut self, port: u16) -> Self {
        self.postgres_port = Some(port);
        self
    }

    /// Set PostgreSQL database name.
    pub fn postgres_database(mut self, db: impl Into<String>) -> Self {
        self.postgres_database = Some(db.into());
        self
    }

    /// Set PostgreSQL user.
    pub fn postgres_user(mut self, user: impl Into<String>) -> Self {
        self.postgres_user = Some(user.into());
        self
    }

    /// Set PostgreSQL password.
    pub fn postgres_password(mut self, password: impl Into<String>) -> Self {
        self.postgres_password = Some(password.into());
        self
    }

    /// Set PostgreSQL SSL mode.
    pub fn ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = Some(mode);
        self
    }

    /// Set destination table name.
    pub fn target_table(mut self, table: impl Into<String>) -> Self {
        self.target_table = Some(table.into());
        self
    }

    /// Build the MigrateConfig.
    pub fn build(self) -> Result<MigrateConfig> {
        let mongo_uri = self
            .mongo_uri
            .ok_or_else(|| Error::config("mongo_uri required"))?;
        let mongo_database = self
            .mongo_database
            .ok_or_else(|| Error::config("mongo_database required"))?;
        let postgres_host = self
            .postgres_host
            .ok_or_else(|| Error::config("postgres_host required"))?;
        let postgres_database = self
            .postgres_database
            .ok_or_else(|| Error::config("postgres_database required"))?;
        let postgres_user = self
            .postgres_user
            .ok_or_else(|| Error::config("postgres_user required"))?;

        let config = MigrateConfig {
            mongo: MongoConfig {
                uri: mongo_uri,
                database: mongo_database,
                collection: self.mongo_collection.unwrap_or_else(default_collection),
                batch_size: self.batch_size.unwrap_or_else(default_batch_size),
                ..Default::default()
            },
            postgres: PostgresConfig {
                host: postgres_host,
                port: self.postgres_port.unwrap_or_else(default_pg_port),
                database: postgres_database,
                user: postgres_user,
                password: self.postgres_password.unwrap_or_default(),
                ssl_mode: self.ssl_mode.unwrap_or_default(),
                ..Default::default()
            },
            migration: MigrationBehaviorConfig {
                target_table: self.target_table.unwrap_or_else(default_target_table),
            },
        };

        config.validate()?;
        Ok(config)
    }
}

/// Seed lists (`host1,host2`) are not valid URLs, so only the scheme and
/// the presence of a host part are checked here; the driver parses the rest.
fn validate_mongo_uri(uri: &str) -> std::result::Result<(), ValidationError> {
    let rest = uri
        .strip_prefix("mongodb://")
        .or_else(|| uri.strip_prefix("mongodb+srv://"))
        .ok_or_else(|| ValidationError::new("invalid_mongo_scheme"))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(ValidationError::new("invalid_mongo_uri"));
    }
    Ok(())
}

fn validate_table_name(name: &str) -> std::result::Result<(), ValidationError> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 || !parts.iter().all(|p| is_identifier(p)) {
        return Err(ValidationError::new("invalid_table_name"));
    }
    Ok(())
}

/// Unquoted SQL identifier in folded form: lower-case letter or underscore,
/// then lower-case letters, digits, underscores.
///
/// PostgreSQL folds unquoted names to lower case while `information_schema`
/// compares them verbatim, so upper-case names are rejected.
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    s.len() <= 63 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn parse_timeout(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| Error::validation(format!("Invalid {} '{}': {}", field, value, e)))
}

// Defaults
fn default_collection() -> String {
    "books".into()
}
fn default_target_table() -> String {
    "books".into()
}
fn default_batch_size() -> u32 {
    1000
}
fn default_pg_port() -> u16 {
    5432
}
fn default_connect_timeout() -> String {
    "30s".into()
}
