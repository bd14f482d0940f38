//! # books-migrate
//!
//! Copies a MongoDB `books` collection into a PostgreSQL table.
//!
//! Each document is flattened into a fixed nine-column row and inserted with
//! `ON CONFLICT (_id) DO NOTHING`, so running the migration again never
//! duplicates or modifies rows. A record whose insert fails is logged and
//! skipped; the run commits once at the end.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use books_migrate::{MigrateConfig, Migrator};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MigrateConfig::builder()
//!         .mongo_uri("mongodb://localhost:27017")
//!         .mongo_database("library")
//!         .postgres_host("localhost")
//!         .postgres_database("library")
//!         .postgres_user("postgres")
//!         .postgres_password("postgres")
//!         .build()?;
//!
//!     let mut migrator = Migrator::connect(&config).await?;
//!     let result = migrator.run().await;
//!     migrator.close().await;
//!
//!     let report = result?;
//!     println!("Inserted {} books", report.records_inserted);
//!     Ok(())
//! }
//! ```
//!
//! ## Custom Stores
//!
//! The loop is generic over [`BookSource`] and [`BookSink`], so other stores
//! (or in-memory fakes) can be plugged in with [`Migrator::new`].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod migrate;
pub mod mongo;
pub mod postgres;
pub mod record;
pub mod schema;

// Re-exports for convenience
pub use config::{MigrateConfig, MigrateConfigBuilder, MongoConfig, PostgresConfig, SslMode};
pub use error::{Error, Result};
pub use migrate::{
    BookSink, BookSource, InsertOutcome, MigrationPhase, MigrationProgress, MigrationReport,
    Migrator,
};
pub use mongo::MongoSource;
pub use postgres::PostgresSink;
pub use record::{BookRow, DocVersion, MISSING_ID_PLACEHOLDER, transform_book};
pub use schema::{Column, ColumnType, Table};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
