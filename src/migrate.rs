//! Core migration loop for books-migrate.

use crate::config::MigrateConfig;
use crate::error::{Error, Result};
use crate::metrics::{MigrationMetrics, Timer};
use crate::mongo::MongoSource;
use crate::postgres::PostgresSink;
use crate::record::{BookRow, transform_book};
use async_trait::async_trait;
use mongodb::bson::Document;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Read side of a migration: a full scan of one collection.
#[async_trait]
pub trait BookSource: Send + Sync {
    /// Name of the scanned collection, for reports.
    fn collection_name(&self) -> &str;

    /// Every document present when the scan starts.
    async fn fetch_books(&self) -> Result<Vec<Document>>;
}

/// Write side of a migration: one transaction, insert-only rows.
#[async_trait]
pub trait BookSink: Send {
    /// Name of the destination table, for reports.
    fn table_name(&self) -> &str;

    /// Open the transaction that [`BookSink::commit`] closes.
    async fn begin(&mut self) -> Result<()>;

    /// Insert one row unless its key exists. A failure must leave the
    /// transaction usable for the next row.
    async fn insert_book(&mut self, row: &BookRow) -> Result<InsertOutcome>;

    /// Make every insert since [`BookSink::begin`] durable.
    async fn commit(&mut self) -> Result<()>;
}

/// What happened to one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written
    Inserted,
    /// A row with the same key already existed and was left untouched
    Skipped,
}

/// Migration result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Identifier of this run, also recorded on its log span
    pub run_id: String,
    /// Source collection
    pub source_collection: String,
    /// Destination table
    pub target_table: String,
    /// Documents read from the source
    pub records_scanned: u64,
    /// Rows inserted
    pub records_inserted: u64,
    /// Rows skipped because the key already existed
    pub records_skipped: u64,
    /// Records whose insert failed
    pub records_failed: u64,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// Timestamp when the commit completed
    pub completed_at: String,
}

impl MigrationReport {
    /// Whether every scanned record was inserted or already present.
    pub fn is_clean(&self) -> bool {
        self.records_failed == 0
    }
}

/// Progress callback.
pub type ProgressCallback = Box<dyn Fn(MigrationProgress) + Send + Sync>;

/// Migration progress update.
#[derive(Debug, Clone)]
pub struct MigrationProgress {
    /// Current phase
    pub phase: MigrationPhase,
    /// Records handled so far
    pub processed: u64,
    /// Records in the scan (known once scanning is done)
    pub total: Option<u64>,
}

/// Migration phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    /// Reading the source collection
    Scanning,
    /// Transforming and inserting records
    Writing,
    /// Committing the destination transaction
    Committing,
    /// Completed
    Done,
}

impl std::fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationPhase::Scanning => write!(f, "scanning"),
            MigrationPhase::Writing => write!(f, "writing"),
            MigrationPhase::Committing => write!(f, "committing"),
            MigrationPhase::Done => write!(f, "done"),
        }
    }
}

/// Drives the scan, transform and insert of one collection.
pub struct Migrator<S, D> {
    source: S,
    sink: D,
    metrics: MigrationMetrics,
    progress_callback: Option<Arc<ProgressCallback>>,
}

impl Migrator<MongoSource, PostgresSink> {
    /// Connect to both databases described by `config`.
    #[instrument(skip(config))]
    pub async fn connect(config: &MigrateConfig) -> Result<Self> {
        info!("Initializing migrator...");

        let source = MongoSource::connect(config.mongo.clone()).await?;
        let sink = match PostgresSink::connect(&config.postgres, &config.migration.target_table)
            .await
        {
            Ok(sink) => sink,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };

        Ok(Self::new(source, sink))
    }

    /// Test connectivity to both databases and check the destination table.
    pub async fn test_connectivity(&self) -> Result<()> {
        info!("Testing connectivity...");

        self.source.ping().await?;
        info!("MongoDB: OK");

        self.sink.ping().await?;
        info!("PostgreSQL: OK");

        self.sink.verify_table().await?;
        info!("Table {}: OK", self.sink.table_name());

        Ok(())
    }

    /// Document count in the source and row count in the destination.
    pub async fn counts(&self) -> Result<(u64, i64)> {
        let documents = self.source.count_documents().await?;
        let rows = self.sink.count_rows().await?;
        Ok((documents, rows))
    }

    /// Release both connections.
    pub async fn close(self) {
        let (source, sink) = self.into_parts();
        sink.close().await;
        source.close().await;
    }
}

impl<S: BookSource, D: BookSink> Migrator<S, D> {
    /// Create a migrator over already-open handles.
    pub fn new(source: S, sink: D) -> Self {
        Self {
            source,
            sink,
            metrics: MigrationMetrics::new(),
            progress_callback: None,
        }
    }

    /// Set progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(MigrationProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Give back the handles.
    pub fn into_parts(self) -> (S, D) {
        (self.source, self.sink)
    }

    /// Run the migration.
    ///
    /// Per-record insert failures are logged and counted; the run goes on.
    /// Errors from the scan, `begin` or `commit` end the run and are returned.
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn run(&mut self) -> Result<MigrationReport> {
        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());

        let timer = Timer::start("migration");
        self.metrics.reset();

        info!(
            "Migrating {} -> {}",
            self.source.collection_name(),
            self.sink.table_name()
        );
        self.report_progress(MigrationPhase::Scanning, None);

        let documents = self.source.fetch_books().await?;
        let total = documents.len() as u64;
        self.metrics.record_scanned(total);
        info!(
            "Fetched {} documents from {}",
            total,
            self.source.collection_name()
        );

        self.sink.begin().await?;
        self.report_progress(MigrationPhase::Writing, Some(total));

        for doc in &documents {
            let row = transform_book(doc);
            self.write_row(&row).await;
            self.report_progress(MigrationPhase::Writing, Some(total));
        }

        self.report_progress(MigrationPhase::Committing, Some(total));
        self.sink.commit().await?;

        let snapshot = self.metrics.snapshot();
        let duration_ms = timer.stop();
        let report = MigrationReport {
            run_id,
            source_collection: self.source.collection_name().to_string(),
            target_table: self.sink.table_name().to_string(),
            records_scanned: snapshot.records_scanned,
            records_inserted: snapshot.records_inserted,
            records_skipped: snapshot.records_skipped,
            records_failed: snapshot.records_failed,
            duration_ms,
            completed_at: chrono::Utc::now().to_rfc3339(),
        };

        if report.records_failed > 0 {
            warn!(
                "{} of {} records failed to insert",
                report.records_failed, report.records_scanned
            );
        }
        info!(
            inserted = report.records_inserted,
            skipped = report.records_skipped,
            failed = report.records_failed,
            duration_ms,
            records_per_second = snapshot.records_per_second(duration_ms),
            "Migration completed successfully"
        );
        self.report_progress(MigrationPhase::Done, Some(total));

        Ok(report)
    }

    /// Insert one row, absorbing its failure into the metrics and the log.
    async fn write_row(&mut self, row: &BookRow) {
        match self.sink.insert_book(row).await {
            Ok(InsertOutcome::Inserted) => self.metrics.record_inserted(),
            Ok(InsertOutcome::Skipped) => {
                debug!(record_id = %row.id, "Row already present, skipped");
                self.metrics.record_skipped();
            }
            Err(e) => {
                self.metrics.record_failed();
                log_record_failure(&row.id, &e);
            }
        }
    }

    fn report_progress(&self, phase: MigrationPhase, total: Option<u64>) {
        if let Some(ref callback) = self.progress_callback {
            callback(MigrationProgress {
                phase,
                processed: self.metrics.processed(),
                total,
            });
        }
    }
}

fn log_record_failure(id: &str, e: &Error) {
    let record_level = e.is_record_level();
    match e.detail() {
        Some(detail) => error!(
            record_id = %id,
            code = e.code(),
            record_level,
            "Error inserting record: {}: {}",
            e,
            detail
        ),
        None => error!(
            record_id = %id,
            code = e.code(),
            record_level,
            "Error inserting record: {}",
            e
        ),
    }
}
