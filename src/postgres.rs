//! PostgreSQL client and operations for books-migrate.

use crate::config::PostgresConfig;
use crate::error::{Error, Result};
use crate::migrate::{BookSink, InsertOutcome};
use crate::record::BookRow;
use crate::schema::{IntrospectedColumn, Table};
use async_trait::async_trait;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Statement};
use tracing::{debug, info, instrument};

#[cfg(feature = "tls-native")]
use native_tls::TlsConnector;
#[cfg(feature = "tls-native")]
use postgres_native_tls::MakeTlsConnector;

/// Savepoint wrapping each insert so one failure does not abort the transaction.
const RECORD_SAVEPOINT: &str = "book_record";

/// PostgreSQL client wrapper bound to the destination table.
pub struct PostgresSink {
    client: Client,
    table: Table,
    insert: Statement,
    in_transaction: bool,
}

impl PostgresSink {
    /// Connect to PostgreSQL and prepare the insert statement for `table`.
    #[instrument(skip(config), fields(host = %config.host, port = config.port, database = %config.database))]
    pub async fn connect(config: &PostgresConfig, table: &str) -> Result<Self> {
        info!("Connecting to PostgreSQL...");
        check_tls_options(config)?;

        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.user)
            .password(&config.password)
            .application_name("books-migrate")
            .connect_timeout(config.connect_timeout()?)
            .ssl_mode(config.ssl_mode.into());

        #[cfg(feature = "tls-native")]
        let client = {
            let connector = TlsConnector::builder()
                .danger_accept_invalid_certs(config.accept_invalid_certs)
                .build()
                .map_err(|e| Error::postgres_connection("TLS setup failed", e))?;
            let (client, connection) = pg
                .connect(MakeTlsConnector::new(connector))
                .await
                .map_err(|e| Error::postgres_connection("Failed to connect", e))?;
            spawn_connection(connection);
            client
        };

        #[cfg(all(feature = "tls-rustls", not(feature = "tls-native")))]
        let client = {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            let tls_config = rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth();
            let (client, connection) = pg
                .connect(tokio_postgres_rustls::MakeRustlsConnect::new(tls_config))
                .await
                .map_err(|e| Error::postgres_connection("Failed to connect", e))?;
            spawn_connection(connection);
            client
        };

        #[cfg(not(any(feature = "tls-native", feature = "tls-rustls")))]
        let client = {
            let (client, connection) = pg
                .connect(tokio_postgres::NoTls)
                .await
                .map_err(|e| Error::postgres_connection("Failed to connect", e))?;
            spawn_connection(connection);
            client
        };

        let table = Table::books(table);
        let insert = client
            .prepare_typed(&table.insert_statement(), &insert_param_types())
            .await
            .map_err(|e| Error::postgres_query(&table.name, "Prepare insert failed", e))?;

        info!("Connected to PostgreSQL");
        Ok(Self {
            client,
            table,
            insert,
            in_transaction: false,
        })
    }

    /// Test connectivity.
    pub async fn ping(&self) -> Result<()> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| Error::postgres_query("", "Ping failed", e))?;
        Ok(())
    }

    /// Get destination row count.
    pub async fn count_rows(&self) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM {}", self.table.name);

        let row = self
            .client
            .query_one(&query, &[])
            .await
            .map_err(|e| Error::postgres_query(&self.table.name, "Count failed", e))?;

        Ok(row.get(0))
    }

    /// Introspect the destination table's columns.
    pub async fn introspect_table(&self) -> Result<Vec<IntrospectedColumn>> {
        let query = r#"
            SELECT
                c.column_name::text as column_name,
                c.data_type::text as data_type,
                c.character_maximum_length::int4 as character_maximum_length,
                c.is_nullable = 'YES' as nullable,
                COALESCE(pk.is_pk, false) as is_primary_key
            FROM information_schema.columns c
            LEFT JOIN (
                SELECT kcu.column_name::text as column_name, true as is_pk
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                    ON tc.constraint_name = kcu.constraint_name
                    AND tc.table_schema = kcu.table_schema
                WHERE tc.table_name = $1
                    AND tc.table_schema = $2
                    AND tc.constraint_type = 'PRIMARY KEY'
            ) pk ON c.column_name = pk.column_name
            WHERE c.table_name = $1 AND c.table_schema = $2
            ORDER BY c.ordinal_position
        "#;

        let (schema, table) = split_table_name(&self.table.name);
        let rows = self
            .client
            .query(query, &[&table, &schema])
            .await
            .map_err(|e| Error::postgres_query(&self.table.name, "Introspection failed", e))?;

        let columns: Vec<IntrospectedColumn> = rows
            .iter()
            .map(|row| IntrospectedColumn {
                name: row.get("column_name"),
                pg_type: row.get("data_type"),
                max_length: row.get("character_maximum_length"),
                nullable: row.get("nullable"),
                is_primary_key: row.get("is_primary_key"),
            })
            .collect();

        Ok(columns)
    }

    /// Check the destination table against the books layout.
    pub async fn verify_table(&self) -> Result<()> {
        let columns = self.introspect_table().await?;
        self.table.verify(&columns)
    }

    /// Close the connection.
    ///
    /// An uncommitted transaction is rolled back by the server when the
    /// connection ends.
    pub async fn close(self) {
        if self.in_transaction {
            debug!("Closing PostgreSQL connection with an open transaction");
        }
        drop(self.client);
    }

    async fn simple(&self, sql: &str) -> Result<()> {
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| Error::postgres_query(&self.table.name, format!("{} failed", sql), e))
    }
}

#[async_trait]
impl BookSink for PostgresSink {
    fn table_name(&self) -> &str {
        &self.table.name
    }

    async fn begin(&mut self) -> Result<()> {
        self.simple("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn insert_book(&mut self, row: &BookRow) -> Result<InsertOutcome> {
        let version = row.version_value()?;
        let text = row.text_columns();

        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(9);
        params.push(&row.id);
        params.push(&version);
        for value in &text {
            params.push(value);
        }

        self.simple(&format!("SAVEPOINT {}", RECORD_SAVEPOINT)).await?;

        match self.client.execute(&self.insert, &params).await {
            Ok(affected) => {
                self.simple(&format!("RELEASE SAVEPOINT {}", RECORD_SAVEPOINT))
                    .await?;
                Ok(if affected == 0 {
                    InsertOutcome::Skipped
                } else {
                    InsertOutcome::Inserted
                })
            }
            Err(e) => {
                self.simple(&format!("ROLLBACK TO SAVEPOINT {}", RECORD_SAVEPOINT))
                    .await?;
                Err(Error::postgres_query(
                    &self.table.name,
                    format!("Insert of record {} failed", row.id),
                    e,
                ))
            }
        }
    }

    async fn commit(&mut self) -> Result<()> {
        self.simple("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }
}

/// Parameter types for the insert: `_id` text, `__v` int8, seven text columns.
///
/// `__v` is bound as int8 and narrowed by the server's assignment cast, so an
/// out-of-range version fails that one insert instead of the bind.
fn insert_param_types() -> [Type; 9] {
    [
        Type::TEXT,
        Type::INT8,
        Type::TEXT,
        Type::TEXT,
        Type::TEXT,
        Type::TEXT,
        Type::TEXT,
        Type::TEXT,
        Type::TEXT,
    ]
}

/// Reject TLS options the compiled-in backend cannot honour.
///
/// Only `native-tls` can skip certificate verification.
fn check_tls_options(config: &PostgresConfig) -> Result<()> {
    if config.accept_invalid_certs && !cfg!(feature = "tls-native") {
        return Err(Error::config(
            "accept_invalid_certs requires the tls-native feature",
        ));
    }
    Ok(())
}

/// Split `schema.table`, defaulting the schema to `public`.
fn split_table_name(name: &str) -> (&str, &str) {
    match name.split_once('.') {
        Some((schema, table)) => (schema, table),
        None => ("public", name),
    }
}

fn spawn_connection<S, T>(connection: tokio_postgres::Connection<S, T>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("PostgreSQL connection error: {}", e);
        }
    });
}
