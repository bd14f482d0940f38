//! MongoDB client and operations for books-migrate.

use crate::config::MongoConfig;
use crate::error::{Error, Result};
use crate::migrate::BookSource;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{Document, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use tracing::{debug, info, instrument};

/// MongoDB client wrapper bound to the source collection.
pub struct MongoSource {
    client: Client,
    collection: Collection<Document>,
    config: MongoConfig,
}

impl MongoSource {
    /// Connect to MongoDB and check the server answers.
    #[instrument(skip(config), fields(uri = %mask_uri(&config.uri), database = %config.database))]
    pub async fn connect(config: MongoConfig) -> Result<Self> {
        info!("Connecting to MongoDB...");

        let timeout = config.connect_timeout()?;
        let mut options = ClientOptions::parse(&config.uri)
            .await
            .map_err(|e| Error::mongo_connection("Invalid connection URI", e))?;
        options.app_name = Some(concat!("books-migrate/", env!("CARGO_PKG_VERSION")).into());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let client = Client::with_options(options)
            .map_err(|e| Error::mongo_connection("Failed to create client", e))?;

        let database = client.database(&config.database);
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Error::mongo_connection("Failed to connect", e))?;

        let collection = database.collection::<Document>(&config.collection);

        info!("Connected to MongoDB database: {}", config.database);
        Ok(Self {
            client,
            collection,
            config,
        })
    }

    /// Test connectivity.
    pub async fn ping(&self) -> Result<()> {
        self.client
            .database(&self.config.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Error::mongo_query(&self.config.collection, "Ping failed", e))?;
        Ok(())
    }

    /// Exact number of documents in the source collection.
    pub async fn count_documents(&self) -> Result<u64> {
        self.collection
            .count_documents(doc! {})
            .await
            .map_err(|e| Error::mongo_query(&self.config.collection, "Count failed", e))
    }

    /// Close the client, ending its background monitoring tasks.
    pub async fn close(self) {
        debug!("Closing MongoDB client");
        self.client.shutdown().await;
    }
}

#[async_trait]
impl BookSource for MongoSource {
    fn collection_name(&self) -> &str {
        &self.config.collection
    }

    #[instrument(skip(self), fields(collection = %self.config.collection))]
    async fn fetch_books(&self) -> Result<Vec<Document>> {
        let cursor = self
            .collection
            .find(doc! {})
            .batch_size(self.config.batch_size)
            .await
            .map_err(|e| Error::mongo_query(&self.config.collection, "Find failed", e))?;

        let documents: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| Error::mongo_query(&self.config.collection, "Cursor iteration failed", e))?;

        debug!(
            "Fetched {} documents from {}",
            documents.len(),
            self.config.collection
        );
        Ok(documents)
    }
}

/// Mask sensitive parts of a connection URI for logging.
pub(crate) fn mask_uri(uri: &str) -> String {
    if let Ok(mut parsed) = url::Url::parse(uri) {
        if parsed.password().is_some() {
            let _ = parsed.set_password(Some("***"));
        }
        parsed.to_string()
    } else {
        "[invalid uri]".to_string()
    }
}
