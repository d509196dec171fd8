//! Database module - MongoDB job ledger

use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{self, doc, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};

use crate::models::{JobOutcome, JobRecord, JobStatus};

/// Give up on server selection after this long, so startup fails fast
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("MongoDB Connection Error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("Failed to encode job update: {0}")]
    Encode(#[from] bson::ser::Error),

    #[error("No pending job with id {0}")]
    NotFound(String),
}

/// Write side of the job ledger, plus lookup by id
#[async_trait]
pub trait JobLedger: Send + Sync {
    /// Insert a new record
    async fn create(&self, record: &JobRecord) -> Result<(), LedgerError>;

    /// Move a PENDING record to its terminal status
    async fn update(&self, id: &str, outcome: &JobOutcome) -> Result<(), LedgerError>;

    async fn find(&self, id: &str) -> Result<Option<JobRecord>, LedgerError>;
}

/// Ledger backed by a single MongoDB collection
#[derive(Clone)]
pub struct MongoLedger {
    collection: Collection<JobRecord>,
}

/// Connect and verify the server answers a ping
pub async fn connect(uri: &str, database: &str, collection: &str) -> Result<MongoLedger, LedgerError> {
    let mut options = ClientOptions::parse(uri).await?;
    options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);
    options.app_name = Some(env!("CARGO_PKG_NAME").to_string());

    let client = Client::with_options(options)?;
    let db = client.database(database);
    db.run_command(doc! { "ping": 1 }).await?;

    tracing::info!("Connected to MongoDB database: {}", database);

    Ok(MongoLedger {
        collection: db.collection(collection),
    })
}

#[async_trait]
impl JobLedger for MongoLedger {
    async fn create(&self, record: &JobRecord) -> Result<(), LedgerError> {
        self.collection.insert_one(record).await?;
        Ok(())
    }

    async fn update(&self, id: &str, outcome: &JobOutcome) -> Result<(), LedgerError> {
        let result = self
            .collection
            .update_one(pending_filter(id)?, outcome_update(outcome)?)
            .await?;

        if result.matched_count == 0 {
            return Err(LedgerError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Option<JobRecord>, LedgerError> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }
}

// Helper functions

/// Matches the job only while it is still PENDING
fn pending_filter(id: &str) -> Result<Document, LedgerError> {
    Ok(doc! { "_id": id, "status": bson::to_bson(&JobStatus::Pending)? })
}

fn outcome_update(outcome: &JobOutcome) -> Result<Document, LedgerError> {
    Ok(doc! { "$set": bson::to_document(outcome)? })
}
