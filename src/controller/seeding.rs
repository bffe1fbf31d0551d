//! Test data seeding.
//!
//! A case whose workload declares `testData` gets its target collection
//! dropped and reloaded before the workload executor starts, so every run of
//! the executor observes the same initial documents.

use async_trait::async_trait;
use mongodb::bson;
use mongodb::options::{Acknowledgment, CollectionOptions, WriteConcern};
use tracing::{debug, info, instrument};

use crate::controller::error::{Error, Result};
use crate::document::Document;

/// Loads a case's test data into its cluster.
#[async_trait]
pub trait DataSeeder: Send + Sync {
    /// Replace the contents of `database.collection` with `documents`.
    async fn seed(
        &self,
        connection_string: &str,
        database: &str,
        collection: &str,
        documents: &[Document],
    ) -> Result<()>;
}

/// Seeder talking to the cluster with the MongoDB driver. Writes use majority
/// write concern.
#[derive(Clone, Copy, Debug, Default)]
pub struct MongoSeeder;

#[async_trait]
impl DataSeeder for MongoSeeder {
    #[instrument(skip(self, connection_string, documents), fields(count = documents.len()))]
    async fn seed(
        &self,
        connection_string: &str,
        database: &str,
        collection: &str,
        documents: &[Document],
    ) -> Result<()> {
        let documents = to_bson_documents(documents)?;

        let client = mongodb::Client::with_uri_str(connection_string)
            .await
            .map_err(|e| Error::Seed(format!("connecting: {e}")))?;
        let write_concern = WriteConcern::builder().w(Acknowledgment::Majority).build();
        let options = CollectionOptions::builder()
            .write_concern(write_concern)
            .build();
        let target = client
            .database(database)
            .collection_with_options::<bson::Document>(collection, options);

        target
            .drop()
            .await
            .map_err(|e| Error::Seed(format!("dropping {database}.{collection}: {e}")))?;
        debug!("Collection dropped");

        if !documents.is_empty() {
            target
                .insert_many(documents)
                .await
                .map_err(|e| Error::Seed(format!("inserting into {database}.{collection}: {e}")))?;
        }
        info!("Loaded test data");
        Ok(())
    }
}

/// Convert JSON test documents to BSON, rejecting anything but mappings.
pub fn to_bson_documents(documents: &[Document]) -> Result<Vec<bson::Document>> {
    documents
        .iter()
        .enumerate()
        .map(|(index, document)| {
            bson::to_document(document)
                .map_err(|e| Error::Seed(format!("testData[{index}] is not a document: {e}")))
        })
        .collect()
}
