//! Blocking MongoDB backend, built on the driver's `sync` API.
//!
//! ```ignore
//! use docrepo::{blocking::Repository, mongodb::sync::MongoDbSyncStore};
//!
//! let store = MongoDbSyncStore::connect("mongodb://localhost:27017", "my_database")?;
//! let repo = Repository::<User, _>::builder()
//!     .collection(store.collection("users"))
//!     .build_blocking()?;
//! ```

use bson::{Bson, Document};
use mongodb::sync::{Client, Collection};

use docrepo_core::{
    backend::{BlockingCollectionBackend, DocumentIter, FindOptions, ReturnDocument, UpdateOutcome},
    error::{RepositoryError, RepositoryResult},
    index::IndexSpec,
};

use crate::{
    error::backend_error,
    store::{driver_return_document, index_model},
};

/// A blocking connection to one MongoDB database.
#[derive(Debug, Clone)]
pub struct MongoDbSyncStore {
    client: Client,
    database: String,
}

impl MongoDbSyncStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    /// Connects with a connection string.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the connection string cannot be parsed.
    pub fn connect(dsn: &str, database: &str) -> RepositoryResult<Self> {
        Ok(Self::new(
            Client::with_uri_str(dsn).map_err(|e| RepositoryError::Configuration(e.to_string()))?,
            database.to_string(),
        ))
    }

    pub fn collection(&self, name: &str) -> MongoDbSyncCollection {
        MongoDbSyncCollection {
            name: name.to_string(),
            inner: self
                .client
                .database(&self.database)
                .collection(name),
        }
    }
}

/// A MongoDB collection usable as a blocking repository backend.
#[derive(Debug, Clone)]
pub struct MongoDbSyncCollection {
    name: String,
    inner: Collection<Document>,
}

impl MongoDbSyncCollection {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl BlockingCollectionBackend for MongoDbSyncCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert_one(&self, document: Document) -> RepositoryResult<Bson> {
        Ok(self
            .inner
            .insert_one(document)
            .run()
            .map_err(|e| backend_error(e, &self.name))?
            .inserted_id)
    }

    fn find(&self, filter: Document, options: FindOptions) -> RepositoryResult<DocumentIter> {
        let mut find = self.inner.find(filter);
        if let Some(skip) = options.skip {
            find = find.skip(skip);
        }
        if let Some(limit) = options.limit {
            find = find.limit(limit);
        }

        let name = self.name.clone();
        let cursor = find
            .run()
            .map_err(|e| backend_error(e, &self.name))?;

        Ok(Box::new(
            cursor.map(move |document| document.map_err(|e| backend_error(e, &name))),
        ))
    }

    fn find_one(&self, filter: Document) -> RepositoryResult<Option<Document>> {
        self.inner
            .find_one(filter)
            .run()
            .map_err(|e| backend_error(e, &self.name))
    }

    fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        returning: ReturnDocument,
    ) -> RepositoryResult<Option<Document>> {
        self.inner
            .find_one_and_update(filter, update)
            .return_document(driver_return_document(returning))
            .run()
            .map_err(|e| backend_error(e, &self.name))
    }

    fn find_one_and_delete(&self, filter: Document) -> RepositoryResult<Option<Document>> {
        self.inner
            .find_one_and_delete(filter)
            .run()
            .map_err(|e| backend_error(e, &self.name))
    }

    fn update_one(&self, filter: Document, update: Document) -> RepositoryResult<UpdateOutcome> {
        let result = self
            .inner
            .update_one(filter, update)
            .run()
            .map_err(|e| backend_error(e, &self.name))?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    fn create_index(&self, index: &IndexSpec) -> RepositoryResult<String> {
        let created = self
            .inner
            .create_index(index_model(index))
            .run()
            .map_err(|e| backend_error(e, &self.name))?;

        Ok(created.index_name)
    }
}
