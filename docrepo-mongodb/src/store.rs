use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    Client, Collection, IndexModel,
    options::{ClientOptions, IndexOptions, ReturnDocument as DriverReturnDocument},
};

use docrepo_core::{
    backend::{CollectionBackend, DocumentStream, FindOptions, ReturnDocument, StoreBackendBuilder, UpdateOutcome},
    error::{RepositoryError, RepositoryResult},
    index::IndexSpec,
};

use crate::error::backend_error;

/// A connection to one MongoDB database.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    /// Returns a handle to the collection named `name`.
    pub fn collection(&self, name: &str) -> MongoDbCollection {
        MongoDbCollection {
            name: name.to_string(),
            inner: self
                .client
                .database(&self.database)
                .collection(name),
        }
    }

    pub async fn list_collections(&self) -> RepositoryResult<Vec<String>> {
        self.client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(|e| RepositoryError::Backend(e.to_string()))
    }

    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }
}

/// A MongoDB collection usable as a repository backend.
#[derive(Debug, Clone)]
pub struct MongoDbCollection {
    name: String,
    inner: Collection<Document>,
}

impl MongoDbCollection {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying driver collection.
    pub fn inner(&self) -> &Collection<Document> {
        &self.inner
    }
}

pub(crate) fn driver_return_document(returning: ReturnDocument) -> DriverReturnDocument {
    match returning {
        ReturnDocument::Before => DriverReturnDocument::Before,
        ReturnDocument::After => DriverReturnDocument::After,
    }
}

pub(crate) fn index_model(index: &IndexSpec) -> IndexModel {
    IndexModel::builder()
        .keys(index.keys())
        .options(
            IndexOptions::builder()
                .unique(index.unique)
                .name(index.resolved_name())
                .build(),
        )
        .build()
}

#[async_trait]
impl CollectionBackend for MongoDbCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, document: Document) -> RepositoryResult<Bson> {
        Ok(self
            .inner
            .insert_one(document)
            .await
            .map_err(|e| backend_error(e, &self.name))?
            .inserted_id)
    }

    async fn find(&self, filter: Document, options: FindOptions) -> RepositoryResult<DocumentStream> {
        let mut find = self.inner.find(filter);
        if let Some(skip) = options.skip {
            find = find.skip(skip);
        }
        if let Some(limit) = options.limit {
            find = find.limit(limit);
        }

        let name = self.name.clone();
        Ok(find
            .await
            .map_err(|e| backend_error(e, &self.name))?
            .map_err(move |e| backend_error(e, &name))
            .boxed())
    }

    async fn find_one(&self, filter: Document) -> RepositoryResult<Option<Document>> {
        self.inner
            .find_one(filter)
            .await
            .map_err(|e| backend_error(e, &self.name))
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        returning: ReturnDocument,
    ) -> RepositoryResult<Option<Document>> {
        self.inner
            .find_one_and_update(filter, update)
            .return_document(driver_return_document(returning))
            .await
            .map_err(|e| backend_error(e, &self.name))
    }

    async fn find_one_and_delete(&self, filter: Document) -> RepositoryResult<Option<Document>> {
        self.inner
            .find_one_and_delete(filter)
            .await
            .map_err(|e| backend_error(e, &self.name))
    }

    async fn update_one(&self, filter: Document, update: Document) -> RepositoryResult<UpdateOutcome> {
        let result = self
            .inner
            .update_one(filter, update)
            .await
            .map_err(|e| backend_error(e, &self.name))?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn create_index(&self, index: &IndexSpec) -> RepositoryResult<String> {
        let created = self
            .inner
            .create_index(index_model(index))
            .await
            .map_err(|e| backend_error(e, &self.name))?;

        Ok(created.index_name)
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Store = MongoDbStore;

    async fn build(self) -> RepositoryResult<Self::Store> {
        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| RepositoryError::Configuration(e.to_string()))?,
            )
            .map_err(|e| RepositoryError::Configuration(e.to_string()))?,
            self.database,
        ))
    }
}
