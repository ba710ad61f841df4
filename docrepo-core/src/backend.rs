//! Collection backend abstraction.
//!
//! This module defines the traits that abstract over a single collection of a document
//! store, allowing generated repository methods to run against different implementations
//! (in-memory, MongoDB, ...).
//!
//! # Overview
//!
//! The [`CollectionBackend`] trait provides the async primitives the generated methods are
//! built from: insert, find, find-one, find-and-modify, update and index creation.
//! [`BlockingCollectionBackend`] mirrors it for synchronous callers. Both accept a
//! [`Command`] through `execute`, which is how a prepared method plan reaches the store
//! without caring whether the call is async or blocking.
//!
//! # Traits
//!
//! - [`CollectionBackend`]: Async primitives over one collection
//! - [`BlockingCollectionBackend`]: Blocking primitives over one collection
//! - [`StoreBackendBuilder`]: Factory trait for creating store instances
//!
//! # Examples
//!
//! ```ignore
//! use docrepo::backend::{CollectionBackend, FindOptions};
//! use bson::doc;
//!
//! let collection = store.collection("users");
//!
//! let id = collection.insert_one(doc! { "name": "Alice", "age": 30 }).await?;
//! let found = collection.find_one(doc! { "_id": id }).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{TryStreamExt, stream::BoxStream};
use std::{fmt::Debug, sync::Arc};

use crate::{error::RepositoryResult, index::IndexSpec};

/// A lazy stream of raw documents produced by an async find.
pub type DocumentStream = BoxStream<'static, RepositoryResult<Document>>;

/// A lazy iterator of raw documents produced by a blocking find.
pub type DocumentIter = Box<dyn Iterator<Item = RepositoryResult<Document>> + Send>;

/// Which version of a document a find-and-modify returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    /// The document as it was before the modification.
    Before,
    /// The document as it is after the modification.
    #[default]
    After,
}

/// Paging options for [`CollectionBackend::find`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

impl FindOptions {
    /// Creates options that skip `skip` documents and return at most `limit`.
    pub fn page(skip: u64, limit: u64) -> Self {
        Self {
            skip: Some(skip),
            limit: Some(i64::try_from(limit).unwrap_or(i64::MAX)),
        }
    }
}

/// Counts reported by an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

/// A single store request prepared by a generated method.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    InsertOne(Document),
    FindOne(Document),
    /// Collected eagerly into [`Reply::Documents`].
    Find(Document, FindOptions),
    FindOneAndUpdate {
        filter: Document,
        update: Document,
        returning: ReturnDocument,
    },
    FindOneAndDelete(Document),
    UpdateOne {
        filter: Document,
        update: Document,
    },
}

/// The store's answer to a [`Command`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The identifier of the inserted document.
    Inserted(Bson),
    Document(Option<Document>),
    Documents(Vec<Document>),
    Updated(UpdateOutcome),
}

impl Reply {
    /// Extracts a single optional document, treating any other reply as a backend fault.
    pub fn into_document(self) -> RepositoryResult<Option<Document>> {
        match self {
            Reply::Document(document) => Ok(document),
            other => Err(unexpected_reply("a document", &other)),
        }
    }

    /// Extracts a list of documents.
    pub fn into_documents(self) -> RepositoryResult<Vec<Document>> {
        match self {
            Reply::Documents(documents) => Ok(documents),
            other => Err(unexpected_reply("documents", &other)),
        }
    }

    /// Extracts the inserted identifier.
    pub fn into_inserted(self) -> RepositoryResult<Bson> {
        match self {
            Reply::Inserted(id) => Ok(id),
            other => Err(unexpected_reply("an inserted id", &other)),
        }
    }

    /// Extracts update counts.
    pub fn into_updated(self) -> RepositoryResult<UpdateOutcome> {
        match self {
            Reply::Updated(outcome) => Ok(outcome),
            other => Err(unexpected_reply("update counts", &other)),
        }
    }
}

fn unexpected_reply(expected: &str, reply: &Reply) -> crate::error::RepositoryError {
    crate::error::RepositoryError::Backend(format!("expected {expected}, got {reply:?}"))
}

/// Async interface to one collection of a document store.
///
/// # Thread Safety
///
/// Implementations must be thread-safe; generated methods may be called concurrently
/// from many tasks against one collection handle. Atomicity of each single-document
/// operation is delegated to the store.
#[async_trait]
pub trait CollectionBackend: Send + Sync + Debug {
    /// Returns the collection name.
    fn name(&self) -> &str;

    /// Inserts a document, returning the identifier the store keeps under `_id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RepositoryError::DuplicateKey`] if a unique index rejects the write.
    async fn insert_one(&self, document: Document) -> RepositoryResult<Bson>;

    /// Returns a lazy stream over the documents matching `filter`.
    async fn find(&self, filter: Document, options: FindOptions) -> RepositoryResult<DocumentStream>;

    /// Returns the first document matching `filter`.
    async fn find_one(&self, filter: Document) -> RepositoryResult<Option<Document>>;

    /// Atomically applies `update` to the first match and returns it in the state
    /// selected by `returning`.
    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        returning: ReturnDocument,
    ) -> RepositoryResult<Option<Document>>;

    /// Atomically removes the first match and returns it.
    async fn find_one_and_delete(&self, filter: Document) -> RepositoryResult<Option<Document>>;

    /// Applies `update` to the first match.
    async fn update_one(&self, filter: Document, update: Document) -> RepositoryResult<UpdateOutcome>;

    /// Creates an index, returning its name. Creating an identical index again is a no-op.
    async fn create_index(&self, index: &IndexSpec) -> RepositoryResult<String>;

    /// Runs a prepared [`Command`].
    async fn execute(&self, command: Command) -> RepositoryResult<Reply> {
        Ok(match command {
            Command::InsertOne(document) => Reply::Inserted(self.insert_one(document).await?),
            Command::FindOne(filter) => Reply::Document(self.find_one(filter).await?),
            Command::Find(filter, options) => Reply::Documents(
                self.find(filter, options)
                    .await?
                    .try_collect()
                    .await?,
            ),
            Command::FindOneAndUpdate { filter, update, returning } => Reply::Document(
                self.find_one_and_update(filter, update, returning)
                    .await?,
            ),
            Command::FindOneAndDelete(filter) => Reply::Document(self.find_one_and_delete(filter).await?),
            Command::UpdateOne { filter, update } => Reply::Updated(self.update_one(filter, update).await?),
        })
    }
}

/// Blocking interface to one collection of a document store.
///
/// Same contract as [`CollectionBackend`], for callers without an async runtime.
pub trait BlockingCollectionBackend: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn insert_one(&self, document: Document) -> RepositoryResult<Bson>;

    fn find(&self, filter: Document, options: FindOptions) -> RepositoryResult<DocumentIter>;

    fn find_one(&self, filter: Document) -> RepositoryResult<Option<Document>>;

    fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        returning: ReturnDocument,
    ) -> RepositoryResult<Option<Document>>;

    fn find_one_and_delete(&self, filter: Document) -> RepositoryResult<Option<Document>>;

    fn update_one(&self, filter: Document, update: Document) -> RepositoryResult<UpdateOutcome>;

    fn create_index(&self, index: &IndexSpec) -> RepositoryResult<String>;

    fn execute(&self, command: Command) -> RepositoryResult<Reply> {
        Ok(match command {
            Command::InsertOne(document) => Reply::Inserted(self.insert_one(document)?),
            Command::FindOne(filter) => Reply::Document(self.find_one(filter)?),
            Command::Find(filter, options) => {
                Reply::Documents(self.find(filter, options)?.collect::<RepositoryResult<_>>()?)
            }
            Command::FindOneAndUpdate { filter, update, returning } => {
                Reply::Document(self.find_one_and_update(filter, update, returning)?)
            }
            Command::FindOneAndDelete(filter) => Reply::Document(self.find_one_and_delete(filter)?),
            Command::UpdateOne { filter, update } => Reply::Updated(self.update_one(filter, update)?),
        })
    }
}

#[async_trait]
impl<B> CollectionBackend for Arc<B>
where
    B: CollectionBackend + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn insert_one(&self, document: Document) -> RepositoryResult<Bson> {
        (**self).insert_one(document).await
    }

    async fn find(&self, filter: Document, options: FindOptions) -> RepositoryResult<DocumentStream> {
        (**self).find(filter, options).await
    }

    async fn find_one(&self, filter: Document) -> RepositoryResult<Option<Document>> {
        (**self).find_one(filter).await
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        returning: ReturnDocument,
    ) -> RepositoryResult<Option<Document>> {
        (**self)
            .find_one_and_update(filter, update, returning)
            .await
    }

    async fn find_one_and_delete(&self, filter: Document) -> RepositoryResult<Option<Document>> {
        (**self).find_one_and_delete(filter).await
    }

    async fn update_one(&self, filter: Document, update: Document) -> RepositoryResult<UpdateOutcome> {
        (**self).update_one(filter, update).await
    }

    async fn create_index(&self, index: &IndexSpec) -> RepositoryResult<String> {
        (**self).create_index(index).await
    }
}

impl<B> BlockingCollectionBackend for Arc<B>
where
    B: BlockingCollectionBackend + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn insert_one(&self, document: Document) -> RepositoryResult<Bson> {
        (**self).insert_one(document)
    }

    fn find(&self, filter: Document, options: FindOptions) -> RepositoryResult<DocumentIter> {
        (**self).find(filter, options)
    }

    fn find_one(&self, filter: Document) -> RepositoryResult<Option<Document>> {
        (**self).find_one(filter)
    }

    fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        returning: ReturnDocument,
    ) -> RepositoryResult<Option<Document>> {
        (**self).find_one_and_update(filter, update, returning)
    }

    fn find_one_and_delete(&self, filter: Document) -> RepositoryResult<Option<Document>> {
        (**self).find_one_and_delete(filter)
    }

    fn update_one(&self, filter: Document, update: Document) -> RepositoryResult<UpdateOutcome> {
        (**self).update_one(filter, update)
    }

    fn create_index(&self, index: &IndexSpec) -> RepositoryResult<String> {
        (**self).create_index(index)
    }
}

/// Factory trait for creating store instances from connection settings.
#[async_trait]
pub trait StoreBackendBuilder {
    type Store;

    async fn build(self) -> RepositoryResult<Self::Store>;
}
