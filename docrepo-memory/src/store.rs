//! In-memory storage implementation of the collection backend.
//!
//! Collections keep their documents in insertion order behind async-aware read-write
//! locks. Every single-document write takes the collection's write lock for its whole
//! read-modify-write cycle, so `$inc`, `$push` and `$pop` are atomic per call.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use futures::{StreamExt, executor::block_on, stream};
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};

use docrepo_core::{
    backend::{
        BlockingCollectionBackend, CollectionBackend, DocumentIter, DocumentStream, FindOptions, ReturnDocument,
        StoreBackendBuilder, UpdateOutcome,
    },
    codec::ID_KEY,
    error::{RepositoryError, RepositoryResult},
    index::IndexSpec,
};

use crate::evaluator::{DocumentEvaluator, apply_update, values_equal};

/// Thread-safe in-memory document store.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, so clones
/// share the same collections.
///
/// # Performance
///
/// Finds scan every document of the collection; indexes only enforce uniqueness.
/// For larger datasets use the MongoDB backend.
///
/// # Example
///
/// ```ignore
/// use docrepo_memory::InMemoryStore;
/// use docrepo::backend::CollectionBackend;
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///     let users = store.collection("users");
///
///     let id = users.insert_one(doc! { "name": "Alice", "age": 30 }).await?;
///     assert!(users.find_one(doc! { "_id": id }).await?.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    collections: Arc<RwLock<HashMap<String, InMemoryCollection>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Returns a handle to the collection named `name`, creating it on first use.
    ///
    /// Handles to the same name share their documents.
    pub fn collection(&self, name: &str) -> InMemoryCollection {
        let mut collections = block_on(self.collections.write());

        collections
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(collection = name, "collection created");
                InMemoryCollection::new(name)
            })
            .clone()
    }

    /// Lists the names of the collections created so far.
    pub async fn list_collections(&self) -> Vec<String> {
        self.collections
            .read()
            .await
            .keys()
            .cloned()
            .collect()
    }

    /// Drops a collection and its documents. Existing handles keep the old documents.
    pub async fn drop_collection(&self, name: &str) -> bool {
        self.collections
            .write()
            .await
            .remove(name)
            .is_some()
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// ```ignore
/// use docrepo_memory::InMemoryStore;
/// use docrepo::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().collection("users").build().await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    collections: Vec<String>,
}

impl InMemoryStoreBuilder {
    /// Pre-creates a collection.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collections.push(name.into());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Store = InMemoryStore;

    /// Builds a fresh store. Always succeeds.
    async fn build(self) -> RepositoryResult<Self::Store> {
        let store = InMemoryStore::new();
        {
            let mut collections = store.collections.write().await;
            for name in self.collections {
                collections.insert(name.clone(), InMemoryCollection::new(&name));
            }
        }

        Ok(store)
    }
}

#[derive(Debug, Default)]
struct CollectionState {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

/// A handle to one in-memory collection. Clones share the same documents.
#[derive(Clone, Debug)]
pub struct InMemoryCollection {
    name: String,
    state: Arc<RwLock<CollectionState>>,
}

impl InMemoryCollection {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(RwLock::new(CollectionState::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.state.read().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl CollectionState {
    fn position(&self, filter: &Document) -> RepositoryResult<Option<usize>> {
        for (index, document) in self.documents.iter().enumerate() {
            if DocumentEvaluator::new(document).matches(filter)? {
                return Ok(Some(index));
            }
        }

        Ok(None)
    }

    fn duplicate(&self, collection: &str, candidate: &Document, skip: Option<usize>) -> RepositoryResult<()> {
        let id_index = IndexSpec::new(ID_KEY).unique(true);
        let unique = std::iter::once(&id_index).chain(self.indexes.iter().filter(|index| index.unique));

        for index in unique {
            let value = candidate.get(&index.field).unwrap_or(&Bson::Null);

            let clash = self
                .documents
                .iter()
                .enumerate()
                .filter(|(position, _)| Some(*position) != skip)
                .any(|(_, other)| values_equal(other.get(&index.field).unwrap_or(&Bson::Null), value));

            if clash {
                return Err(RepositoryError::DuplicateKey {
                    key: format!("{}: {value}", index.field),
                    collection: collection.to_string(),
                });
            }
        }

        Ok(())
    }

    fn insert_one(&mut self, collection: &str, mut document: Document) -> RepositoryResult<Bson> {
        if !document.contains_key(ID_KEY) {
            let mut with_id = Document::new();
            with_id.insert(ID_KEY, ObjectId::new());
            with_id.extend(document);
            document = with_id;
        }

        self.duplicate(collection, &document, None)?;

        let id = document
            .get(ID_KEY)
            .cloned()
            .unwrap_or(Bson::Null);
        self.documents.push(document);

        Ok(id)
    }

    fn find(&self, filter: &Document, options: FindOptions) -> RepositoryResult<Vec<Document>> {
        let skip = usize::try_from(options.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = match options.limit {
            Some(limit) if limit != 0 => usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX),
            _ => usize::MAX,
        };

        let mut matched = Vec::new();
        for document in &self.documents {
            if DocumentEvaluator::new(document).matches(filter)? {
                matched.push(document);
            }
        }

        Ok(matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }

    fn find_one(&self, filter: &Document) -> RepositoryResult<Option<Document>> {
        Ok(self
            .position(filter)?
            .map(|index| self.documents[index].clone()))
    }

    /// Applies `update` to the first match, returning the document before and after.
    fn modify_first(
        &mut self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> RepositoryResult<Option<(Document, Document)>> {
        let Some(index) = self.position(filter)? else {
            return Ok(None);
        };

        let before = self.documents[index].clone();
        let mut after = before.clone();
        apply_update(&mut after, update)?;
        self.duplicate(collection, &after, Some(index))?;

        self.documents[index] = after.clone();
        Ok(Some((before, after)))
    }

    fn find_one_and_delete(&mut self, filter: &Document) -> RepositoryResult<Option<Document>> {
        Ok(self
            .position(filter)?
            .map(|index| self.documents.remove(index)))
    }

    fn create_index(&mut self, collection: &str, index: &IndexSpec) -> RepositoryResult<String> {
        let name = index.resolved_name();

        if let Some(existing) = self
            .indexes
            .iter()
            .find(|existing| existing.resolved_name() == name)
        {
            if existing.field == index.field && existing.direction == index.direction && existing.unique == index.unique
            {
                return Ok(name);
            }
            return Err(RepositoryError::Backend(format!(
                "index {name} already exists on {collection} with different options"
            )));
        }

        if index.unique {
            for (position, document) in self.documents.iter().enumerate() {
                let probe = CollectionState {
                    documents: self.documents[..position].to_vec(),
                    indexes: vec![index.clone()],
                };
                probe.duplicate(collection, document, None)?;
            }
        }

        self.indexes.push(index.clone());
        Ok(name)
    }
}

fn pick(returning: ReturnDocument, modified: Option<(Document, Document)>) -> Option<Document> {
    modified.map(|(before, after)| match returning {
        ReturnDocument::Before => before,
        ReturnDocument::After => after,
    })
}

fn outcome(modified: Option<(Document, Document)>) -> UpdateOutcome {
    match modified {
        Some((before, after)) => UpdateOutcome {
            matched: 1,
            modified: u64::from(before != after),
        },
        None => UpdateOutcome::default(),
    }
}

#[async_trait]
impl CollectionBackend for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, document: Document) -> RepositoryResult<Bson> {
        self.state
            .write()
            .await
            .insert_one(&self.name, document)
    }

    async fn find(&self, filter: Document, options: FindOptions) -> RepositoryResult<DocumentStream> {
        let documents = self
            .state
            .read()
            .await
            .find(&filter, options)?;

        Ok(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    async fn find_one(&self, filter: Document) -> RepositoryResult<Option<Document>> {
        self.state.read().await.find_one(&filter)
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        returning: ReturnDocument,
    ) -> RepositoryResult<Option<Document>> {
        let modified = self
            .state
            .write()
            .await
            .modify_first(&self.name, &filter, &update)?;

        Ok(pick(returning, modified))
    }

    async fn find_one_and_delete(&self, filter: Document) -> RepositoryResult<Option<Document>> {
        self.state
            .write()
            .await
            .find_one_and_delete(&filter)
    }

    async fn update_one(&self, filter: Document, update: Document) -> RepositoryResult<UpdateOutcome> {
        let modified = self
            .state
            .write()
            .await
            .modify_first(&self.name, &filter, &update)?;

        Ok(outcome(modified))
    }

    async fn create_index(&self, index: &IndexSpec) -> RepositoryResult<String> {
        self.state
            .write()
            .await
            .create_index(&self.name, index)
    }
}

impl BlockingCollectionBackend for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert_one(&self, document: Document) -> RepositoryResult<Bson> {
        block_on(self.state.write()).insert_one(&self.name, document)
    }

    fn find(&self, filter: Document, options: FindOptions) -> RepositoryResult<DocumentIter> {
        let documents = block_on(self.state.read()).find(&filter, options)?;

        Ok(Box::new(documents.into_iter().map(Ok)))
    }

    fn find_one(&self, filter: Document) -> RepositoryResult<Option<Document>> {
        block_on(self.state.read()).find_one(&filter)
    }

    fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        returning: ReturnDocument,
    ) -> RepositoryResult<Option<Document>> {
        let modified = block_on(self.state.write()).modify_first(&self.name, &filter, &update)?;

        Ok(pick(returning, modified))
    }

    fn find_one_and_delete(&self, filter: Document) -> RepositoryResult<Option<Document>> {
        block_on(self.state.write()).find_one_and_delete(&filter)
    }

    fn update_one(&self, filter: Document, update: Document) -> RepositoryResult<UpdateOutcome> {
        let modified = block_on(self.state.write()).modify_first(&self.name, &filter, &update)?;

        Ok(outcome(modified))
    }

    fn create_index(&self, index: &IndexSpec) -> RepositoryResult<String> {
        block_on(self.state.write()).create_index(&self.name, index)
    }
}
