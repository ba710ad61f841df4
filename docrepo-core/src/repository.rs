//! The async repository: generated methods bound to one collection.

use async_trait::async_trait;
use bson::Bson;
use futures::TryStreamExt;
use std::{fmt, sync::Arc};

use crate::{
    backend::CollectionBackend,
    capability::{Adder, Deleter, FieldMutator, Reader, Updater},
    dto::{Dto, DtoDescriptor},
    error::RepositoryResult,
    filter::Filter,
    index::ensure_index,
    methods::{DtoStream, ListArgs, execute},
    signature::{AdaptedSignature, CallArgs, CallOutput},
    wiring::{MethodTable, PreparedCall, RepositoryBuilder, Wired},
};

/// A repository whose generated methods suspend on the store call.
///
/// Built with [`Repository::builder`]; the method table is frozen once built.
pub struct Repository<D, C> {
    collection: C,
    descriptor: Arc<DtoDescriptor>,
    table: MethodTable<D>,
}

impl<D: Dto, C: CollectionBackend> RepositoryBuilder<D, C> {
    /// Wires the repository and creates its index, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns wiring errors (`Configuration`, `InvalidDescriptor`, `FieldNotFound`,
    /// `MissingAnnotation`, `InvalidMethodName`) and passes index creation errors through.
    pub async fn build(self) -> RepositoryResult<Repository<D, C>> {
        let Wired {
            collection,
            descriptor,
            table,
            index,
        } = self.wire()?;

        if let Some(index) = &index {
            ensure_index(&collection, index).await?;
        }

        Ok(Repository {
            collection,
            descriptor,
            table,
        })
    }
}

impl<D: Dto, C: CollectionBackend> Repository<D, C> {
    pub fn builder() -> RepositoryBuilder<D, C> {
        RepositoryBuilder::new()
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }

    pub fn descriptor(&self) -> &DtoDescriptor {
        &self.descriptor
    }

    /// Every attached method name, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        self.table.names().collect()
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.table.contains(name)
    }

    /// The adapted signature attached under `name`, if the method was substituted.
    pub fn signature(&self, name: &str) -> Option<&AdaptedSignature> {
        self.table.signature(name)
    }

    /// Calls an attached method by name.
    ///
    /// Arguments are mapped through the method's declared signature when it has one.
    /// `get_all` results are collected.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMethodName` or `MethodNotEnabled` for names that are not attached,
    /// `UnexpectedArgument` when the arguments do not fit, and the method's own errors.
    pub async fn invoke(&self, name: &str, args: CallArgs) -> RepositoryResult<CallOutput<D>> {
        match self.table.prepare_call(name, args)? {
            PreparedCall::Single { command, finish } => {
                tracing::trace!(collection = self.collection.name(), method = name, "invoking");
                let reply = self.collection.execute(command).await?;
                finish(reply)
            }
            PreparedCall::All { plan, filter } => {
                let dtos = plan
                    .stream(&self.collection, filter)
                    .await?
                    .try_collect()
                    .await?;
                Ok(CallOutput::Dtos(dtos))
            }
        }
    }
}

impl<D, C: fmt::Debug> fmt::Debug for Repository<D, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("dto", &self.descriptor.name())
            .field("collection", &self.collection)
            .field("methods", &self.table)
            .finish()
    }
}

#[async_trait]
impl<D: Dto, C: CollectionBackend> Adder<D> for Repository<D, C> {
    async fn add(&self, dto: D) -> RepositoryResult<D> {
        execute(self.table.add()?, &self.collection, dto).await
    }
}

#[async_trait]
impl<D: Dto, C: CollectionBackend> Reader<D> for Repository<D, C> {
    async fn get(&self, filter: Filter) -> RepositoryResult<Option<D>> {
        execute(self.table.get()?, &self.collection, filter).await
    }

    async fn get_list(&self, offset: u64, limit: u64) -> RepositoryResult<Vec<D>> {
        execute(self.table.get_list()?, &self.collection, ListArgs { offset, limit }).await
    }

    async fn get_all(&self, filter: Filter) -> RepositoryResult<DtoStream<D>> {
        self.table
            .get_all()?
            .stream(&self.collection, filter)
            .await
    }
}

#[async_trait]
impl<D: Dto, C: CollectionBackend> Updater<D> for Repository<D, C> {
    async fn update(&self, dto: D, filter: Filter) -> RepositoryResult<Option<D>> {
        execute(self.table.update()?, &self.collection, (dto, filter)).await
    }

    async fn update_field(&self, field: &str, value: Bson, filter: Filter) -> RepositoryResult<Option<D>> {
        execute(
            self.table.update_field()?,
            &self.collection,
            (field.to_string(), value, filter),
        )
        .await
    }
}

#[async_trait]
impl<D: Dto, C: CollectionBackend> Deleter<D> for Repository<D, C> {
    async fn delete(&self, filter: Filter) -> RepositoryResult<bool> {
        execute(self.table.delete()?, &self.collection, filter).await
    }
}

#[async_trait]
impl<D: Dto, C: CollectionBackend> FieldMutator for Repository<D, C> {
    async fn increment(&self, field: &str, weight: Option<i64>, filter: Filter) -> RepositoryResult<()> {
        execute(self.table.increment(field)?, &self.collection, (weight, filter)).await
    }

    async fn decrement(&self, field: &str, weight: Option<i64>, filter: Filter) -> RepositoryResult<()> {
        execute(self.table.decrement(field)?, &self.collection, (weight, filter)).await
    }

    async fn append(&self, field: &str, value: Bson, filter: Filter) -> RepositoryResult<()> {
        execute(self.table.append(field)?, &self.collection, (value, filter)).await
    }

    async fn remove(&self, field: &str, value: Bson, filter: Filter) -> RepositoryResult<()> {
        execute(self.table.remove(field)?, &self.collection, (value, filter)).await
    }

    async fn pop(&self, field: &str, filter: Filter) -> RepositoryResult<Option<Bson>> {
        execute(self.table.pop(field)?, &self.collection, filter).await
    }
}
