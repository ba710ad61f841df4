//! Blocking repositories and capability interfaces.
//!
//! Mirrors [`crate::repository`] and [`crate::capability`] for callers without an async
//! runtime. The generated methods are the same plans; only the store call differs.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::blocking::{Adder, Reader, Repository};
//!
//! let repo = Repository::<User, _>::builder()
//!     .collection(store.collection("users"))
//!     .build_blocking()?;
//!
//! let user = repo.add(User { id: String::new(), name: "ann".into(), visits: 0 })?;
//! let found = repo.get(Filter::new().eq("name", "ann"))?;
//! ```

use bson::Bson;
use std::{fmt, sync::Arc};

use crate::{
    backend::BlockingCollectionBackend,
    dto::{Dto, DtoDescriptor},
    error::RepositoryResult,
    filter::Filter,
    index::ensure_index_blocking,
    methods::{DtoIter, ListArgs, execute_blocking},
    signature::{AdaptedSignature, CallArgs, CallOutput},
    wiring::{MethodTable, PreparedCall, RepositoryBuilder, Wired},
};

pub trait Adder<D: Dto> {
    fn add(&self, dto: D) -> RepositoryResult<D>;
}

pub trait Reader<D: Dto> {
    fn get(&self, filter: Filter) -> RepositoryResult<Option<D>>;

    fn get_list(&self, offset: u64, limit: u64) -> RepositoryResult<Vec<D>>;

    /// Returns a lazy iterator over every match.
    fn get_all(&self, filter: Filter) -> RepositoryResult<DtoIter<D>>;
}

pub trait Updater<D: Dto> {
    fn update(&self, dto: D, filter: Filter) -> RepositoryResult<Option<D>>;

    fn update_field(&self, field: &str, value: Bson, filter: Filter) -> RepositoryResult<Option<D>>;
}

pub trait Deleter<D: Dto> {
    fn delete(&self, filter: Filter) -> RepositoryResult<bool>;
}

pub trait FieldMutator {
    fn increment(&self, field: &str, weight: Option<i64>, filter: Filter) -> RepositoryResult<()>;

    fn decrement(&self, field: &str, weight: Option<i64>, filter: Filter) -> RepositoryResult<()>;

    fn append(&self, field: &str, value: Bson, filter: Filter) -> RepositoryResult<()>;

    fn remove(&self, field: &str, value: Bson, filter: Filter) -> RepositoryResult<()>;

    fn pop(&self, field: &str, filter: Filter) -> RepositoryResult<Option<Bson>>;
}

pub trait CrudRepository<D: Dto>: Adder<D> + Reader<D> + Updater<D> + Deleter<D> {}

impl<D, T> CrudRepository<D> for T
where
    D: Dto,
    T: Adder<D> + Reader<D> + Updater<D> + Deleter<D>,
{
}

/// A repository whose generated methods run to completion on the calling thread.
pub struct Repository<D, C> {
    collection: C,
    descriptor: Arc<DtoDescriptor>,
    table: MethodTable<D>,
}

impl<D: Dto, C: BlockingCollectionBackend> RepositoryBuilder<D, C> {
    /// Wires the repository and creates its index, if one is configured.
    ///
    /// # Errors
    ///
    /// Same as [`RepositoryBuilder::build`].
    pub fn build_blocking(self) -> RepositoryResult<Repository<D, C>> {
        let Wired {
            collection,
            descriptor,
            table,
            index,
        } = self.wire()?;

        if let Some(index) = &index {
            ensure_index_blocking(&collection, index)?;
        }

        Ok(Repository {
            collection,
            descriptor,
            table,
        })
    }
}

impl<D: Dto, C: BlockingCollectionBackend> Repository<D, C> {
    pub fn builder() -> RepositoryBuilder<D, C> {
        RepositoryBuilder::new()
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }

    pub fn descriptor(&self) -> &DtoDescriptor {
        &self.descriptor
    }

    pub fn method_names(&self) -> Vec<&str> {
        self.table.names().collect()
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.table.contains(name)
    }

    pub fn signature(&self, name: &str) -> Option<&AdaptedSignature> {
        self.table.signature(name)
    }

    /// Calls an attached method by name. See [`crate::repository::Repository::invoke`].
    pub fn invoke(&self, name: &str, args: CallArgs) -> RepositoryResult<CallOutput<D>> {
        match self.table.prepare_call(name, args)? {
            PreparedCall::Single { command, finish } => {
                tracing::trace!(collection = self.collection.name(), method = name, "invoking");
                finish(self.collection.execute(command)?)
            }
            PreparedCall::All { plan, filter } => Ok(CallOutput::Dtos(
                plan.iter(&self.collection, filter)?
                    .collect::<RepositoryResult<_>>()?,
            )),
        }
    }
}

impl<D, C: fmt::Debug> fmt::Debug for Repository<D, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("blocking::Repository")
            .field("dto", &self.descriptor.name())
            .field("collection", &self.collection)
            .field("methods", &self.table)
            .finish()
    }
}

impl<D: Dto, C: BlockingCollectionBackend> Adder<D> for Repository<D, C> {
    fn add(&self, dto: D) -> RepositoryResult<D> {
        execute_blocking(self.table.add()?, &self.collection, dto)
    }
}

impl<D: Dto, C: BlockingCollectionBackend> Reader<D> for Repository<D, C> {
    fn get(&self, filter: Filter) -> RepositoryResult<Option<D>> {
        execute_blocking(self.table.get()?, &self.collection, filter)
    }

    fn get_list(&self, offset: u64, limit: u64) -> RepositoryResult<Vec<D>> {
        execute_blocking(self.table.get_list()?, &self.collection, ListArgs { offset, limit })
    }

    fn get_all(&self, filter: Filter) -> RepositoryResult<DtoIter<D>> {
        self.table
            .get_all()?
            .iter(&self.collection, filter)
    }
}

impl<D: Dto, C: BlockingCollectionBackend> Updater<D> for Repository<D, C> {
    fn update(&self, dto: D, filter: Filter) -> RepositoryResult<Option<D>> {
        execute_blocking(self.table.update()?, &self.collection, (dto, filter))
    }

    fn update_field(&self, field: &str, value: Bson, filter: Filter) -> RepositoryResult<Option<D>> {
        execute_blocking(
            self.table.update_field()?,
            &self.collection,
            (field.to_string(), value, filter),
        )
    }
}

impl<D: Dto, C: BlockingCollectionBackend> Deleter<D> for Repository<D, C> {
    fn delete(&self, filter: Filter) -> RepositoryResult<bool> {
        execute_blocking(self.table.delete()?, &self.collection, filter)
    }
}

impl<D: Dto, C: BlockingCollectionBackend> FieldMutator for Repository<D, C> {
    fn increment(&self, field: &str, weight: Option<i64>, filter: Filter) -> RepositoryResult<()> {
        execute_blocking(self.table.increment(field)?, &self.collection, (weight, filter))
    }

    fn decrement(&self, field: &str, weight: Option<i64>, filter: Filter) -> RepositoryResult<()> {
        execute_blocking(self.table.decrement(field)?, &self.collection, (weight, filter))
    }

    fn append(&self, field: &str, value: Bson, filter: Filter) -> RepositoryResult<()> {
        execute_blocking(self.table.append(field)?, &self.collection, (value, filter))
    }

    fn remove(&self, field: &str, value: Bson, filter: Filter) -> RepositoryResult<()> {
        execute_blocking(self.table.remove(field)?, &self.collection, (value, filter))
    }

    fn pop(&self, field: &str, filter: Filter) -> RepositoryResult<Option<Bson>> {
        execute_blocking(self.table.pop(field)?, &self.collection, filter)
    }
}
