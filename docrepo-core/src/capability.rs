//! Capability interfaces implemented by async repositories.
//!
//! A repository implements every trait; a call whose method was not generated fails
//! with [`crate::error::RepositoryError::MethodNotEnabled`]. Code that only needs part of
//! the surface can be written against the narrower trait.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::capability::{Adder, Reader};
//!
//! async fn register<R: Adder<User> + Reader<User>>(repo: &R, user: User) -> RepositoryResult<User> {
//!     let user = repo.add(user).await?;
//!     Ok(repo.get(Filter::by_id(&user.id)?).await?.unwrap_or(user))
//! }
//! ```

use async_trait::async_trait;
use bson::Bson;

use crate::{
    dto::Dto,
    error::RepositoryResult,
    filter::Filter,
    methods::DtoStream,
};

#[async_trait]
pub trait Adder<D: Dto>: Send + Sync {
    /// Inserts `dto`, returning it with its identifier injected.
    async fn add(&self, dto: D) -> RepositoryResult<D>;
}

#[async_trait]
pub trait Reader<D: Dto>: Send + Sync {
    /// Returns the first match, or `None`.
    async fn get(&self, filter: Filter) -> RepositoryResult<Option<D>>;

    /// Returns one page of the unfiltered listing.
    async fn get_list(&self, offset: u64, limit: u64) -> RepositoryResult<Vec<D>>;

    /// Returns a lazy stream over every match.
    async fn get_all(&self, filter: Filter) -> RepositoryResult<DtoStream<D>>;
}

#[async_trait]
pub trait Updater<D: Dto>: Send + Sync {
    /// Partially updates the first match, returning the updated DTO.
    async fn update(&self, dto: D, filter: Filter) -> RepositoryResult<Option<D>>;

    /// Sets one declared field on the first match, returning the updated DTO.
    async fn update_field(&self, field: &str, value: Bson, filter: Filter) -> RepositoryResult<Option<D>>;
}

#[async_trait]
pub trait Deleter<D: Dto>: Send + Sync {
    /// Deletes the first match, returning whether a document was removed.
    async fn delete(&self, filter: Filter) -> RepositoryResult<bool>;
}

/// Per-field integer and array operations.
#[async_trait]
pub trait FieldMutator: Send + Sync {
    /// `increment_{field}`: adds `weight` (default 1) to the first match.
    async fn increment(&self, field: &str, weight: Option<i64>, filter: Filter) -> RepositoryResult<()>;

    /// `decrement_{field}`: adds `weight` (default -1) to the first match.
    async fn decrement(&self, field: &str, weight: Option<i64>, filter: Filter) -> RepositoryResult<()>;

    /// `{field}__append`
    async fn append(&self, field: &str, value: Bson, filter: Filter) -> RepositoryResult<()>;

    /// `{field}__remove`
    async fn remove(&self, field: &str, value: Bson, filter: Filter) -> RepositoryResult<()>;

    /// `{field}__pop`: removes and returns the last element.
    async fn pop(&self, field: &str, filter: Filter) -> RepositoryResult<Option<Bson>>;
}

/// The full CRUD surface.
pub trait CrudRepository<D: Dto>: Adder<D> + Reader<D> + Updater<D> + Deleter<D> {}

impl<D, T> CrudRepository<D> for T
where
    D: Dto,
    T: Adder<D> + Reader<D> + Updater<D> + Deleter<D>,
{
}
