//! Main docrepo crate: generated repositories over JSON document collections.
//!
//! This crate is the primary entry point for users of docrepo. It re-exports the core
//! types from the sub-crates and provides access to the different collection backends.
//!
//! A repository is declared by naming a DTO type, binding a collection and listing the
//! operations it should support. The wiring pass generates the methods once; every
//! generated method converts between DTOs and stored documents, maps the string
//! identifier to the store's native one and issues a single store command.
//!
//! # Features
//!
//! - **Generated CRUD** - `add`, `get`, `get_list`, `get_all`, `update`, `delete`, `update_field`
//! - **Field mutators** - Atomic `increment`/`decrement` on integer fields and
//!   `append`/`remove`/`pop` on array fields
//! - **Signature substitution** - Declare method signatures and have them bound to generated code
//! - **Async and blocking** - The same plans run on an async or a blocking backend
//! - **Multiple backends** - In-memory and MongoDB collections
//!
//! # Quick Start
//!
//! ```ignore
//! use docrepo::{prelude::*, memory::InMemoryStore};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Dto)]
//! pub struct User {
//!     #[dto(id)]
//!     #[serde(default)]
//!     pub id: String,
//!     pub name: String,
//!     #[serde(default)]
//!     pub visits: i64,
//!     #[serde(default)]
//!     pub tags: Vec<String>,
//! }
//!
//! #[tokio::main]
//! async fn main() -> RepositoryResult<()> {
//!     let store = InMemoryStore::new();
//!
//!     let repo = Repository::<User, _>::builder()
//!         .collection(store.collection("users"))
//!         .index(IndexSpec::new("name").unique(true))
//!         .features(Features::default().integer_field("visits").array_field("tags"))
//!         .build()
//!         .await?;
//!
//!     let user = repo
//!         .add(User { id: String::new(), name: "Alice".into(), visits: 0, tags: vec![] })
//!         .await?;
//!
//!     repo.increment("visits", None, Filter::by_id(&user.id)?).await?;
//!     repo.append("tags", "admin".into(), Filter::by_id(&user.id)?).await?;
//!
//!     let user = repo.get(Filter::by_id(&user.id)?).await?;
//!     println!("{user:?}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Calling methods by name
//!
//! Repositories also expose their methods under their generated names, so callers
//! driven by configuration can dispatch dynamically:
//!
//! ```ignore
//! let repo = Repository::<User, _>::builder()
//!     .collection(store.collection("users"))
//!     .method_access(Access::Protected)
//!     .features(Features::default().integer_field("visits"))
//!     .build()
//!     .await?;
//!
//! assert!(repo.has_method("_increment_visits"));
//! repo.invoke("_increment_visits", CallArgs::new().kwarg("weight", 5).kwarg("name", "Alice")).await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - MongoDB backend (requires `mongodb` feature; blocking variant behind `sync`)

pub mod prelude;

pub use docrepo_core::{
    backend, blocking, capability, codec, dto, error, filter, index, methods, naming, repository, signature, wiring,
};
pub use docrepo_macros::Dto;

// Re-exported for backend implementors and DTO authors
pub use async_trait::async_trait;
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docrepo_memory::{InMemoryCollection, InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docrepo_mongodb::{MongoDbCollection, MongoDbStore, MongoDbStoreBuilder};

    /// Blocking MongoDB backend, available with the `sync` feature.
    #[cfg(feature = "sync")]
    pub mod sync {
        pub use docrepo_mongodb::sync::{MongoDbSyncCollection, MongoDbSyncStore};
    }
}
