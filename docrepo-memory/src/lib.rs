//! In-memory collection backend for docrepo.
//!
//! This crate provides a thread-safe, in-memory implementation of both the
//! `CollectionBackend` and `BlockingCollectionBackend` traits. It uses async-aware
//! read-write locks for concurrent access and is ideal for development and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Atomic updates** - `$set`, `$inc`, `$push`, `$pull` and `$pop` under one write lock
//! - **Filter support** - Equality, comparison, `$in`, `$exists`, `$and` and `$or`
//! - **Unique indexes** - Duplicate keys are rejected like a real server would
//!
//! # Quick Start
//!
//! ```ignore
//! use docrepo::prelude::*;
//! use docrepo::memory::InMemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemoryStore::new();
//!     let repo = Repository::<User, _>::builder()
//!         .collection(store.collection("users"))
//!         .build()
//!         .await?;
//!
//!     let user = repo.add(User { id: String::new(), name: "Alice".into() }).await?;
//!     assert!(repo.get(Filter::by_id(&user.id)?).await?.is_some());
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_memory;

mod evaluator;
pub mod store;

pub use store::{InMemoryCollection, InMemoryStore, InMemoryStoreBuilder};
