//! MongoDB backend implementation for docrepo.
//!
//! This crate provides a MongoDB-based implementation of the `CollectionBackend` trait,
//! so generated repository methods run directly against a MongoDB collection. Every
//! single-document write maps onto one server command, which makes `$inc`, `$push` and
//! `$pop` atomic per call.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docrepo = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! The blocking driver is available behind the `sync` feature, which exposes
//! [`sync::MongoDbSyncStore`] implementing `BlockingCollectionBackend` collections.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::{backend::StoreBackendBuilder, mongodb::MongoDbStore, prelude::*};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!
//!     let repo = Repository::<User, _>::builder()
//!         .collection(store.collection("users"))
//!         .index("email")
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_mongodb;

mod error;
pub mod store;
#[cfg(feature = "sync")]
pub mod sync;

pub use store::{MongoDbCollection, MongoDbStore, MongoDbStoreBuilder};
