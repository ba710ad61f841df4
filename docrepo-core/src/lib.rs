//! Repository method synthesis for JSON document databases.
//!
//! This crate is the core of the docrepo project. Given a DTO type, a bound collection
//! and a declarative feature set, it generates the repository's data-access methods:
//!
//! - **DTO descriptors** ([`dto`]) - The [`Dto`](dto::Dto) trait and the shape of a DTO
//! - **Document codec** ([`codec`]) - DTO to document conversion and identifier mapping
//! - **Filters and updates** ([`filter`]) - Equality filters, update operators, partial updates
//! - **Collection backends** ([`backend`]) - The async and blocking store contract
//! - **Index setup** ([`index`]) - Declarative index specifications
//! - **Method factory** ([`methods`]) - One plan per generated operation
//! - **Method names** ([`naming`]) - Conventional names and access-level mangling
//! - **Signature adapter** ([`signature`]) - Reconciling declared signatures with the generated methods
//! - **Wiring** ([`wiring`]) - Configuration and the builder that assembles a repository
//! - **Repositories** ([`repository`], [`blocking`]) - The generated methods, bound to a collection
//! - **Capabilities** ([`capability`]) - The interfaces repositories implement
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docrepo::prelude::*;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Dto)]
//! pub struct User {
//!     #[dto(id)]
//!     #[serde(default)]
//!     pub id: String,
//!     pub name: String,
//!     #[serde(default)]
//!     pub visits: i64,
//! }
//!
//! let repo = Repository::<User, _>::builder()
//!     .collection(store.collection("users"))
//!     .features(Features::default().integer_field("visits"))
//!     .build()
//!     .await?;
//!
//! let user = repo.add(User { id: String::new(), name: "ann".into(), visits: 0 }).await?;
//! repo.increment("visits", None, Filter::by_id(&user.id)?).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_core;

pub mod backend;
pub mod blocking;
pub mod capability;
pub mod codec;
pub mod dto;
pub mod error;
pub mod filter;
pub mod index;
pub mod methods;
pub mod naming;
pub mod repository;
pub mod signature;
pub mod wiring;
