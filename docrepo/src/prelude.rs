//! Convenient re-exports of commonly used types from docrepo.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docrepo::prelude::*;
//! ```
//!
//! This provides access to:
//! - The `Dto` trait and derive macro
//! - The async repository, its builder and capability traits
//! - Filters, index specifications and configuration types
//! - Name-dispatch arguments and outputs
//! - Error types
//!
//! The blocking repository and its traits live in [`crate::blocking`]; they share
//! method names with the async traits and are left out to avoid ambiguity.

pub use serde::{Deserialize, Serialize};

pub use docrepo_core::{
    backend::{CollectionBackend, StoreBackendBuilder},
    capability::{Adder, CrudRepository, Deleter, FieldMutator, Reader, Updater},
    dto::{Dto, DtoDescriptor, FieldKind},
    error::{RepositoryError, RepositoryResult},
    filter::Filter,
    index::{IndexDirection, IndexSpec},
    methods::{DtoStream, ListCommand, MethodFactory},
    naming::{Access, MethodKind},
    repository::Repository,
    signature::{CallArgs, CallOutput, MethodSignature, TypeAnnotation},
    wiring::{Features, RepositoryBuilder, RepositoryOptions},
};
pub use docrepo_macros::Dto;
