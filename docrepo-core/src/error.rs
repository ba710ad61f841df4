//! Error types and result types for repository synthesis and execution.
//!
//! Wiring-time errors (`Configuration`, `InvalidDescriptor`, `MissingAnnotation`,
//! `InvalidMethodName`) indicate a programmer error in the declared configuration.
//! Call-time errors (`FieldNotFound`, `Conversion`, `UnexpectedArgument`, `Backend`)
//! are surfaced to the caller of the generated method. Use [`RepositoryResult<T>`]
//! as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors raised while wiring or calling a repository.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The repository configuration is incomplete (missing collection, empty meta block).
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The DTO descriptor is malformed (duplicate field names, unknown identifier field).
    #[error("Invalid descriptor for {dto}: {reason}")]
    InvalidDescriptor {
        dto: String,
        reason: String,
    },
    /// A field name passed to `update_field` or a specialized generator is not declared by the DTO.
    #[error("{dto} does not have field \"{field}\"")]
    FieldNotFound {
        dto: String,
        field: String,
    },
    /// A user-declared method carries no return annotation.
    #[error("Method {0} must declare a return annotation")]
    MissingAnnotation(String),
    /// A user-declared method name does not match any generated method.
    #[error("Invalid method name: {0}")]
    InvalidMethodName(String),
    /// The method exists in the vocabulary but was not enabled for this repository.
    #[error("Method {0} is not enabled for this repository")]
    MethodNotEnabled(String),
    /// An argument could not be mapped onto the generated implementation.
    #[error("{method} got an unexpected argument: {argument}")]
    UnexpectedArgument {
        method: String,
        argument: String,
    },
    /// Identifier or field decoding failed.
    #[error("Conversion error: {0}")]
    Conversion(String),
    /// Serialization of a DTO or document failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A unique index rejected the write.
    #[error("Duplicate key {key} in collection {collection}")]
    DuplicateKey {
        key: String,
        collection: String,
    },
    /// An error reported by the underlying document store, passed through unmodified.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl RepositoryError {
    pub(crate) fn field_not_found(dto: &str, field: &str) -> Self {
        RepositoryError::FieldNotFound {
            dto: dto.to_string(),
            field: field.to_string(),
        }
    }

    pub(crate) fn unexpected_argument(method: &str, argument: impl Into<String>) -> Self {
        RepositoryError::UnexpectedArgument {
            method: method.to_string(),
            argument: argument.into(),
        }
    }
}

impl From<BsonError> for RepositoryError {
    fn from(err: BsonError) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for RepositoryError {
    fn from(err: SerdeJsonError) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
