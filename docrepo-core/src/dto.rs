//! Core traits and types for describing data-transfer objects.
//!
//! A DTO is a plain serde type whose shape is published through a [`DtoDescriptor`]:
//! the ordered list of its fields, the semantic kind of each, and optionally the
//! field that carries the string form of the store's native identifier.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::dto::{Dto, DtoDescriptor, FieldKind};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub id: String,
//!     pub name: String,
//!     pub visits: i64,
//! }
//!
//! impl Dto for User {
//!     fn descriptor() -> DtoDescriptor {
//!         DtoDescriptor::builder("User")
//!             .identifier("id")
//!             .field("name", FieldKind::String)
//!             .field("visits", FieldKind::Integer)
//!             .build()
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::HashSet;

use crate::error::{RepositoryError, RepositoryResult};

/// Core trait that every DTO handled by a repository must implement.
///
/// Usually derived with `#[derive(Dto)]` from the `docrepo` crate, which reads the
/// struct's fields and the `#[dto(id)]` marker.
pub trait Dto: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Returns the descriptor of this DTO's shape.
    ///
    /// Called once per repository at wiring time; the result is cached by the repository.
    fn descriptor() -> DtoDescriptor;
}

/// Semantic kind of a DTO field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    Array,
    Document,
    /// String form of a native document identifier.
    Identifier,
    Any,
}

impl FieldKind {
    /// Returns `true` for kinds whose zero value is still significant in a partial update.
    pub fn is_numeric_or_boolean(&self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Float | FieldKind::Boolean)
    }
}

/// A single declared field of a DTO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// The field name as it appears in the stored document.
    pub name: String,
    /// The semantic kind of the field.
    pub kind: FieldKind,
}

/// The named, ordered set of fields describing a DTO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtoDescriptor {
    name: String,
    fields: Vec<FieldDescriptor>,
    id_field: Option<String>,
}

impl DtoDescriptor {
    /// Creates a builder for a DTO named `name`.
    pub fn builder(name: impl Into<String>) -> DtoDescriptorBuilder {
        DtoDescriptorBuilder::new(name)
    }

    /// Returns the DTO type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Returns the name of the identifier field, if one is declared.
    pub fn id_field(&self) -> Option<&str> {
        self.id_field.as_deref()
    }

    /// Returns `true` if `name` is the declared identifier field.
    pub fn is_id_field(&self, name: &str) -> bool {
        self.id_field.as_deref() == Some(name)
    }

    /// Looks up a declared field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|field| field.name == name)
    }

    /// Looks up a declared field by name, failing with
    /// [`RepositoryError::FieldNotFound`] if it is not declared.
    pub fn require_field(&self, name: &str) -> RepositoryResult<&FieldDescriptor> {
        self.field(name)
            .ok_or_else(|| RepositoryError::field_not_found(&self.name, name))
    }

    /// Checks the descriptor invariants: unique field names and an identifier field
    /// that is itself declared.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidDescriptor`] if an invariant is violated.
    pub fn validate(&self) -> RepositoryResult<()> {
        let mut seen = HashSet::with_capacity(self.fields.len());

        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(RepositoryError::InvalidDescriptor {
                    dto: self.name.clone(),
                    reason: format!("field \"{}\" is declared more than once", field.name),
                });
            }
        }

        if let Some(id_field) = &self.id_field {
            if !seen.contains(id_field.as_str()) {
                return Err(RepositoryError::InvalidDescriptor {
                    dto: self.name.clone(),
                    reason: format!("identifier field \"{id_field}\" is not a declared field"),
                });
            }
        }

        Ok(())
    }
}

/// Builder for [`DtoDescriptor`].
#[derive(Debug, Clone)]
pub struct DtoDescriptorBuilder {
    descriptor: DtoDescriptor,
}

impl DtoDescriptorBuilder {
    /// Creates a builder with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: DtoDescriptor {
                name: name.into(),
                fields: Vec::new(),
                id_field: None,
            },
        }
    }

    /// Appends a field.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.descriptor
            .fields
            .push(FieldDescriptor { name: name.into(), kind });
        self
    }

    /// Appends a field and marks it as the identifier field.
    pub fn identifier(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.descriptor.id_field = Some(name.clone());
        self.field(name, FieldKind::Identifier)
    }

    /// Builds the descriptor. Invariants are checked later by [`DtoDescriptor::validate`].
    pub fn build(self) -> DtoDescriptor {
        self.descriptor
    }
}
