//! Index declarations applied to a repository's collection at wiring time.

use bson::{Document, doc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    backend::{BlockingCollectionBackend, CollectionBackend},
    error::RepositoryResult,
};

/// Sort direction of an index key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexDirection {
    Asc,
    #[default]
    Desc,
}

impl IndexDirection {
    /// The store's numeric key order: `1` ascending, `-1` descending.
    pub fn as_i32(self) -> i32 {
        match self {
            IndexDirection::Asc => 1,
            IndexDirection::Desc => -1,
        }
    }
}

/// A single-field index declaration.
///
/// Deserializes from either a bare field name (`"email"`) or a full object
/// (`{"field": "email", "unique": true}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IndexSpecRepr")]
pub struct IndexSpec {
    pub field: String,
    pub name: Option<String>,
    pub direction: IndexDirection,
    pub unique: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IndexSpecRepr {
    Field(String),
    Full {
        field: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        direction: IndexDirection,
        #[serde(default)]
        unique: bool,
    },
}

impl From<IndexSpecRepr> for IndexSpec {
    fn from(repr: IndexSpecRepr) -> Self {
        match repr {
            IndexSpecRepr::Field(field) => IndexSpec::new(field),
            IndexSpecRepr::Full { field, name, direction, unique } => IndexSpec { field, name, direction, unique },
        }
    }
}

impl IndexSpec {
    /// Creates a descending, non-unique index on `field` with a store-chosen name.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            name: None,
            direction: IndexDirection::default(),
            unique: false,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn ascending(mut self) -> Self {
        self.direction = IndexDirection::Asc;
        self
    }

    pub fn descending(mut self) -> Self {
        self.direction = IndexDirection::Desc;
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// The index key document, e.g. `{ "email": -1 }`.
    pub fn keys(&self) -> Document {
        doc! { self.field.as_str(): self.direction.as_i32() }
    }

    /// The declared name, or the store's conventional `{field}_{order}` name.
    pub fn resolved_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.field, self.direction.as_i32()))
    }
}

impl From<&str> for IndexSpec {
    fn from(field: &str) -> Self {
        IndexSpec::new(field)
    }
}

impl From<String> for IndexSpec {
    fn from(field: String) -> Self {
        IndexSpec::new(field)
    }
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.resolved_name(), self.field)?;
        if self.unique {
            write!(f, " (unique)")?;
        }
        Ok(())
    }
}

/// Creates `index` on `collection`.
///
/// # Errors
///
/// Passes through the backend's error, e.g. when existing documents violate a unique index.
pub async fn ensure_index<C>(collection: &C, index: &IndexSpec) -> RepositoryResult<String>
where
    C: CollectionBackend + ?Sized,
{
    let name = collection.create_index(index).await?;
    tracing::debug!(collection = collection.name(), index = %index, "index ensured");
    Ok(name)
}

/// Blocking counterpart of [`ensure_index`].
pub fn ensure_index_blocking<C>(collection: &C, index: &IndexSpec) -> RepositoryResult<String>
where
    C: BlockingCollectionBackend + ?Sized,
{
    let name = collection.create_index(index)?;
    tracing::debug!(collection = collection.name(), index = %index, "index ensured");
    Ok(name)
}
