//! Filters and update documents passed to the backend.
//!
//! A [`Filter`] is a flat mapping of field name to value, matched by equality.
//! [`UpdateOp`] describes the single-field store commands used by the generated
//! mutation methods, and [`partial_update`] produces the `$set` payload of a
//! whole-DTO update.

use bson::{Bson, Document, doc};
use serde::Serialize;

use crate::{
    codec::{ID_KEY, parse_id, to_raw_document},
    dto::DtoDescriptor,
    error::RepositoryResult,
};

/// Equality filter over stored documents. An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(Document);

impl Filter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter that matches every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds an equality condition on `field`.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Creates a filter on the native identifier from its string form.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RepositoryError::Conversion`] if `hex` is not a valid identifier.
    pub fn by_id(hex: &str) -> RepositoryResult<Self> {
        Ok(Self::new().eq(ID_KEY, parse_id(ID_KEY, hex)?))
    }

    /// Adds an equality condition in place.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Bson>) {
        self.0.insert(field.into(), value.into());
    }

    /// Returns `true` if the filter matches every document.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the filter as a document.
    pub fn as_document(&self) -> &Document {
        &self.0
    }

    /// Consumes the filter, returning its document.
    pub fn into_document(self) -> Document {
        self.0
    }
}

impl From<Document> for Filter {
    fn from(document: Document) -> Self {
        Filter(document)
    }
}

impl From<Filter> for Document {
    fn from(filter: Filter) -> Self {
        filter.0
    }
}

/// Store-level update commands issued by the generated methods.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Assign every entry of the document.
    Set(Document),
    /// Add `by` to a numeric field.
    Inc { field: String, by: i64 },
    /// Append a value to an array field.
    Push { field: String, value: Bson },
    /// Remove every element equal to the value from an array field.
    Pull { field: String, value: Bson },
    /// Remove the last element of an array field.
    PopLast { field: String },
}

impl UpdateOp {
    /// Renders the operation as a store update document.
    pub fn to_document(&self) -> Document {
        match self {
            UpdateOp::Set(values) => doc! { "$set": values.clone() },
            UpdateOp::Inc { field, by } => doc! { "$inc": { field.as_str(): int_bson(*by) } },
            UpdateOp::Push { field, value } => doc! { "$push": { field.as_str(): value.clone() } },
            UpdateOp::Pull { field, value } => doc! { "$pull": { field.as_str(): value.clone() } },
            UpdateOp::PopLast { field } => doc! { "$pop": { field.as_str(): 1 } },
        }
    }
}

/// Narrowest integer representation of `value`.
pub(crate) fn int_bson(value: i64) -> Bson {
    match i32::try_from(value) {
        Ok(small) => Bson::Int32(small),
        Err(_) => Bson::Int64(value),
    }
}

/// Builds the `$set` payload for a whole-DTO update.
///
/// Numbers and booleans are always written, so a zero or `false` is applied.
/// Strings, arrays and embedded documents are written only when non-empty, and
/// nulls are skipped. A non-empty identifier field is written under its own name;
/// the native `_id` is immutable and never part of the payload.
///
/// # Errors
///
/// Returns [`crate::error::RepositoryError::Serialization`] if the DTO cannot be serialized
/// and [`crate::error::RepositoryError::Conversion`] if the identifier field is not a valid
/// identifier.
pub fn partial_update<T: Serialize>(dto: &T, descriptor: &DtoDescriptor) -> RepositoryResult<Document> {
    let document = to_raw_document(dto)?;
    let mut set = Document::new();

    for (key, value) in document {
        if key == ID_KEY {
            continue;
        }

        if descriptor.is_id_field(&key) {
            if let Bson::String(hex) = &value {
                if !hex.is_empty() {
                    parse_id(&key, hex)?;
                }
            }
        }

        let significant = match &value {
            Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) | Bson::Boolean(_) => true,
            Bson::String(s) => !s.is_empty(),
            Bson::Array(items) => !items.is_empty(),
            Bson::Document(inner) => !inner.is_empty(),
            Bson::Null | Bson::Undefined => false,
            _ => true,
        };

        if significant {
            set.insert(key, value);
        }
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;
    use crate::dto::FieldKind;

    #[derive(Serialize)]
    struct Profile {
        id: String,
        name: String,
        age: i64,
        active: bool,
        tags: Vec<String>,
        nickname: Option<String>,
    }

    fn descriptor() -> DtoDescriptor {
        DtoDescriptor::builder("Profile")
            .identifier("id")
            .field("name", FieldKind::String)
            .field("age", FieldKind::Integer)
            .field("active", FieldKind::Boolean)
            .field("tags", FieldKind::Array)
            .field("nickname", FieldKind::String)
            .build()
    }

    #[test]
    fn partial_update_keeps_zero_numbers_and_false() {
        let profile = Profile {
            id: String::new(),
            name: String::new(),
            age: 0,
            active: false,
            tags: vec![],
            nickname: None,
        };

        let set = partial_update(&profile, &descriptor()).unwrap();
        assert_eq!(set, doc! { "age": 0_i64, "active": false });
    }

    #[test]
    fn partial_update_writes_non_empty_values() {
        let profile = Profile {
            id: String::new(),
            name: "ann".into(),
            age: 31,
            active: true,
            tags: vec!["a".into()],
            nickname: Some("an".into()),
        };

        let set = partial_update(&profile, &descriptor()).unwrap();
        assert_eq!(
            set,
            doc! { "name": "ann", "age": 31_i64, "active": true, "tags": ["a"], "nickname": "an" }
        );
    }

    #[test]
    fn partial_update_writes_a_present_identifier_field() {
        let profile = Profile {
            id: "5f1e9a2b3c4d5e6f7a8b9c0d".into(),
            name: String::new(),
            age: 2,
            active: true,
            tags: vec![],
            nickname: None,
        };

        let set = partial_update(&profile, &descriptor()).unwrap();
        assert_eq!(
            set,
            doc! { "id": "5f1e9a2b3c4d5e6f7a8b9c0d", "age": 2_i64, "active": true }
        );

        let malformed = Profile {
            id: "nope".into(),
            ..profile
        };
        assert!(matches!(
            partial_update(&malformed, &descriptor()),
            Err(crate::error::RepositoryError::Conversion(_))
        ));
    }

    #[test]
    fn partial_update_never_writes_the_native_identifier() {
        #[derive(Serialize)]
        struct Native {
            #[serde(rename = "_id")]
            id: String,
            name: String,
        }

        let descriptor = DtoDescriptor::builder("Native")
            .identifier("_id")
            .field("name", FieldKind::String)
            .build();
        let native = Native {
            id: "5f1e9a2b3c4d5e6f7a8b9c0d".into(),
            name: "ann".into(),
        };

        assert_eq!(partial_update(&native, &descriptor).unwrap(), doc! { "name": "ann" });
    }

    #[test]
    fn renders_update_operations() {
        assert_eq!(
            UpdateOp::Inc { field: "n".into(), by: -3 }.to_document(),
            doc! { "$inc": { "n": -3 } }
        );
        assert_eq!(
            UpdateOp::Inc { field: "n".into(), by: i64::MAX }.to_document(),
            doc! { "$inc": { "n": i64::MAX } }
        );
        assert_eq!(
            UpdateOp::PopLast { field: "xs".into() }.to_document(),
            doc! { "$pop": { "xs": 1 } }
        );
        assert_eq!(
            UpdateOp::Pull { field: "xs".into(), value: Bson::from("a") }.to_document(),
            doc! { "$pull": { "xs": "a" } }
        );
    }

    #[test]
    fn filter_by_id_uses_native_key() {
        let filter = Filter::by_id("5f1e9a2b3c4d5e6f7a8b9c0d").unwrap();
        assert!(filter.as_document().get_object_id(ID_KEY).is_ok());
        assert!(Filter::by_id("nope").is_err());
        assert!(Filter::all().is_empty());
    }
}
