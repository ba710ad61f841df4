//! Conversion between DTOs and the flat documents held by the store.
//!
//! The identifier field of a DTO is string-typed, while the store keeps a native
//! [`ObjectId`] under [`ID_KEY`]. [`to_document`] parses the string form into the
//! native key and keeps the string form under the DTO's own field name (unless that
//! name already is [`ID_KEY`]); [`to_dto`] converts the native key back to its hex form.

use bson::{Bson, Document, de::deserialize_from_bson, oid::ObjectId, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    dto::DtoDescriptor,
    error::{RepositoryError, RepositoryResult},
    filter::Filter,
};

/// The store's native identifier key.
pub const ID_KEY: &str = "_id";

/// Serializes a value into a BSON document without identifier handling.
///
/// # Errors
///
/// Returns [`RepositoryError::Serialization`] if the value does not serialize to a document.
pub fn to_raw_document<T: Serialize>(value: &T) -> RepositoryResult<Document> {
    match serialize_to_bson(value)? {
        Bson::Document(document) => Ok(document),
        other => Err(RepositoryError::Serialization(format!(
            "expected a document, got {:?}",
            other.element_type()
        ))),
    }
}

/// Deserializes a value from a BSON value without identifier handling.
///
/// # Errors
///
/// Returns [`RepositoryError::Conversion`] if the value does not match the target shape.
pub fn from_raw_value<T: DeserializeOwned>(value: Bson) -> RepositoryResult<T> {
    deserialize_from_bson(value).map_err(|e| RepositoryError::Conversion(e.to_string()))
}

/// Parses the string form of an identifier.
///
/// # Errors
///
/// Returns [`RepositoryError::Conversion`] if `hex` is not a valid ObjectId representation.
pub fn parse_id(field: &str, hex: &str) -> RepositoryResult<ObjectId> {
    ObjectId::parse_str(hex)
        .map_err(|e| RepositoryError::Conversion(format!("{field}: \"{hex}\" is not a valid identifier ({e})")))
}

/// Flattens a DTO into a store document, mapping its identifier field to [`ID_KEY`].
///
/// An identifier that is absent, null or empty is left as-is so the store assigns one.
///
/// # Errors
///
/// Returns [`RepositoryError::Conversion`] if the identifier is not a valid ObjectId
/// representation, or [`RepositoryError::Serialization`] if the DTO cannot be serialized.
pub fn to_document<T: Serialize>(dto: &T, descriptor: &DtoDescriptor) -> RepositoryResult<Document> {
    let mut document = to_raw_document(dto)?;

    let Some(id_field) = descriptor.id_field() else {
        return Ok(document);
    };

    let native = match document.get(id_field) {
        Some(Bson::String(hex)) if !hex.is_empty() => parse_id(id_field, hex)?,
        Some(Bson::ObjectId(oid)) => *oid,
        Some(Bson::String(_)) | Some(Bson::Null) | None => return Ok(document),
        Some(other) => {
            return Err(RepositoryError::Conversion(format!(
                "{id_field}: expected a string identifier, got {:?}",
                other.element_type()
            )));
        }
    };

    if id_field != ID_KEY {
        document.insert(id_field, native.to_hex());
    }
    document.insert(ID_KEY, native);

    Ok(document)
}

/// Builds a DTO from a store document, converting [`ID_KEY`] back to its string form.
///
/// Fields absent from the document take the DTO's serde defaults.
///
/// # Errors
///
/// Returns [`RepositoryError::Conversion`] if a required field is missing, a field has
/// the wrong shape, or the native identifier is not an ObjectId or string.
pub fn to_dto<T: DeserializeOwned>(mut document: Document, descriptor: &DtoDescriptor) -> RepositoryResult<T> {
    let native = document.remove(ID_KEY);

    if let Some(id_field) = descriptor.id_field() {
        match native {
            Some(Bson::ObjectId(oid)) => {
                document.insert(id_field, oid.to_hex());
            }
            Some(Bson::String(hex)) => {
                document.insert(id_field, hex);
            }
            Some(other) => {
                return Err(RepositoryError::Conversion(format!(
                    "{}: unsupported identifier type {:?}",
                    descriptor.name(),
                    other.element_type()
                )));
            }
            None => {}
        }
    }

    deserialize_from_bson(Bson::Document(document))
        .map_err(|e| RepositoryError::Conversion(format!("{}: {e}", descriptor.name())))
}

/// Rewrites a caller filter so identifier lookups hit the native key.
///
/// A string value under [`ID_KEY`] is parsed into an ObjectId. Other entries pass
/// through untouched.
///
/// # Errors
///
/// Returns [`RepositoryError::Conversion`] if a string under [`ID_KEY`] is not a valid identifier.
pub fn normalize_filter(filter: Filter) -> RepositoryResult<Document> {
    let mut document = filter.into_document();

    if let Some(Bson::String(hex)) = document.get(ID_KEY) {
        let native = parse_id(ID_KEY, hex)?;
        document.insert(ID_KEY, native);
    }

    Ok(document)
}
