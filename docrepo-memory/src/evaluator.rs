//! Filter evaluation and update application for in-memory documents.
//!
//! Supports the subset of the document-store query language the repositories
//! produce, plus the common comparison operators:
//!
//! - equality (`{field: value}`), where an array field matches if any element is equal
//!   and a missing field matches `null`
//! - `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$exists`
//! - top-level `$and` and `$or`
//!
//! Updates support `$set`, `$unset`, `$inc`, `$push`, `$pull` and `$pop`.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap};

use docrepo_core::{
    codec::ID_KEY,
    error::{RepositoryError, RepositoryResult},
};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr.iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>(),
            ),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>(),
            ),
            _ => Comparable::Null,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Values are equal under the store's comparison rules.
pub(crate) fn values_equal(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Looks up a possibly dotted path.
fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Evaluates equality filters and operator documents against one document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns `true` if the document satisfies every condition of `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Backend`] for unsupported operators or malformed operands.
    pub fn matches(&self, filter: &Document) -> RepositoryResult<bool> {
        for (key, expected) in filter {
            let matched = match key.as_str() {
                "$and" => self.all(expected)?,
                "$or" => self.any(expected)?,
                op if op.starts_with('$') => return Err(unsupported(op)),
                field => self.matches_field(field, expected)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn clauses(operand: &Bson) -> RepositoryResult<impl Iterator<Item = &Document>> {
        let Bson::Array(clauses) = operand else {
            return Err(RepositoryError::Backend("$and/$or expect an array of documents".to_string()));
        };

        clauses
            .iter()
            .map(|clause| {
                clause
                    .as_document()
                    .ok_or_else(|| RepositoryError::Backend("$and/$or clauses must be documents".to_string()))
            })
            .collect::<RepositoryResult<Vec<_>>>()
            .map(Vec::into_iter)
    }

    fn all(&self, operand: &Bson) -> RepositoryResult<bool> {
        for clause in Self::clauses(operand)? {
            if !self.matches(clause)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn any(&self, operand: &Bson) -> RepositoryResult<bool> {
        for clause in Self::clauses(operand)? {
            if self.matches(clause)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn matches_field(&self, field: &str, expected: &Bson) -> RepositoryResult<bool> {
        let actual = lookup(self.document, field);

        match expected {
            Bson::Document(ops) if !ops.is_empty() && ops.keys().all(|key| key.starts_with('$')) => {
                for (op, operand) in ops {
                    if !Self::apply_operator(actual, op, operand)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(Self::equals(actual, expected)),
        }
    }

    /// Equality with array-contains semantics; a missing field equals `null`.
    fn equals(actual: Option<&Bson>, expected: &Bson) -> bool {
        match actual {
            None => matches!(expected, Bson::Null),
            Some(value) => {
                if values_equal(value, expected) {
                    return true;
                }

                match value {
                    Bson::Array(items) => items
                        .iter()
                        .any(|item| values_equal(item, expected)),
                    _ => false,
                }
            }
        }
    }

    fn compare(actual: Option<&Bson>, operand: &Bson, accept: fn(Ordering) -> bool) -> bool {
        let Some(value) = actual else {
            return false;
        };
        let expected = Comparable::from(operand);

        let candidates: Vec<&Bson> = match value {
            Bson::Array(items) => items.iter().collect(),
            single => vec![single],
        };

        candidates.into_iter().any(|candidate| {
            Comparable::from(candidate)
                .partial_cmp(&expected)
                .is_some_and(accept)
        })
    }

    fn apply_operator(actual: Option<&Bson>, op: &str, operand: &Bson) -> RepositoryResult<bool> {
        Ok(match op {
            "$eq" => Self::equals(actual, operand),
            "$ne" => !Self::equals(actual, operand),
            "$gt" => Self::compare(actual, operand, Ordering::is_gt),
            "$gte" => Self::compare(actual, operand, Ordering::is_ge),
            "$lt" => Self::compare(actual, operand, Ordering::is_lt),
            "$lte" => Self::compare(actual, operand, Ordering::is_le),
            "$in" | "$nin" => {
                let Bson::Array(values) = operand else {
                    return Err(RepositoryError::Backend(format!("{op} expects an array")));
                };
                let found = values
                    .iter()
                    .any(|value| Self::equals(actual, value));

                if op == "$in" { found } else { !found }
            }
            "$exists" => {
                let should_exist = match operand {
                    Bson::Boolean(flag) => *flag,
                    Bson::Int32(n) => *n != 0,
                    Bson::Int64(n) => *n != 0,
                    _ => true,
                };
                actual.is_some() == should_exist
            }
            other => return Err(unsupported(other)),
        })
    }
}

fn unsupported(op: &str) -> RepositoryError {
    RepositoryError::Backend(format!("unsupported operator {op}"))
}

/// Applies an update document in place. The caller keeps the original on error.
///
/// # Errors
///
/// Returns [`RepositoryError::Backend`] for unsupported operators, non-numeric `$inc`
/// targets, array operators on non-array fields, or an attempt to change `_id`.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> RepositoryResult<()> {
    let original_id = document.get(ID_KEY).cloned();

    for (op, operand) in update {
        let Bson::Document(fields) = operand else {
            return Err(RepositoryError::Backend(format!("{op} expects a document")));
        };

        for (field, value) in fields {
            match op.as_str() {
                "$set" => {
                    document.insert(field.clone(), value.clone());
                }
                "$unset" => {
                    document.remove(field);
                }
                "$inc" => {
                    let sum = increment(document.get(field), value, field)?;
                    document.insert(field.clone(), sum);
                }
                "$push" => match document.get_mut(field) {
                    Some(Bson::Array(items)) => items.push(value.clone()),
                    Some(_) => return Err(not_an_array(op, field)),
                    None => {
                        document.insert(field.clone(), Bson::Array(vec![value.clone()]));
                    }
                },
                "$pull" => match document.get_mut(field) {
                    Some(Bson::Array(items)) => items.retain(|item| !values_equal(item, value)),
                    Some(_) => return Err(not_an_array(op, field)),
                    None => {}
                },
                "$pop" => match document.get_mut(field) {
                    Some(Bson::Array(items)) => {
                        if matches!(value, Bson::Int32(-1) | Bson::Int64(-1)) {
                            if !items.is_empty() {
                                items.remove(0);
                            }
                        } else {
                            items.pop();
                        }
                    }
                    Some(_) => return Err(not_an_array(op, field)),
                    None => {}
                },
                other => return Err(unsupported(other)),
            }
        }
    }

    if document.get(ID_KEY) != original_id.as_ref() {
        return Err(RepositoryError::Backend(format!(
            "performing an update on the path '{ID_KEY}' would modify the immutable field '{ID_KEY}'"
        )));
    }

    Ok(())
}

fn not_an_array(op: &str, field: &str) -> RepositoryError {
    RepositoryError::Backend(format!("cannot apply {op} to non-array field {field}"))
}

fn as_int(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        _ => None,
    }
}

fn as_float(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(n) => Some(*n),
        other => as_int(other).map(|n| n as f64),
    }
}

/// `current + by`, keeping 32-bit integers narrow while they fit.
fn increment(current: Option<&Bson>, by: &Bson, field: &str) -> RepositoryResult<Bson> {
    let current = current.unwrap_or(&Bson::Int32(0));

    if let (Bson::Int32(a), Bson::Int32(b)) = (current, by) {
        return Ok(match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        });
    }

    if let (Some(a), Some(b)) = (as_int(current), as_int(by)) {
        return a
            .checked_add(b)
            .map(Bson::Int64)
            .ok_or_else(|| RepositoryError::Backend(format!("$inc on {field} overflows")));
    }

    match (as_float(current), as_float(by)) {
        (Some(a), Some(b)) => Ok(Bson::Double(a + b)),
        _ => Err(RepositoryError::Backend(format!(
            "cannot apply $inc to {field}: non-numeric value"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn matches(document: &Document, filter: Document) -> bool {
        DocumentEvaluator::new(document)
            .matches(&filter)
            .unwrap()
    }

    #[test]
    fn equality_handles_numbers_arrays_and_missing_fields() {
        let document = doc! { "x": "hey", "y": 42_i64, "tags": ["a", "b"] };

        assert!(matches(&document, doc! { "y": 42 }));
        assert!(matches(&document, doc! { "y": 42.0 }));
        assert!(matches(&document, doc! { "tags": "b" }));
        assert!(matches(&document, doc! { "missing": Bson::Null }));
        assert!(!matches(&document, doc! { "x": "hey", "y": 13 }));
        assert!(matches(&document, doc! {}));
    }

    #[test]
    fn operators_and_combinators() {
        let document = doc! { "n": 5, "name": "ann", "nested": { "k": 1 } };

        assert!(matches(&document, doc! { "n": { "$gt": 3, "$lte": 5 } }));
        assert!(!matches(&document, doc! { "n": { "$lt": 5 } }));
        assert!(matches(&document, doc! { "name": { "$in": ["bob", "ann"] } }));
        assert!(matches(&document, doc! { "name": { "$nin": ["bob"] } }));
        assert!(matches(&document, doc! { "other": { "$exists": false } }));
        assert!(matches(&document, doc! { "nested.k": 1 }));
        assert!(matches(&document, doc! { "$or": [{ "n": 1 }, { "name": "ann" }] }));
        assert!(!matches(&document, doc! { "$and": [{ "n": 5 }, { "name": "bob" }] }));

        assert!(
            DocumentEvaluator::new(&document)
                .matches(&doc! { "n": { "$regex": "x" } })
                .is_err()
        );
    }

    #[test]
    fn inc_keeps_integers_narrow_and_sets_missing_fields() {
        let mut document = doc! { "n": 1 };

        apply_update(&mut document, &doc! { "$inc": { "n": 2, "m": -1 } }).unwrap();
        assert_eq!(document, doc! { "n": 3, "m": -1 });

        apply_update(&mut document, &doc! { "$inc": { "n": i32::MAX } }).unwrap();
        assert_eq!(document.get("n"), Some(&Bson::Int64(i64::from(i32::MAX) + 3)));

        let mut text = doc! { "n": "x" };
        assert!(apply_update(&mut text, &doc! { "$inc": { "n": 1 } }).is_err());
    }

    #[test]
    fn array_operators() {
        let mut document = doc! { "tags": ["a", "b", "a"] };

        apply_update(&mut document, &doc! { "$pull": { "tags": "a" } }).unwrap();
        assert_eq!(document, doc! { "tags": ["b"] });

        apply_update(&mut document, &doc! { "$push": { "tags": "c", "new": 1 } }).unwrap();
        assert_eq!(document, doc! { "tags": ["b", "c"], "new": [1] });

        apply_update(&mut document, &doc! { "$pop": { "tags": 1 } }).unwrap();
        apply_update(&mut document, &doc! { "$pop": { "new": -1 } }).unwrap();
        assert_eq!(document, doc! { "tags": ["b"], "new": [] });

        apply_update(&mut document, &doc! { "$pop": { "new": 1, "absent": 1 } }).unwrap();
        assert_eq!(document, doc! { "tags": ["b"], "new": [] });
    }

    #[test]
    fn identifier_is_immutable() {
        let mut document = doc! { "_id": ObjectId::new(), "x": 1 };

        assert!(apply_update(&mut document, &doc! { "$set": { "_id": ObjectId::new() } }).is_err());
        assert!(apply_update(&mut document, &doc! { "$set": { "x": 2 } }).is_ok());
    }
}
