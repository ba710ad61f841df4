//! Reconciles user-declared method signatures with the generated implementations.
//!
//! A repository can be given [`MethodSignature`]s describing how the application wants
//! to call a generated method: its name, the order and kind of its parameters and a
//! return annotation that uses the [`TypeAnnotation::Dto`] placeholder. At wiring time
//! each signature is checked once ([`AdaptedSignature::adapt`]); at call time
//! [`bind`] maps the caller's [`CallArgs`] onto the parameters the generated
//! implementation takes, turning every remaining named argument into a filter entry.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::signature::{CallArgs, MethodSignature, TypeAnnotation};
//!
//! let signature = MethodSignature::new("get")
//!     .param("name")
//!     .returns(TypeAnnotation::optional(TypeAnnotation::Dto));
//!
//! // Later, through the repository:
//! let user = repo.invoke("get", CallArgs::new().arg("ann")).await?;
//! ```

use bson::{Bson, Document, ser::serialize_to_bson};
use serde::Serialize;
use std::fmt;

use crate::{
    codec::from_raw_value,
    dto::{Dto, DtoDescriptor},
    error::{RepositoryError, RepositoryResult},
    filter::Filter,
    naming::MethodKind,
};

/// How a declared parameter receives its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Filled by position or by name.
    Positional,
    /// Filled by name only.
    KeywordOnly,
    /// Collects every remaining named argument.
    VarKeyword,
}

/// A type annotation in a declared signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeAnnotation {
    /// Placeholder for the repository's DTO type.
    Dto,
    Optional(Box<TypeAnnotation>),
    Sequence(Box<TypeAnnotation>),
    Bool,
    Int,
    Str,
    Any,
    Unit,
    Named(String),
}

impl TypeAnnotation {
    pub fn optional(inner: TypeAnnotation) -> Self {
        TypeAnnotation::Optional(Box::new(inner))
    }

    pub fn sequence(inner: TypeAnnotation) -> Self {
        TypeAnnotation::Sequence(Box::new(inner))
    }

    /// Renders the annotation with the placeholder substituted by `dto`.
    pub fn render(&self, dto: &str) -> String {
        match self {
            TypeAnnotation::Dto => dto.to_string(),
            TypeAnnotation::Optional(inner) => format!("Option<{}>", inner.render(dto)),
            TypeAnnotation::Sequence(inner) => format!("Vec<{}>", inner.render(dto)),
            TypeAnnotation::Bool => "bool".to_string(),
            TypeAnnotation::Int => "i64".to_string(),
            TypeAnnotation::Str => "String".to_string(),
            TypeAnnotation::Any => "Bson".to_string(),
            TypeAnnotation::Unit => "()".to_string(),
            TypeAnnotation::Named(name) => name.clone(),
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub annotation: Option<TypeAnnotation>,
}

/// A method signature declared by the application for a generated method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Option<TypeAnnotation>,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: None,
        }
    }

    /// Appends a positional parameter.
    pub fn param(self, name: impl Into<String>) -> Self {
        self.push(name, ParamKind::Positional, None)
    }

    /// Appends an annotated positional parameter.
    pub fn typed_param(self, name: impl Into<String>, annotation: TypeAnnotation) -> Self {
        self.push(name, ParamKind::Positional, Some(annotation))
    }

    /// Appends a keyword-only parameter.
    pub fn keyword(self, name: impl Into<String>) -> Self {
        self.push(name, ParamKind::KeywordOnly, None)
    }

    /// Appends a catch-all for named arguments.
    pub fn var_keyword(self, name: impl Into<String>) -> Self {
        self.push(name, ParamKind::VarKeyword, None)
    }

    pub fn returns(mut self, annotation: TypeAnnotation) -> Self {
        self.returns = Some(annotation);
        self
    }

    fn push(mut self, name: impl Into<String>, kind: ParamKind, annotation: Option<TypeAnnotation>) -> Self {
        self.params.push(Param {
            name: name.into(),
            kind,
            annotation,
        });
        self
    }

    fn positional_names(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|param| param.kind == ParamKind::Positional)
            .map(|param| param.name.as_str())
    }
}

/// A declared signature validated against the generated method vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptedSignature {
    signature: MethodSignature,
    kind: MethodKind,
    return_type: String,
}

impl AdaptedSignature {
    /// Validates `signature` and resolves the method it substitutes.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::MissingAnnotation`] if no return annotation is declared and
    /// [`RepositoryError::InvalidMethodName`] if the name is not a generated method name.
    pub fn adapt(signature: MethodSignature, descriptor: &DtoDescriptor) -> RepositoryResult<Self> {
        let Some(returns) = &signature.returns else {
            return Err(RepositoryError::MissingAnnotation(signature.name));
        };
        let return_type = returns.render(descriptor.name());

        let kind = MethodKind::parse_with(&signature.name, |field| descriptor.field(field).is_some())
            .ok_or_else(|| RepositoryError::InvalidMethodName(signature.name.clone()))?;

        Ok(Self {
            signature,
            kind,
            return_type,
        })
    }

    /// The name the application declared.
    pub fn name(&self) -> &str {
        &self.signature.name
    }

    pub fn kind(&self) -> &MethodKind {
        &self.kind
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    /// The return annotation with the DTO placeholder substituted.
    pub fn return_type(&self) -> &str {
        &self.return_type
    }
}

impl fmt::Display for AdaptedSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .signature
            .params
            .iter()
            .map(|param| match param.kind {
                ParamKind::VarKeyword => format!("**{}", param.name),
                _ => param.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ");

        write!(f, "{}({params}) -> {}", self.signature.name, self.return_type)
    }
}

/// Parameters a generated implementation takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamShape {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
    /// Whether unknown named arguments become filter entries.
    pub accepts_filters: bool,
}

impl ParamShape {
    fn knows(&self, name: &str) -> bool {
        self.required.contains(&name) || self.optional.contains(&name)
    }
}

impl MethodKind {
    /// The parameter shape of the generated implementation.
    pub fn shape(&self) -> ParamShape {
        const fn shape(
            required: &'static [&'static str],
            optional: &'static [&'static str],
            accepts_filters: bool,
        ) -> ParamShape {
            ParamShape {
                required,
                optional,
                accepts_filters,
            }
        }

        match self {
            MethodKind::Add => shape(&["dto"], &[], false),
            MethodKind::Get | MethodKind::GetAll | MethodKind::Delete | MethodKind::Pop(_) => {
                shape(&[], &[], true)
            }
            MethodKind::GetList => shape(&[], &["offset", "limit"], false),
            MethodKind::Update => shape(&["dto"], &[], true),
            MethodKind::UpdateField => shape(&["field_name", "value"], &[], true),
            MethodKind::Increment(_) | MethodKind::Decrement(_) => shape(&[], &["weight"], true),
            MethodKind::Append(_) | MethodKind::Remove(_) => shape(&["value"], &[], true),
        }
    }
}

/// Arguments of a name-dispatched call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Bson>,
    pub keyword: Document,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Bson>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Adds a named argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    /// Appends a positional argument serialized from any serde value, typically a DTO.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Serialization`] if the value cannot be serialized.
    pub fn serialized_arg<T: Serialize>(mut self, value: &T) -> RepositoryResult<Self> {
        self.positional.push(serialize_to_bson(value)?);
        Ok(self)
    }

    /// Adds a named argument serialized from any serde value.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Serialization`] if the value cannot be serialized.
    pub fn serialized_kwarg<T: Serialize>(mut self, name: impl Into<String>, value: &T) -> RepositoryResult<Self> {
        self.keyword.insert(name.into(), serialize_to_bson(value)?);
        Ok(self)
    }
}

/// Call arguments mapped onto an implementation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs {
    method: String,
    values: Document,
    pub filters: Filter,
}

/// Maps `args` onto the implementation described by `shape`.
///
/// Positional arguments follow the declared positional parameters, or the
/// implementation's own parameter order when no signature was declared. A declared
/// name the implementation does not take stands in for its next unclaimed parameter,
/// by position, and is accepted by name too. Declared parameters left over once the
/// implementation's parameters are filled, and any unknown named argument, become
/// filter entries when the implementation accepts filters.
///
/// # Errors
///
/// Returns [`RepositoryError::UnexpectedArgument`] for surplus positional arguments, an
/// argument given twice, an unknown name on an implementation without filters, or a
/// missing required argument.
pub fn bind(
    method: &str,
    args: CallArgs,
    shape: &ParamShape,
    signature: Option<&AdaptedSignature>,
) -> RepositoryResult<BoundArgs> {
    let implementation = shape.required.iter().chain(shape.optional).copied();

    // (declared name, implementation name) per positional slot
    let slots: Vec<(&str, &str)> = match signature {
        Some(adapted) => {
            let declared: Vec<&str> = adapted.signature.positional_names().collect();
            let mut unclaimed = implementation.filter(|name| !declared.contains(name));

            declared
                .iter()
                .map(|&name| {
                    if shape.knows(name) {
                        (name, name)
                    } else {
                        (name, unclaimed.next().unwrap_or(name))
                    }
                })
                .collect()
        }
        None => implementation.map(|name| (name, name)).collect(),
    };

    if args.positional.len() > slots.len() {
        return Err(RepositoryError::unexpected_argument(
            method,
            format!("{} positional arguments given, {} accepted", args.positional.len(), slots.len()),
        ));
    }

    let resolve = |name: String| {
        slots
            .iter()
            .find(|(declared, _)| *declared == name)
            .map_or(name, |(_, target)| (*target).to_string())
    };

    let named = slots
        .iter()
        .map(|(_, target)| (*target).to_string())
        .zip(args.positional)
        .chain(
            args.keyword
                .into_iter()
                .map(|(name, value)| (resolve(name), value)),
        );

    let mut bound = BoundArgs {
        method: method.to_string(),
        ..Default::default()
    };
    let mut seen = std::collections::HashSet::new();

    for (name, value) in named {
        if !seen.insert(name.clone()) {
            return Err(RepositoryError::unexpected_argument(
                method,
                format!("{name} given more than once"),
            ));
        }

        if shape.knows(&name) {
            bound.values.insert(name, value);
        } else if shape.accepts_filters {
            bound.filters.insert(name, value);
        } else {
            return Err(RepositoryError::unexpected_argument(method, name));
        }
    }

    if let Some(missing) = shape
        .required
        .iter()
        .find(|name| !bound.values.contains_key(**name))
    {
        return Err(RepositoryError::unexpected_argument(
            method,
            format!("missing required argument {missing}"),
        ));
    }

    Ok(bound)
}

impl BoundArgs {
    fn take(&mut self, name: &str) -> Option<Bson> {
        self.values.remove(name)
    }

    fn require(&mut self, name: &str) -> RepositoryResult<Bson> {
        self.take(name)
            .ok_or_else(|| RepositoryError::unexpected_argument(&self.method, format!("missing required argument {name}")))
    }

    /// Takes a required argument as-is.
    pub fn value(&mut self, name: &str) -> RepositoryResult<Bson> {
        self.require(name)
    }

    /// Takes a required argument and decodes it as the DTO.
    pub fn dto<D: Dto>(&mut self, name: &str) -> RepositoryResult<D> {
        from_raw_value(self.require(name)?)
    }

    /// Takes a required string argument.
    pub fn string(&mut self, name: &str) -> RepositoryResult<String> {
        match self.require(name)? {
            Bson::String(value) => Ok(value),
            other => Err(self.conversion(name, "a string", &other)),
        }
    }

    /// Takes an optional integer argument; null counts as absent.
    pub fn optional_i64(&mut self, name: &str) -> RepositoryResult<Option<i64>> {
        match self.take(name) {
            None | Some(Bson::Null) => Ok(None),
            Some(Bson::Int32(value)) => Ok(Some(i64::from(value))),
            Some(Bson::Int64(value)) => Ok(Some(value)),
            Some(other) => Err(self.conversion(name, "an integer", &other)),
        }
    }

    /// Takes an optional non-negative integer argument, falling back to `default`.
    pub fn u64_or(&mut self, name: &str, default: u64) -> RepositoryResult<u64> {
        let Some(value) = self.optional_i64(name)? else {
            return Ok(default);
        };

        u64::try_from(value).map_err(|_| self.conversion(name, "a non-negative integer", &Bson::Int64(value)))
    }

    fn conversion(&self, name: &str, expected: &str, got: &Bson) -> RepositoryError {
        RepositoryError::Conversion(format!(
            "{}: argument {name} must be {expected}, got {:?}",
            self.method,
            got.element_type()
        ))
    }
}

/// Result of a name-dispatched call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutput<D> {
    Dto(D),
    MaybeDto(Option<D>),
    Dtos(Vec<D>),
    Bool(bool),
    Value(Option<Bson>),
    Unit,
}

impl<D> CallOutput<D> {
    pub fn into_dto(self) -> Option<D> {
        match self {
            CallOutput::Dto(dto) | CallOutput::MaybeDto(Some(dto)) => Some(dto),
            _ => None,
        }
    }

    pub fn into_dtos(self) -> Option<Vec<D>> {
        match self {
            CallOutput::Dtos(dtos) => Some(dtos),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CallOutput::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Bson> {
        match self {
            CallOutput::Value(value) => value,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;
    use crate::dto::FieldKind;

    fn descriptor() -> DtoDescriptor {
        DtoDescriptor::builder("User")
            .identifier("id")
            .field("name", FieldKind::String)
            .field("visits", FieldKind::Integer)
            .field("tags", FieldKind::Array)
            .build()
    }

    #[test]
    fn adapt_requires_return_annotation() {
        let result = AdaptedSignature::adapt(MethodSignature::new("get").param("name"), &descriptor());

        assert!(matches!(result, Err(RepositoryError::MissingAnnotation(name)) if name == "get"));
    }

    #[test]
    fn adapt_rejects_unknown_names() {
        let signature = MethodSignature::new("fetch").returns(TypeAnnotation::Dto);

        assert!(matches!(
            AdaptedSignature::adapt(signature, &descriptor()),
            Err(RepositoryError::InvalidMethodName(name)) if name == "fetch"
        ));
    }

    #[test]
    fn adapt_substitutes_the_dto_placeholder() {
        let signature = MethodSignature::new("_get_all")
            .var_keyword("filters")
            .returns(TypeAnnotation::sequence(TypeAnnotation::Dto));
        let adapted = AdaptedSignature::adapt(signature, &descriptor()).unwrap();

        assert_eq!(adapted.kind(), &MethodKind::GetAll);
        assert_eq!(adapted.return_type(), "Vec<User>");
        assert_eq!(adapted.to_string(), "_get_all(**filters) -> Vec<User>");
    }

    #[test]
    fn positional_arguments_follow_declared_names() {
        let signature = MethodSignature::new("get")
            .param("name")
            .returns(TypeAnnotation::optional(TypeAnnotation::Dto));
        let adapted = AdaptedSignature::adapt(signature, &descriptor()).unwrap();

        let bound = bind(
            "get",
            CallArgs::new().arg("ann").kwarg("visits", 3),
            &MethodKind::Get.shape(),
            Some(&adapted),
        )
        .unwrap();

        assert_eq!(bound.filters.as_document(), &doc! { "name": "ann", "visits": 3 });
    }

    #[test]
    fn renamed_parameters_bind_by_position() {
        let signature = MethodSignature::new("update")
            .param("item")
            .var_keyword("filters")
            .returns(TypeAnnotation::optional(TypeAnnotation::Dto));
        let adapted = AdaptedSignature::adapt(signature, &descriptor()).unwrap();
        let shape = MethodKind::Update.shape();

        let mut bound = bind(
            "update",
            CallArgs::new().arg(doc! { "name": "ann" }).kwarg("visits", 42),
            &shape,
            Some(&adapted),
        )
        .unwrap();
        assert_eq!(bound.value("dto").unwrap(), Bson::Document(doc! { "name": "ann" }));
        assert_eq!(bound.filters.as_document(), &doc! { "visits": 42 });

        // the declared name also works as a keyword
        let mut bound = bind(
            "update",
            CallArgs::new().kwarg("item", doc! { "name": "bob" }),
            &shape,
            Some(&adapted),
        )
        .unwrap();
        assert_eq!(bound.value("dto").unwrap(), Bson::Document(doc! { "name": "bob" }));
        assert!(bound.filters.is_empty());
    }

    #[test]
    fn renamed_parameters_fill_implementation_slots_in_order() {
        let signature = MethodSignature::new("update_field")
            .param("field")
            .param("new_value")
            .param("name")
            .returns(TypeAnnotation::optional(TypeAnnotation::Dto));
        let adapted = AdaptedSignature::adapt(signature, &descriptor()).unwrap();

        let mut bound = bind(
            "update_field",
            CallArgs::new().arg("visits").arg(7).arg("ann"),
            &MethodKind::UpdateField.shape(),
            Some(&adapted),
        )
        .unwrap();

        assert_eq!(bound.string("field_name").unwrap(), "visits");
        assert_eq!(bound.value("value").unwrap(), Bson::Int32(7));
        assert_eq!(bound.filters.as_document(), &doc! { "name": "ann" });
    }

    #[test]
    fn positional_arguments_default_to_implementation_order() {
        let mut bound = bind(
            "update_field",
            CallArgs::new().arg("name").arg("bob").kwarg("visits", 1),
            &MethodKind::UpdateField.shape(),
            None,
        )
        .unwrap();

        assert_eq!(bound.string("field_name").unwrap(), "name");
        assert_eq!(bound.value("value").unwrap(), Bson::String("bob".into()));
        assert_eq!(bound.filters.as_document(), &doc! { "visits": 1 });
    }

    #[test]
    fn rejects_unknown_keyword_without_filters() {
        let result = bind(
            "get_list",
            CallArgs::new().kwarg("name", "ann"),
            &MethodKind::GetList.shape(),
            None,
        );

        assert!(matches!(
            result,
            Err(RepositoryError::UnexpectedArgument { argument, .. }) if argument == "name"
        ));
    }

    #[test]
    fn rejects_surplus_duplicate_and_missing_arguments() {
        let shape = MethodKind::Append("tags".into()).shape();

        assert!(bind("tags__append", CallArgs::new().arg("a").arg("b"), &shape, None).is_err());
        assert!(bind("tags__append", CallArgs::new().arg("a").kwarg("value", "b"), &shape, None).is_err());
        assert!(bind("tags__append", CallArgs::new().kwarg("name", "ann"), &shape, None).is_err());
    }

    #[test]
    fn list_arguments_fall_back_to_defaults() {
        let mut bound = bind("get_list", CallArgs::new().arg(5), &MethodKind::GetList.shape(), None).unwrap();

        assert_eq!(bound.u64_or("offset", 0).unwrap(), 5);
        assert_eq!(bound.u64_or("limit", 20).unwrap(), 20);

        let mut bound = bind("get_list", CallArgs::new().arg(-1), &MethodKind::GetList.shape(), None).unwrap();
        assert!(matches!(bound.u64_or("offset", 0), Err(RepositoryError::Conversion(_))));
    }
}
