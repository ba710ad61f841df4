//! Conventional names of generated methods and access-level name mangling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Visibility convention applied to generated method names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    #[default]
    Public,
    /// Names are prefixed with `_`.
    Protected,
    /// Names are prefixed with `__`.
    Private,
}

impl Access {
    pub fn prefix(self) -> &'static str {
        match self {
            Access::Public => "",
            Access::Protected => "_",
            Access::Private => "__",
        }
    }

    /// Applies the access prefix to a conventional method name.
    pub fn mangle(self, name: &str) -> String {
        format!("{}{name}", self.prefix())
    }
}

/// Every kind of method the factory can generate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MethodKind {
    Add,
    Get,
    GetList,
    GetAll,
    Update,
    Delete,
    UpdateField,
    Increment(String),
    Decrement(String),
    Append(String),
    Remove(String),
    Pop(String),
}

impl MethodKind {
    /// The conventional (public) name of the method.
    pub fn name(&self) -> String {
        match self {
            MethodKind::Add => "add".to_string(),
            MethodKind::Get => "get".to_string(),
            MethodKind::GetList => "get_list".to_string(),
            MethodKind::GetAll => "get_all".to_string(),
            MethodKind::Update => "update".to_string(),
            MethodKind::Delete => "delete".to_string(),
            MethodKind::UpdateField => "update_field".to_string(),
            MethodKind::Increment(field) => format!("increment_{field}"),
            MethodKind::Decrement(field) => format!("decrement_{field}"),
            MethodKind::Append(field) => format!("{field}__append"),
            MethodKind::Remove(field) => format!("{field}__remove"),
            MethodKind::Pop(field) => format!("{field}__pop"),
        }
    }

    /// Additional conventional names the method is reachable under.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            MethodKind::Add => &["create"],
            _ => &[],
        }
    }

    /// The field a specialized method operates on.
    pub fn field(&self) -> Option<&str> {
        match self {
            MethodKind::Increment(field)
            | MethodKind::Decrement(field)
            | MethodKind::Append(field)
            | MethodKind::Remove(field)
            | MethodKind::Pop(field) => Some(field),
            _ => None,
        }
    }

    /// Resolves a method name, with or without an access prefix, to its kind.
    ///
    /// Returns `None` for names outside the generated vocabulary.
    pub fn parse(name: &str) -> Option<Self> {
        Self::parse_with(name, |_| true)
    }

    /// Like [`MethodKind::parse`], but a specialized method only resolves when
    /// `is_field` accepts its field name. Tells `__tags__pop` on field `tags`
    /// apart from `__tags__pop` on field `__tags`.
    pub fn parse_with(name: &str, is_field: impl Fn(&str) -> bool) -> Option<Self> {
        [Some(name), name.strip_prefix("__"), name.strip_prefix('_')]
            .into_iter()
            .flatten()
            .filter_map(Self::parse_exact)
            .find(|kind| kind.field().is_none_or(&is_field))
    }

    fn parse_exact(name: &str) -> Option<Self> {
        let kind = match name {
            "add" | "create" => MethodKind::Add,
            "get" => MethodKind::Get,
            "get_list" => MethodKind::GetList,
            "get_all" => MethodKind::GetAll,
            "update" => MethodKind::Update,
            "delete" => MethodKind::Delete,
            "update_field" => MethodKind::UpdateField,
            _ => return Self::parse_field_method(name),
        };
        Some(kind)
    }

    fn parse_field_method(name: &str) -> Option<Self> {
        let non_empty = |field: &str| (!field.is_empty()).then(|| field.to_string());

        if let Some(field) = name.strip_prefix("increment_") {
            return non_empty(field).map(MethodKind::Increment);
        }
        if let Some(field) = name.strip_prefix("decrement_") {
            return non_empty(field).map(MethodKind::Decrement);
        }
        if let Some(field) = name.strip_suffix("__append") {
            return non_empty(field).map(MethodKind::Append);
        }
        if let Some(field) = name.strip_suffix("__remove") {
            return non_empty(field).map(MethodKind::Remove);
        }
        if let Some(field) = name.strip_suffix("__pop") {
            return non_empty(field).map(MethodKind::Pop);
        }
        None
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangles_by_access_level() {
        assert_eq!(Access::Public.mangle("get"), "get");
        assert_eq!(Access::Protected.mangle("get"), "_get");
        assert_eq!(Access::Private.mangle("visits__pop"), "__visits__pop");
    }

    #[test]
    fn parses_conventional_names() {
        assert_eq!(MethodKind::parse("create"), Some(MethodKind::Add));
        assert_eq!(MethodKind::parse("_get_all"), Some(MethodKind::GetAll));
        assert_eq!(MethodKind::parse("__update_field"), Some(MethodKind::UpdateField));
        assert_eq!(
            MethodKind::parse("increment_visits"),
            Some(MethodKind::Increment("visits".into()))
        );
        assert_eq!(MethodKind::parse("tags__pop"), Some(MethodKind::Pop("tags".into())));
        assert_eq!(
            MethodKind::parse_with("__tags__remove", |field| field == "tags"),
            Some(MethodKind::Remove("tags".into()))
        );
        assert_eq!(
            MethodKind::parse_with("_id__pop", |field| field == "_id"),
            Some(MethodKind::Pop("_id".into()))
        );
        assert_eq!(MethodKind::parse("__pop"), None);
        assert_eq!(MethodKind::parse("increment_"), None);
        assert_eq!(MethodKind::parse("fetch"), None);
    }

    #[test]
    fn names_round_trip() {
        for kind in [
            MethodKind::GetList,
            MethodKind::Decrement("n".into()),
            MethodKind::Append("xs".into()),
        ] {
            assert_eq!(MethodKind::parse(&kind.name()), Some(kind));
        }
    }
}
