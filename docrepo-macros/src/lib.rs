//! Procedural macros for the docrepo project.
//!
//! This crate provides `#[derive(Dto)]`, which publishes a struct's field layout as a
//! `DtoDescriptor` so repositories can validate field names and map the identifier.
//!
//! # Attributes
//!
//! - `#[dto(id)]` on a field marks it as the string form of the native identifier
//! - `#[dto(kind = "integer")]` overrides the inferred field kind
//! - `#[dto(skip)]` leaves a field out of the descriptor
//! - `#[dto(name = "Account")]` on the struct overrides the DTO name
//!
//! Field names follow `#[serde(rename = "...")]`, `#[serde(skip)]` and the container's
//! `#[serde(rename_all = "...")]`, so the descriptor matches the serialized document.
//!
//! ```ignore
//! use docrepo::prelude::*;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Dto)]
//! pub struct User {
//!     #[dto(id)]
//!     #[serde(default)]
//!     pub id: String,
//!     #[serde(rename = "displayName")]
//!     pub name: String,
//!     pub tags: Vec<String>,
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_macros;

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Fields, GenericArgument, LitStr, PathArguments, Token, Type, parenthesized,
    parse_macro_input, spanned::Spanned,
};

#[proc_macro_derive(Dto, attributes(dto))]
pub fn derive_dto(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[derive(Default)]
struct ContainerAttrs {
    name: Option<String>,
    rename_all: Option<String>,
}

#[derive(Default)]
struct FieldAttrs {
    id: bool,
    skip: bool,
    kind: Option<String>,
    rename: Option<String>,
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let container = container_attrs(&input.attrs)?;

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(Span::call_site(), "Dto can only be derived for structs"));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(data.fields.span(), "Dto requires named fields"));
    };

    let dto_name = container
        .name
        .clone()
        .unwrap_or_else(|| ident.to_string());

    let mut calls = Vec::new();
    let mut has_id = false;

    for field in &fields.named {
        let attrs = field_attrs(&field.attrs)?;
        if attrs.skip {
            continue;
        }

        let Some(field_ident) = &field.ident else {
            continue;
        };
        let rust_name = field_ident
            .to_string()
            .trim_start_matches("r#")
            .to_string();
        let name = match (&attrs.rename, &container.rename_all) {
            (Some(rename), _) => rename.clone(),
            (None, Some(rule)) => apply_rename_rule(rule, &rust_name, field.span())?,
            (None, None) => rust_name,
        };

        if attrs.id {
            if has_id {
                return Err(syn::Error::new(field.span(), "only one field can be marked #[dto(id)]"));
            }
            has_id = true;
            calls.push(quote! { .identifier(#name) });
            continue;
        }

        let kind = match &attrs.kind {
            Some(kind) => kind_tokens(kind, field.span())?,
            None => infer_kind(&field.ty),
        };
        calls.push(quote! { .field(#name, #kind) });
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::docrepo::dto::Dto for #ident #ty_generics #where_clause {
            fn descriptor() -> ::docrepo::dto::DtoDescriptor {
                ::docrepo::dto::DtoDescriptor::builder(#dto_name)
                    #(#calls)*
                    .build()
            }
        }
    })
}

fn container_attrs(attrs: &[Attribute]) -> syn::Result<ContainerAttrs> {
    let mut parsed = ContainerAttrs::default();

    for attr in attrs {
        if attr.path().is_ident("dto") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    parsed.name = Some(meta.value()?.parse::<LitStr>()?.value());
                    Ok(())
                } else {
                    Err(meta.error("unsupported dto container attribute"))
                }
            })?;
        } else if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename_all") {
                    parsed.rename_all = Some(meta.value()?.parse::<LitStr>()?.value());
                    Ok(())
                } else {
                    skip_meta(&meta)
                }
            })?;
        }
    }

    Ok(parsed)
}

fn field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut parsed = FieldAttrs::default();

    for attr in attrs {
        if attr.path().is_ident("dto") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("id") {
                    parsed.id = true;
                    Ok(())
                } else if meta.path.is_ident("skip") {
                    parsed.skip = true;
                    Ok(())
                } else if meta.path.is_ident("kind") {
                    parsed.kind = Some(meta.value()?.parse::<LitStr>()?.value());
                    Ok(())
                } else {
                    Err(meta.error("unsupported dto field attribute"))
                }
            })?;
        } else if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") && meta.input.peek(Token![=]) {
                    parsed.rename = Some(meta.value()?.parse::<LitStr>()?.value());
                    Ok(())
                } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_serializing") {
                    parsed.skip = true;
                    Ok(())
                } else {
                    skip_meta(&meta)
                }
            })?;
        }
    }

    Ok(parsed)
}

/// Consumes a serde option this macro does not interpret.
fn skip_meta(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<()> {
    if meta.input.peek(Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        let content;
        parenthesized!(content in meta.input);
        content.parse::<TokenStream2>()?;
    }

    Ok(())
}

fn kind_tokens(kind: &str, span: Span) -> syn::Result<TokenStream2> {
    let variant = match kind {
        "string" => quote! { String },
        "integer" => quote! { Integer },
        "float" => quote! { Float },
        "boolean" => quote! { Boolean },
        "array" => quote! { Array },
        "document" => quote! { Document },
        "identifier" => quote! { Identifier },
        "any" => quote! { Any },
        other => return Err(syn::Error::new(span, format!("unknown field kind \"{other}\""))),
    };

    Ok(quote! { ::docrepo::dto::FieldKind::#variant })
}

fn infer_kind(ty: &Type) -> TokenStream2 {
    let variant = match ty {
        Type::Array(_) | Type::Slice(_) => quote! { Array },
        Type::Reference(reference) => return infer_kind(&reference.elem),
        Type::Path(path) => {
            let Some(segment) = path.path.segments.last() else {
                return quote! { ::docrepo::dto::FieldKind::Any };
            };

            match segment.ident.to_string().as_str() {
                "Option" | "Box" => match first_type_argument(&segment.arguments) {
                    Some(inner) => return infer_kind(inner),
                    None => quote! { Any },
                },
                "String" | "str" => quote! { String },
                "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64" | "u128"
                | "usize" => quote! { Integer },
                "f32" | "f64" => quote! { Float },
                "bool" => quote! { Boolean },
                "Vec" | "VecDeque" | "HashSet" | "BTreeSet" => quote! { Array },
                "HashMap" | "BTreeMap" | "Document" => quote! { Document },
                _ => quote! { Any },
            }
        }
        _ => quote! { Any },
    };

    quote! { ::docrepo::dto::FieldKind::#variant }
}

fn first_type_argument(arguments: &PathArguments) -> Option<&Type> {
    let PathArguments::AngleBracketed(arguments) = arguments else {
        return None;
    };

    arguments
        .args
        .iter()
        .find_map(|argument| match argument {
            GenericArgument::Type(ty) => Some(ty),
            _ => None,
        })
}

fn apply_rename_rule(rule: &str, name: &str, span: Span) -> syn::Result<String> {
    let words: Vec<&str> = name
        .split('_')
        .filter(|word| !word.is_empty())
        .collect();

    let capitalize = |word: &str| {
        let mut chars = word.chars();
        chars
            .next()
            .map(|first| first.to_uppercase().chain(chars).collect::<String>())
            .unwrap_or_default()
    };

    Ok(match rule {
        "lowercase" => name.to_lowercase(),
        "UPPERCASE" => name.to_uppercase(),
        "snake_case" => name.to_string(),
        "SCREAMING_SNAKE_CASE" => name.to_uppercase(),
        "kebab-case" => name.replace('_', "-"),
        "SCREAMING-KEBAB-CASE" => name.replace('_', "-").to_uppercase(),
        "PascalCase" => words
            .iter()
            .map(|word| capitalize(word))
            .collect(),
        "camelCase" => words
            .iter()
            .enumerate()
            .map(|(index, word)| if index == 0 { word.to_string() } else { capitalize(word) })
            .collect(),
        other => return Err(syn::Error::new(span, format!("unsupported rename_all rule \"{other}\""))),
    })
}
