//! Repository configuration and the single wiring pass that builds the method table.
//!
//! [`RepositoryBuilder`] collects the declarative configuration of one repository:
//! the bound collection, the optional index, the access level and the enabled
//! [`Features`]. Building it runs the factory for every enabled feature, adapts any
//! user-declared signatures and freezes the resulting methods under their conventional
//! (or access-mangled) names.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::prelude::*;
//!
//! let repo = Repository::<User, _>::builder()
//!     .collection(store.collection("users"))
//!     .index(IndexSpec::new("name").unique(true))
//!     .features(Features::default().integer_field("visits").array_field("tags"))
//!     .build()
//!     .await?;
//! ```

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    marker::PhantomData,
    sync::Arc,
};

use crate::{
    backend::{Command, Reply},
    dto::{Dto, DtoDescriptor},
    error::{RepositoryError, RepositoryResult},
    filter::Filter,
    index::IndexSpec,
    methods::{
        Add, DEFAULT_LIMIT, DEFAULT_OFFSET, Delete, Get, GetAll, GetList, IntegerField, ListArgs, ListCommand,
        ListField, MethodFactory, Operation, PopList, Update, UpdateField,
    },
    naming::{Access, MethodKind},
    signature::{AdaptedSignature, CallArgs, CallOutput, MethodSignature, bind},
};

/// Which methods a repository generates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub add: bool,
    pub get: bool,
    /// Also enables `get_list`.
    pub get_all: bool,
    pub update: bool,
    pub delete: bool,
    pub update_field: bool,
    /// Fields that get `increment_{field}` and `decrement_{field}`.
    pub integer_fields: Vec<String>,
    /// Fields that get `{field}__append`, `{field}__remove` and `{field}__pop`.
    pub array_fields: Vec<String>,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            add: true,
            get: true,
            get_all: true,
            update: true,
            delete: true,
            update_field: true,
            integer_fields: Vec::new(),
            array_fields: Vec::new(),
        }
    }
}

impl Features {
    /// No generated methods at all.
    pub fn none() -> Self {
        Self {
            add: false,
            get: false,
            get_all: false,
            update: false,
            delete: false,
            update_field: false,
            integer_fields: Vec::new(),
            array_fields: Vec::new(),
        }
    }

    pub fn integer_field(mut self, field: impl Into<String>) -> Self {
        self.integer_fields.push(field.into());
        self
    }

    pub fn array_field(mut self, field: impl Into<String>) -> Self {
        self.array_fields.push(field.into());
        self
    }
}

/// The declarative part of a repository's configuration, loadable from a config file.
///
/// ```ignore
/// let options: RepositoryOptions = serde_json::from_str(r#"{
///     "index": {"field": "email", "unique": true},
///     "method_access": "protected",
///     "delete": false,
///     "integer_fields": ["visits"]
/// }"#)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryOptions {
    pub index: Option<IndexSpec>,
    pub method_access: Access,
    #[serde(flatten)]
    pub features: Features,
}

/// A generated method held by a repository.
pub(crate) enum GeneratedMethod<D> {
    Add(Add<D>),
    Get(Get<D>),
    GetList(GetList<D>),
    GetAll(GetAll<D>),
    Update(Update<D>),
    Delete(Delete),
    UpdateField(UpdateField<D>),
    Integer(IntegerField),
    List(ListField),
    Pop(PopList),
}

struct Entry<D> {
    kind: MethodKind,
    method: GeneratedMethod<D>,
    signature: Option<AdaptedSignature>,
}

/// The frozen set of methods of one repository.
pub(crate) struct MethodTable<D> {
    entries: Vec<Entry<D>>,
    kinds: HashMap<MethodKind, usize>,
    names: BTreeMap<String, usize>,
    access: Access,
}

/// A name-dispatched call, ready to run against either kind of collection.
pub(crate) enum PreparedCall<'a, D> {
    Single {
        command: Command,
        finish: Box<dyn FnOnce(Reply) -> RepositoryResult<CallOutput<D>> + Send + 'a>,
    },
    All {
        plan: &'a GetAll<D>,
        filter: Filter,
    },
}

fn single<'a, O, D>(
    operation: &'a O,
    args: O::Args,
    wrap: fn(O::Output) -> CallOutput<D>,
) -> RepositoryResult<PreparedCall<'a, D>>
where
    O: Operation + Sync,
    O::Context: Send + 'a,
    D: 'a,
{
    let (command, context) = operation.prepare(args)?;

    Ok(PreparedCall::Single {
        command,
        finish: Box::new(move |reply| {
            operation
                .complete(context, reply)
                .map(wrap)
        }),
    })
}

impl<D: Dto> MethodTable<D> {
    fn new(access: Access) -> Self {
        Self {
            entries: Vec::new(),
            kinds: HashMap::new(),
            names: BTreeMap::new(),
            access,
        }
    }

    fn register(&mut self, dto: &str, kind: MethodKind, method: GeneratedMethod<D>, signature: Option<AdaptedSignature>) {
        let index = self.entries.len();

        let mut names = vec![self.access.mangle(&kind.name())];
        names.extend(kind.aliases().iter().map(|alias| self.access.mangle(alias)));
        if let Some(adapted) = &signature {
            if !names.iter().any(|name| name == adapted.name()) {
                names.push(adapted.name().to_string());
            }
        }

        for name in names {
            tracing::debug!(dto = %dto, method = %name, substituted = signature.is_some(), "method attached");
            self.names.insert(name, index);
        }

        self.kinds.insert(kind.clone(), index);
        self.entries.push(Entry {
            kind,
            method,
            signature,
        });
    }

    /// Every attached name, sorted.
    pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub(crate) fn signature(&self, name: &str) -> Option<&AdaptedSignature> {
        self.names
            .get(name)
            .and_then(|&index| self.entries[index].signature.as_ref())
    }

    fn lookup<'a, T>(
        &'a self,
        kind: MethodKind,
        pick: impl FnOnce(&'a GeneratedMethod<D>) -> Option<&'a T>,
    ) -> RepositoryResult<&'a T> {
        self.kinds
            .get(&kind)
            .and_then(|&index| pick(&self.entries[index].method))
            .ok_or_else(|| RepositoryError::MethodNotEnabled(self.access.mangle(&kind.name())))
    }

    pub(crate) fn add(&self) -> RepositoryResult<&Add<D>> {
        self.lookup(MethodKind::Add, |method| match method {
            GeneratedMethod::Add(op) => Some(op),
            _ => None,
        })
    }

    pub(crate) fn get(&self) -> RepositoryResult<&Get<D>> {
        self.lookup(MethodKind::Get, |method| match method {
            GeneratedMethod::Get(op) => Some(op),
            _ => None,
        })
    }

    pub(crate) fn get_list(&self) -> RepositoryResult<&GetList<D>> {
        self.lookup(MethodKind::GetList, |method| match method {
            GeneratedMethod::GetList(op) => Some(op),
            _ => None,
        })
    }

    pub(crate) fn get_all(&self) -> RepositoryResult<&GetAll<D>> {
        self.lookup(MethodKind::GetAll, |method| match method {
            GeneratedMethod::GetAll(op) => Some(op),
            _ => None,
        })
    }

    pub(crate) fn update(&self) -> RepositoryResult<&Update<D>> {
        self.lookup(MethodKind::Update, |method| match method {
            GeneratedMethod::Update(op) => Some(op),
            _ => None,
        })
    }

    pub(crate) fn delete(&self) -> RepositoryResult<&Delete> {
        self.lookup(MethodKind::Delete, |method| match method {
            GeneratedMethod::Delete(op) => Some(op),
            _ => None,
        })
    }

    pub(crate) fn update_field(&self) -> RepositoryResult<&UpdateField<D>> {
        self.lookup(MethodKind::UpdateField, |method| match method {
            GeneratedMethod::UpdateField(op) => Some(op),
            _ => None,
        })
    }

    pub(crate) fn increment(&self, field: &str) -> RepositoryResult<&IntegerField> {
        self.integer(MethodKind::Increment(field.to_string()))
    }

    pub(crate) fn decrement(&self, field: &str) -> RepositoryResult<&IntegerField> {
        self.integer(MethodKind::Decrement(field.to_string()))
    }

    fn integer(&self, kind: MethodKind) -> RepositoryResult<&IntegerField> {
        self.lookup(kind, |method| match method {
            GeneratedMethod::Integer(op) => Some(op),
            _ => None,
        })
    }

    pub(crate) fn append(&self, field: &str) -> RepositoryResult<&ListField> {
        self.list(MethodKind::Append(field.to_string()))
    }

    pub(crate) fn remove(&self, field: &str) -> RepositoryResult<&ListField> {
        self.list(MethodKind::Remove(field.to_string()))
    }

    fn list(&self, kind: MethodKind) -> RepositoryResult<&ListField> {
        self.lookup(kind, |method| match method {
            GeneratedMethod::List(op) => Some(op),
            _ => None,
        })
    }

    pub(crate) fn pop(&self, field: &str) -> RepositoryResult<&PopList> {
        self.lookup(MethodKind::Pop(field.to_string()), |method| match method {
            GeneratedMethod::Pop(op) => Some(op),
            _ => None,
        })
    }

    /// Resolves `name`, binds `args` through the method's signature and prepares the call.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::MethodNotEnabled`] for a known but unattached name,
    /// [`RepositoryError::InvalidMethodName`] for any other unknown name, and binding
    /// errors from the signature adapter.
    pub(crate) fn prepare_call(&self, name: &str, args: CallArgs) -> RepositoryResult<PreparedCall<'_, D>> {
        let Some(&index) = self.names.get(name) else {
            return Err(match MethodKind::parse(name) {
                Some(_) => RepositoryError::MethodNotEnabled(name.to_string()),
                None => RepositoryError::InvalidMethodName(name.to_string()),
            });
        };

        let entry = &self.entries[index];
        let mut bound = bind(name, args, &entry.kind.shape(), entry.signature.as_ref())?;

        match &entry.method {
            GeneratedMethod::Add(op) => single(op, bound.dto("dto")?, CallOutput::Dto),
            GeneratedMethod::Get(op) => single(op, bound.filters, CallOutput::MaybeDto),
            GeneratedMethod::GetList(op) => {
                let args = ListArgs {
                    offset: bound.u64_or("offset", DEFAULT_OFFSET)?,
                    limit: bound.u64_or("limit", DEFAULT_LIMIT)?,
                };
                single(op, args, CallOutput::Dtos)
            }
            GeneratedMethod::GetAll(plan) => Ok(PreparedCall::All {
                plan,
                filter: bound.filters,
            }),
            GeneratedMethod::Update(op) => {
                let dto = bound.dto("dto")?;
                single(op, (dto, bound.filters), CallOutput::MaybeDto)
            }
            GeneratedMethod::Delete(op) => single(op, bound.filters, CallOutput::Bool),
            GeneratedMethod::UpdateField(op) => {
                let field = bound.string("field_name")?;
                let value = bound.value("value")?;
                single(op, (field, value, bound.filters), CallOutput::MaybeDto)
            }
            GeneratedMethod::Integer(op) => {
                let weight = bound.optional_i64("weight")?;
                single(op, (weight, bound.filters), |()| CallOutput::Unit)
            }
            GeneratedMethod::List(op) => {
                let value = bound.value("value")?;
                single(op, (value, bound.filters), |()| CallOutput::Unit)
            }
            GeneratedMethod::Pop(op) => single(op, bound.filters, CallOutput::Value),
        }
    }
}

/// The outcome of the wiring pass, before the index is created.
pub(crate) struct Wired<D, C> {
    pub(crate) collection: C,
    pub(crate) descriptor: Arc<DtoDescriptor>,
    pub(crate) table: MethodTable<D>,
    pub(crate) index: Option<IndexSpec>,
}

/// Builder for async and blocking repositories.
///
/// Finish with `build().await` for a [`crate::repository::Repository`] or
/// `build_blocking()` for a [`crate::blocking::Repository`].
pub struct RepositoryBuilder<D, C> {
    collection: Option<C>,
    options: RepositoryOptions,
    signatures: Vec<MethodSignature>,
    _dto: PhantomData<fn() -> D>,
}

impl<D, C> Default for RepositoryBuilder<D, C> {
    fn default() -> Self {
        Self {
            collection: None,
            options: RepositoryOptions::default(),
            signatures: Vec::new(),
            _dto: PhantomData,
        }
    }
}

impl<D: Dto, C> RepositoryBuilder<D, C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the collection the generated methods operate on. Required.
    pub fn collection(mut self, collection: C) -> Self {
        self.collection = Some(collection);
        self
    }

    /// Replaces index, access and features at once.
    pub fn options(mut self, options: RepositoryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn index(mut self, index: impl Into<IndexSpec>) -> Self {
        self.options.index = Some(index.into());
        self
    }

    pub fn method_access(mut self, access: Access) -> Self {
        self.options.method_access = access;
        self
    }

    pub fn features(mut self, features: Features) -> Self {
        self.options.features = features;
        self
    }

    /// Declares the application's signature for a generated method.
    pub fn substitute(mut self, signature: MethodSignature) -> Self {
        self.signatures.push(signature);
        self
    }

    /// Runs the wiring pass. Validation happens before anything is attached.
    pub(crate) fn wire(self) -> RepositoryResult<Wired<D, C>> {
        let descriptor = D::descriptor();
        let dto = descriptor.name().to_string();

        let collection = self
            .collection
            .ok_or_else(|| RepositoryError::Configuration(format!("no collection configured for {dto}")))?;

        descriptor.validate()?;

        let RepositoryOptions {
            index,
            method_access,
            features,
        } = self.options;

        for field in features
            .integer_fields
            .iter()
            .chain(&features.array_fields)
        {
            descriptor.require_field(field)?;
        }

        let mut signatures = HashMap::new();
        for signature in self.signatures {
            let adapted = AdaptedSignature::adapt(signature, &descriptor)?;
            if let Some(previous) = signatures.insert(adapted.kind().clone(), adapted) {
                tracing::warn!(dto = %dto, method = previous.name(), "signature declared twice, keeping the last one");
            }
        }

        let factory = MethodFactory::<D>::with_descriptor(Arc::new(descriptor));
        let mut table = MethodTable::new(method_access);
        let mut attach = |kind: MethodKind, method: GeneratedMethod<D>| {
            let signature = signatures.remove(&kind);
            table.register(&dto, kind, method, signature);
        };

        if features.add {
            attach(MethodKind::Add, GeneratedMethod::Add(factory.add()));
        }
        if features.get {
            attach(MethodKind::Get, GeneratedMethod::Get(factory.get()));
        }
        if features.get_all {
            attach(MethodKind::GetAll, GeneratedMethod::GetAll(factory.get_all()));
            attach(MethodKind::GetList, GeneratedMethod::GetList(factory.get_list()));
        }
        if features.update {
            attach(MethodKind::Update, GeneratedMethod::Update(factory.update()));
        }
        if features.delete {
            attach(MethodKind::Delete, GeneratedMethod::Delete(factory.delete()));
        }
        if features.update_field {
            attach(MethodKind::UpdateField, GeneratedMethod::UpdateField(factory.update_field()));
        }

        for field in &features.integer_fields {
            attach(
                MethodKind::Increment(field.clone()),
                GeneratedMethod::Integer(factory.update_integer_field(field, 1)?),
            );
            attach(
                MethodKind::Decrement(field.clone()),
                GeneratedMethod::Integer(factory.update_integer_field(field, -1)?),
            );
        }

        for field in &features.array_fields {
            attach(
                MethodKind::Append(field.clone()),
                GeneratedMethod::List(factory.update_list_field(field, ListCommand::Push)?),
            );
            attach(
                MethodKind::Remove(field.clone()),
                GeneratedMethod::List(factory.update_list_field(field, ListCommand::Pull)?),
            );
            attach(MethodKind::Pop(field.clone()), GeneratedMethod::Pop(factory.pop_list_field(field)?));
        }

        for adapted in signatures.values() {
            tracing::warn!(dto = %dto, method = adapted.name(), "signature declared for a method that is not enabled");
        }

        Ok(Wired {
            collection,
            descriptor: Arc::clone(factory.descriptor()),
            table,
            index,
        })
    }
}

impl<D> std::fmt::Debug for MethodTable<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodTable")
            .field("access", &self.access)
            .field("names", &self.names.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bson::{Bson, doc};
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{dto::FieldKind, signature::TypeAnnotation};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        visits: i64,
        #[serde(default)]
        tags: Vec<String>,
    }

    impl Dto for User {
        fn descriptor() -> DtoDescriptor {
            DtoDescriptor::builder("User")
                .identifier("id")
                .field("name", FieldKind::String)
                .field("visits", FieldKind::Integer)
                .field("tags", FieldKind::Array)
                .build()
        }
    }

    fn builder() -> RepositoryBuilder<User, ()> {
        RepositoryBuilder::new().collection(())
    }

    fn names(wired: &Wired<User, ()>) -> Vec<&str> {
        wired.table.names().collect()
    }

    #[test]
    fn missing_collection_is_a_configuration_error() {
        let result = RepositoryBuilder::<User, ()>::new().wire();

        assert!(matches!(result, Err(RepositoryError::Configuration(_))));
    }

    #[test]
    fn default_features_attach_every_crud_method() {
        let wired = builder().wire().unwrap();

        assert_eq!(
            names(&wired),
            vec!["add", "create", "delete", "get", "get_all", "get_list", "update", "update_field"]
        );
    }

    #[test]
    fn specialized_fields_get_their_methods() {
        let wired = builder()
            .features(Features::none().integer_field("visits").array_field("tags"))
            .wire()
            .unwrap();

        assert_eq!(
            names(&wired),
            vec!["decrement_visits", "increment_visits", "tags__append", "tags__pop", "tags__remove"]
        );
        assert_eq!(wired.table.decrement("visits").unwrap().step(), -1);
        assert!(matches!(
            wired.table.increment("name"),
            Err(RepositoryError::MethodNotEnabled(name)) if name == "increment_name"
        ));
    }

    #[test]
    fn undeclared_specialized_field_fails_wiring() {
        let result = builder()
            .features(Features::default().array_field("labels"))
            .wire();

        assert!(matches!(
            result,
            Err(RepositoryError::FieldNotFound { field, .. }) if field == "labels"
        ));
    }

    #[test]
    fn access_level_mangles_names() {
        let wired = builder()
            .method_access(Access::Private)
            .features(Features {
                update: false,
                update_field: false,
                get_all: false,
                ..Features::default()
            })
            .wire()
            .unwrap();

        assert_eq!(names(&wired), vec!["__add", "__create", "__delete", "__get"]);
        assert!(matches!(
            wired.table.update(),
            Err(RepositoryError::MethodNotEnabled(name)) if name == "__update"
        ));
    }

    #[test]
    fn substituted_signature_adds_its_name() {
        let wired = builder()
            .features(Features::none().integer_field("visits"))
            .method_access(Access::Protected)
            .substitute(
                MethodSignature::new("increment_visits")
                    .keyword("weight")
                    .var_keyword("filters")
                    .returns(TypeAnnotation::Unit),
            )
            .wire()
            .unwrap();

        assert!(wired.table.contains("_increment_visits"));
        assert!(wired.table.contains("increment_visits"));
        assert_eq!(
            wired
                .table
                .signature("increment_visits")
                .map(|adapted| adapted.return_type()),
            Some("()")
        );
    }

    #[test]
    fn invalid_signatures_fail_wiring() {
        let missing = builder()
            .substitute(MethodSignature::new("get"))
            .wire();
        assert!(matches!(missing, Err(RepositoryError::MissingAnnotation(_))));

        let invalid = builder()
            .substitute(MethodSignature::new("find_by_name").returns(TypeAnnotation::Dto))
            .wire();
        assert!(matches!(invalid, Err(RepositoryError::InvalidMethodName(_))));
    }

    #[test]
    fn signature_for_disabled_method_is_skipped() {
        let wired = builder()
            .features(Features::none())
            .substitute(MethodSignature::new("get").returns(TypeAnnotation::Dto))
            .wire()
            .unwrap();

        assert!(names(&wired).is_empty());
    }

    #[test]
    fn prepare_call_distinguishes_unknown_and_disabled_names() {
        let wired = builder()
            .features(Features::none())
            .wire()
            .unwrap();

        assert!(matches!(
            wired.table.prepare_call("get", CallArgs::new()),
            Err(RepositoryError::MethodNotEnabled(_))
        ));
        assert!(matches!(
            wired.table.prepare_call("fetch", CallArgs::new()),
            Err(RepositoryError::InvalidMethodName(_))
        ));
    }

    #[test]
    fn prepare_call_routes_keywords_into_filters() {
        let wired = builder().wire().unwrap();

        let prepared = wired
            .table
            .prepare_call("update_field", CallArgs::new().arg("visits").arg(3).kwarg("name", "ann"))
            .unwrap();

        let PreparedCall::Single { command, .. } = prepared else {
            panic!("expected a single command");
        };
        assert_eq!(
            command,
            Command::FindOneAndUpdate {
                filter: doc! { "name": "ann" },
                update: doc! { "$set": { "visits": 3 } },
                returning: crate::backend::ReturnDocument::After,
            }
        );

        let prepared = wired
            .table
            .prepare_call("get_all", CallArgs::new().kwarg("visits", Bson::Int32(1)))
            .unwrap();
        let PreparedCall::All { filter, .. } = prepared else {
            panic!("expected a streaming call");
        };
        assert_eq!(filter.as_document(), &doc! { "visits": 1 });
    }

    #[test]
    fn options_load_from_json() {
        let options: RepositoryOptions = serde_json::from_str(
            r#"{
                "index": {"field": "name", "unique": true},
                "method_access": "protected",
                "delete": false,
                "integer_fields": ["visits"]
            }"#,
        )
        .unwrap();

        assert_eq!(options.index, Some(IndexSpec::new("name").unique(true)));
        assert_eq!(options.method_access, Access::Protected);
        assert!(!options.features.delete);
        assert!(options.features.add);
        assert_eq!(options.features.integer_fields, vec!["visits".to_string()]);
    }
}
