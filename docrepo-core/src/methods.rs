//! The method factory: one plan per generated operation.
//!
//! Every plan is built once from a DTO descriptor (and a field name for the
//! specialized methods) and is reused for every call. A plan implements
//! [`Operation`]: it turns call arguments into a backend [`Command`] and decodes
//! the backend's [`Reply`] into the call result. The async and blocking
//! repositories share the plans and only differ in how the command is run
//! ([`execute`] vs [`execute_blocking`]).
//!
//! # Example
//!
//! ```ignore
//! use docrepo::methods::{MethodFactory, execute};
//! use docrepo::filter::Filter;
//!
//! let factory = MethodFactory::<User>::new()?;
//! let get = factory.get();
//!
//! let user = execute(&get, &collection, Filter::new().eq("name", "ann")).await?;
//! ```

use bson::{Bson, Document, oid::ObjectId};
use futures::{StreamExt, stream::BoxStream};
use std::{marker::PhantomData, sync::Arc};

use crate::{
    backend::{BlockingCollectionBackend, CollectionBackend, Command, FindOptions, Reply, ReturnDocument},
    codec::{from_raw_value, normalize_filter, to_document, to_dto, to_raw_document},
    dto::{Dto, DtoDescriptor},
    error::RepositoryResult,
    filter::{Filter, UpdateOp, partial_update},
};

/// Offset used by `get_list` when none is given.
pub const DEFAULT_OFFSET: u64 = 0;
/// Page size used by `get_list` when none is given.
pub const DEFAULT_LIMIT: u64 = 20;

/// A lazy stream of decoded DTOs.
pub type DtoStream<D> = BoxStream<'static, RepositoryResult<D>>;

/// A lazy iterator of decoded DTOs.
pub type DtoIter<D> = Box<dyn Iterator<Item = RepositoryResult<D>> + Send>;

/// A generated operation, split into the command it issues and the decoding of the reply.
pub trait Operation {
    type Args;
    /// State carried from [`Operation::prepare`] to [`Operation::complete`].
    type Context;
    type Output;

    /// Builds the backend command for one call.
    fn prepare(&self, args: Self::Args) -> RepositoryResult<(Command, Self::Context)>;

    /// Decodes the backend reply into the call result.
    fn complete(&self, context: Self::Context, reply: Reply) -> RepositoryResult<Self::Output>;
}

/// Runs `operation` against an async collection.
///
/// # Errors
///
/// Returns argument and conversion errors from the plan, and passes backend errors through.
pub async fn execute<O, C>(operation: &O, collection: &C, args: O::Args) -> RepositoryResult<O::Output>
where
    O: Operation + ?Sized,
    C: CollectionBackend + ?Sized,
{
    let (command, context) = operation.prepare(args)?;
    tracing::trace!(collection = collection.name(), ?command, "executing command");

    let reply = collection.execute(command).await?;
    operation.complete(context, reply)
}

/// Runs `operation` against a blocking collection.
pub fn execute_blocking<O, C>(operation: &O, collection: &C, args: O::Args) -> RepositoryResult<O::Output>
where
    O: Operation + ?Sized,
    C: BlockingCollectionBackend + ?Sized,
{
    let (command, context) = operation.prepare(args)?;
    tracing::trace!(collection = collection.name(), ?command, "executing command");

    let reply = collection.execute(command)?;
    operation.complete(context, reply)
}

fn decode_optional<D: Dto>(descriptor: &DtoDescriptor, reply: Reply) -> RepositoryResult<Option<D>> {
    reply
        .into_document()?
        .map(|document| to_dto(document, descriptor))
        .transpose()
}

macro_rules! dto_plan {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name<D> {
            descriptor: Arc<DtoDescriptor>,
            _dto: PhantomData<fn() -> D>,
        }

        impl<D> $name<D> {
            pub(crate) fn new(descriptor: Arc<DtoDescriptor>) -> Self {
                Self { descriptor, _dto: PhantomData }
            }
        }
    };
}

dto_plan!(
    /// `add(dto) -> dto`: inserts one document.
    ///
    /// When the DTO declares an identifier field, a fresh ObjectId is generated before
    /// insertion and its hex form is written into both the inserted document and the
    /// returned DTO.
    Add
);

impl<D: Dto> Operation for Add<D> {
    type Args = D;
    type Context = D;
    type Output = D;

    fn prepare(&self, dto: D) -> RepositoryResult<(Command, D)> {
        let dto = match self.descriptor.id_field() {
            Some(field) => with_identifier(&dto, field, ObjectId::new())?,
            None => dto,
        };

        let document = to_document(&dto, &self.descriptor)?;
        Ok((Command::InsertOne(document), dto))
    }

    fn complete(&self, dto: D, reply: Reply) -> RepositoryResult<D> {
        reply.into_inserted()?;
        Ok(dto)
    }
}

fn with_identifier<D: Dto>(dto: &D, field: &str, id: ObjectId) -> RepositoryResult<D> {
    let mut document = to_raw_document(dto)?;
    document.insert(field, id.to_hex());
    from_raw_value(Bson::Document(document))
}

dto_plan!(
    /// `get(filter) -> Option<dto>`: the first matching document.
    Get
);

impl<D: Dto> Operation for Get<D> {
    type Args = Filter;
    type Context = ();
    type Output = Option<D>;

    fn prepare(&self, filter: Filter) -> RepositoryResult<(Command, ())> {
        Ok((Command::FindOne(normalize_filter(filter)?), ()))
    }

    fn complete(&self, _: (), reply: Reply) -> RepositoryResult<Option<D>> {
        decode_optional(&self.descriptor, reply)
    }
}

/// Paging arguments of `get_list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListArgs {
    pub offset: u64,
    pub limit: u64,
}

impl Default for ListArgs {
    fn default() -> Self {
        Self {
            offset: DEFAULT_OFFSET,
            limit: DEFAULT_LIMIT,
        }
    }
}

dto_plan!(
    /// `get_list(offset, limit) -> Vec<dto>`: unfiltered listing in store order.
    GetList
);

impl<D: Dto> Operation for GetList<D> {
    type Args = ListArgs;
    type Context = ();
    type Output = Vec<D>;

    fn prepare(&self, args: ListArgs) -> RepositoryResult<(Command, ())> {
        Ok((Command::Find(Document::new(), FindOptions::page(args.offset, args.limit)), ()))
    }

    fn complete(&self, _: (), reply: Reply) -> RepositoryResult<Vec<D>> {
        reply
            .into_documents()?
            .into_iter()
            .map(|document| to_dto(document, &self.descriptor))
            .collect()
    }
}

dto_plan!(
    /// `get_all(filter) -> lazy sequence of dto`.
    ///
    /// Not an [`Operation`]: the result is a single-pass stream (or iterator) that decodes
    /// each document as it is pulled, so a malformed document fails at its position.
    GetAll
);

impl<D: Dto> GetAll<D> {
    /// Opens a lazy stream over the documents matching `filter`.
    pub async fn stream<C>(&self, collection: &C, filter: Filter) -> RepositoryResult<DtoStream<D>>
    where
        C: CollectionBackend + ?Sized,
    {
        let filter = normalize_filter(filter)?;
        tracing::trace!(collection = collection.name(), ?filter, "streaming documents");

        let descriptor = Arc::clone(&self.descriptor);
        let documents = collection
            .find(filter, FindOptions::default())
            .await?;

        Ok(documents
            .map(move |document| document.and_then(|document| to_dto(document, &descriptor)))
            .boxed())
    }

    /// Opens a lazy iterator over the documents matching `filter`.
    pub fn iter<C>(&self, collection: &C, filter: Filter) -> RepositoryResult<DtoIter<D>>
    where
        C: BlockingCollectionBackend + ?Sized,
    {
        let filter = normalize_filter(filter)?;
        tracing::trace!(collection = collection.name(), ?filter, "iterating documents");

        let descriptor = Arc::clone(&self.descriptor);
        let documents = collection.find(filter, FindOptions::default())?;

        Ok(Box::new(documents.map(move |document| {
            document.and_then(|document| to_dto(document, &descriptor))
        })))
    }
}

dto_plan!(
    /// `update(dto, filter) -> Option<dto>`: partial update of the first match.
    ///
    /// Zero numbers and `false` are written; empty strings, empty collections and nulls
    /// leave the stored values alone. Returns the updated document.
    Update
);

impl<D: Dto> Operation for Update<D> {
    type Args = (D, Filter);
    type Context = ();
    type Output = Option<D>;

    fn prepare(&self, (dto, filter): (D, Filter)) -> RepositoryResult<(Command, ())> {
        let filter = normalize_filter(filter)?;
        let set = partial_update(&dto, &self.descriptor)?;

        // Nothing significant to write; the store rejects an empty $set.
        if set.is_empty() {
            return Ok((Command::FindOne(filter), ()));
        }

        let command = Command::FindOneAndUpdate {
            filter,
            update: UpdateOp::Set(set).to_document(),
            returning: ReturnDocument::After,
        };
        Ok((command, ()))
    }

    fn complete(&self, _: (), reply: Reply) -> RepositoryResult<Option<D>> {
        decode_optional(&self.descriptor, reply)
    }
}

/// `delete(filter) -> bool`: removes the first match.
#[derive(Debug, Clone, Default)]
pub struct Delete;

impl Operation for Delete {
    type Args = Filter;
    type Context = ();
    type Output = bool;

    fn prepare(&self, filter: Filter) -> RepositoryResult<(Command, ())> {
        Ok((Command::FindOneAndDelete(normalize_filter(filter)?), ()))
    }

    fn complete(&self, _: (), reply: Reply) -> RepositoryResult<bool> {
        Ok(reply.into_document()?.is_some())
    }
}

dto_plan!(
    /// `update_field(name, value, filter) -> Option<dto>`: sets one declared field.
    UpdateField
);

impl<D: Dto> Operation for UpdateField<D> {
    type Args = (String, Bson, Filter);
    type Context = ();
    type Output = Option<D>;

    fn prepare(&self, (field, value, filter): (String, Bson, Filter)) -> RepositoryResult<(Command, ())> {
        self.descriptor.require_field(&field)?;

        let mut set = Document::new();
        set.insert(field, value);

        let command = Command::FindOneAndUpdate {
            filter: normalize_filter(filter)?,
            update: UpdateOp::Set(set).to_document(),
            returning: ReturnDocument::After,
        };
        Ok((command, ()))
    }

    fn complete(&self, _: (), reply: Reply) -> RepositoryResult<Option<D>> {
        decode_optional(&self.descriptor, reply)
    }
}

/// `increment_{field}` / `decrement_{field}`: atomic `$inc` on the first match.
///
/// The call-time weight overrides the fixed step.
#[derive(Debug, Clone)]
pub struct IntegerField {
    field: String,
    step: i64,
}

impl IntegerField {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn step(&self) -> i64 {
        self.step
    }
}

impl Operation for IntegerField {
    type Args = (Option<i64>, Filter);
    type Context = ();
    type Output = ();

    fn prepare(&self, (weight, filter): (Option<i64>, Filter)) -> RepositoryResult<(Command, ())> {
        let update = UpdateOp::Inc {
            field: self.field.clone(),
            by: weight.unwrap_or(self.step),
        };

        let command = Command::UpdateOne {
            filter: normalize_filter(filter)?,
            update: update.to_document(),
        };
        Ok((command, ()))
    }

    fn complete(&self, _: (), reply: Reply) -> RepositoryResult<()> {
        reply.into_updated()?;
        Ok(())
    }
}

/// Array mutation performed by a [`ListField`] plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListCommand {
    Push,
    Pull,
}

/// `{field}__append` / `{field}__remove`: `$push` or `$pull` on the first match.
#[derive(Debug, Clone)]
pub struct ListField {
    field: String,
    command: ListCommand,
}

impl ListField {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn command(&self) -> ListCommand {
        self.command
    }
}

impl Operation for ListField {
    type Args = (Bson, Filter);
    type Context = ();
    type Output = ();

    fn prepare(&self, (value, filter): (Bson, Filter)) -> RepositoryResult<(Command, ())> {
        let field = self.field.clone();
        let update = match self.command {
            ListCommand::Push => UpdateOp::Push { field, value },
            ListCommand::Pull => UpdateOp::Pull { field, value },
        };

        let command = Command::UpdateOne {
            filter: normalize_filter(filter)?,
            update: update.to_document(),
        };
        Ok((command, ()))
    }

    fn complete(&self, _: (), reply: Reply) -> RepositoryResult<()> {
        reply.into_updated()?;
        Ok(())
    }
}

/// `{field}__pop`: removes and returns the last element of an array field.
///
/// Returns `None` when nothing matched, and also when the matched document's
/// array was empty or missing.
#[derive(Debug, Clone)]
pub struct PopList {
    field: String,
}

impl PopList {
    pub fn field(&self) -> &str {
        &self.field
    }
}

impl Operation for PopList {
    type Args = Filter;
    type Context = ();
    type Output = Option<Bson>;

    fn prepare(&self, filter: Filter) -> RepositoryResult<(Command, ())> {
        let command = Command::FindOneAndUpdate {
            filter: normalize_filter(filter)?,
            update: UpdateOp::PopLast { field: self.field.clone() }.to_document(),
            returning: ReturnDocument::Before,
        };
        Ok((command, ()))
    }

    fn complete(&self, _: (), reply: Reply) -> RepositoryResult<Option<Bson>> {
        let Some(original) = reply.into_document()? else {
            return Ok(None);
        };

        Ok(match original.get(&self.field) {
            Some(Bson::Array(items)) => items.last().cloned(),
            _ => None,
        })
    }
}

/// Builds operation plans for one DTO type.
pub struct MethodFactory<D> {
    descriptor: Arc<DtoDescriptor>,
    _dto: PhantomData<fn() -> D>,
}

impl<D: Dto> MethodFactory<D> {
    /// Creates a factory from the DTO's own descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RepositoryError::InvalidDescriptor`] if the descriptor is malformed.
    pub fn new() -> RepositoryResult<Self> {
        let descriptor = D::descriptor();
        descriptor.validate()?;

        Ok(Self::with_descriptor(Arc::new(descriptor)))
    }

    pub fn with_descriptor(descriptor: Arc<DtoDescriptor>) -> Self {
        Self {
            descriptor,
            _dto: PhantomData,
        }
    }

    pub fn descriptor(&self) -> &Arc<DtoDescriptor> {
        &self.descriptor
    }

    pub fn add(&self) -> Add<D> {
        Add::new(Arc::clone(&self.descriptor))
    }

    pub fn get(&self) -> Get<D> {
        Get::new(Arc::clone(&self.descriptor))
    }

    pub fn get_list(&self) -> GetList<D> {
        GetList::new(Arc::clone(&self.descriptor))
    }

    pub fn get_all(&self) -> GetAll<D> {
        GetAll::new(Arc::clone(&self.descriptor))
    }

    pub fn update(&self) -> Update<D> {
        Update::new(Arc::clone(&self.descriptor))
    }

    pub fn delete(&self) -> Delete {
        Delete
    }

    pub fn update_field(&self) -> UpdateField<D> {
        UpdateField::new(Arc::clone(&self.descriptor))
    }

    /// Builds an increment (positive `step`) or decrement (negative `step`) plan.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RepositoryError::FieldNotFound`] if `field` is not declared.
    pub fn update_integer_field(&self, field: &str, step: i64) -> RepositoryResult<IntegerField> {
        self.descriptor.require_field(field)?;

        Ok(IntegerField {
            field: field.to_string(),
            step,
        })
    }

    /// Builds an append or remove plan.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RepositoryError::FieldNotFound`] if `field` is not declared.
    pub fn update_list_field(&self, field: &str, command: ListCommand) -> RepositoryResult<ListField> {
        self.descriptor.require_field(field)?;

        Ok(ListField {
            field: field.to_string(),
            command,
        })
    }

    /// Builds a pop plan.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RepositoryError::FieldNotFound`] if `field` is not declared.
    pub fn pop_list_field(&self, field: &str) -> RepositoryResult<PopList> {
        self.descriptor.require_field(field)?;

        Ok(PopList {
            field: field.to_string(),
        })
    }
}
