use std::sync::Arc;

use bson::{Bson, doc};
use docrepo::{
    backend::CollectionBackend,
    memory::{InMemoryCollection, InMemoryStore},
    prelude::*,
};
use futures::{StreamExt, TryStreamExt};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Dto)]
struct Simple {
    x: String,
    y: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Dto)]
struct User {
    #[dto(id)]
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    visits: i64,
    #[serde(default)]
    tags: Vec<String>,
}

fn user(name: &str) -> User {
    User {
        id: String::new(),
        name: name.to_string(),
        visits: 0,
        tags: Vec::new(),
    }
}

async fn users(store: &InMemoryStore, features: Features) -> Repository<User, InMemoryCollection> {
    Repository::builder()
        .collection(store.collection("users"))
        .features(features)
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn dto_without_identifier_round_trips() {
    let store = InMemoryStore::new();
    let repo = Repository::<Simple, _>::builder()
        .collection(store.collection("simple"))
        .build()
        .await
        .unwrap();

    let added = repo
        .add(Simple { x: "hey".into(), y: 42 })
        .await
        .unwrap();
    assert_eq!(added, Simple { x: "hey".into(), y: 42 });

    let found = repo
        .get(Filter::new().eq("x", "hey"))
        .await
        .unwrap();
    assert_eq!(found, Some(Simple { x: "hey".into(), y: 42 }));
}

#[tokio::test]
async fn add_get_update_delete_scenario() {
    let store = InMemoryStore::new();
    let repo = Repository::<Simple, _>::builder()
        .collection(store.collection("simple"))
        .build()
        .await
        .unwrap();

    repo.add(Simple { x: "hey".into(), y: 42 })
        .await
        .unwrap();
    assert_eq!(
        repo.get(Filter::new().eq("y", 42)).await.unwrap(),
        Some(Simple { x: "hey".into(), y: 42 })
    );

    // the update overwrites the field it was matched on
    let updated = repo
        .update(Simple { x: "hey all!".into(), y: 13 }, Filter::new().eq("y", 42))
        .await
        .unwrap();
    assert_eq!(updated, Some(Simple { x: "hey all!".into(), y: 13 }));

    assert_eq!(
        repo.get(Filter::new().eq("y", 13)).await.unwrap(),
        Some(Simple { x: "hey all!".into(), y: 13 })
    );
    assert_eq!(repo.get(Filter::new().eq("y", 42)).await.unwrap(), None);

    assert!(repo.delete(Filter::new().eq("y", 13)).await.unwrap());
    assert_eq!(repo.get(Filter::new().eq("y", 13)).await.unwrap(), None);
}

#[tokio::test]
async fn add_assigns_identifier_usable_in_filters() {
    let store = InMemoryStore::new();
    let repo = users(&store, Features::default()).await;

    let ann = repo.add(user("ann")).await.unwrap();
    assert_eq!(ann.id.len(), 24);

    let by_id = repo
        .get(Filter::by_id(&ann.id).unwrap())
        .await
        .unwrap();
    assert_eq!(by_id, Some(ann.clone()));

    // the stored document keys the native identifier
    let raw = repo
        .collection()
        .find_one(doc! { "name": "ann" })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raw.get_object_id("_id").unwrap().to_hex(), ann.id);

    let missing = repo
        .get(Filter::new().eq("name", "bob"))
        .await
        .unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
async fn malformed_identifier_is_a_conversion_error() {
    assert!(matches!(
        Filter::by_id("not-an-id"),
        Err(RepositoryError::Conversion(_))
    ));

    let store = InMemoryStore::new();
    let repo = users(&store, Features::default()).await;

    assert!(matches!(
        repo.get(Filter::new().eq("_id", "xyz")).await,
        Err(RepositoryError::Conversion(_))
    ));
}

#[tokio::test]
async fn update_only_writes_meaningful_fields() {
    let store = InMemoryStore::new();
    let repo = users(&store, Features::default()).await;

    let mut ann = user("ann");
    ann.tags = vec!["admin".into()];
    let ann = repo.add(ann).await.unwrap();

    // empty name and tags are skipped; the zero visit count is written
    let patch = User {
        id: String::new(),
        name: String::new(),
        visits: 0,
        tags: Vec::new(),
    };
    repo.collection()
        .update_one(
            Filter::by_id(&ann.id).unwrap().into_document(),
            doc! { "$inc": { "visits": 1 } },
        )
        .await
        .unwrap();

    let updated = repo
        .update(patch, Filter::by_id(&ann.id).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.name, "ann");
    assert_eq!(updated.tags, vec!["admin".to_string()]);
    assert_eq!(updated.visits, 0);

    let renamed = repo
        .update_field("name", "anna".into(), Filter::by_id(&ann.id).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renamed.name, "anna");

    let nobody = repo
        .update(user("bob"), Filter::new().eq("name", "nobody"))
        .await
        .unwrap();
    assert_eq!(nobody, None);
}

#[tokio::test]
async fn update_writes_a_present_identifier_field() {
    let store = InMemoryStore::new();
    let repo = users(&store, Features::default()).await;
    let ann = repo.add(user("ann")).await.unwrap();

    let replacement = bson::oid::ObjectId::new().to_hex();
    let patch = User {
        id: replacement.clone(),
        name: String::new(),
        visits: 3,
        tags: Vec::new(),
    };
    repo.update(patch, Filter::new().eq("name", "ann"))
        .await
        .unwrap()
        .unwrap();

    let raw = repo
        .collection()
        .find_one(doc! { "name": "ann" })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raw.get_str("id").unwrap(), replacement);
    assert_eq!(raw.get_object_id("_id").unwrap().to_hex(), ann.id);
    assert_eq!(raw.get_i64("visits").unwrap(), 3);

    let malformed = User {
        id: "xyz".into(),
        ..user("")
    };
    assert!(matches!(
        repo.update(malformed, Filter::new().eq("name", "ann")).await,
        Err(RepositoryError::Conversion(_))
    ));
}

#[tokio::test]
async fn update_field_rejects_unknown_fields() {
    let store = InMemoryStore::new();
    let repo = users(&store, Features::default()).await;

    let result = repo
        .update_field("age", 3.into(), Filter::all())
        .await;

    assert!(matches!(
        result,
        Err(RepositoryError::FieldNotFound { dto, field }) if dto == "User" && field == "age"
    ));
}

#[tokio::test]
async fn delete_reports_whether_a_document_was_removed() {
    let store = InMemoryStore::new();
    let repo = users(&store, Features::default()).await;
    let ann = repo.add(user("ann")).await.unwrap();

    let filter = Filter::by_id(&ann.id).unwrap();
    assert!(repo.delete(filter.clone()).await.unwrap());
    assert!(!repo.delete(filter.clone()).await.unwrap());
    assert_eq!(repo.get(filter).await.unwrap(), None);
}

#[tokio::test]
async fn array_field_mutators() {
    let store = InMemoryStore::new();
    let repo = users(&store, Features::default().array_field("tags")).await;
    let ann = repo.add(user("ann")).await.unwrap();
    let filter = Filter::by_id(&ann.id).unwrap();

    repo.append("tags", "a".into(), filter.clone())
        .await
        .unwrap();
    repo.append("tags", "b".into(), filter.clone())
        .await
        .unwrap();
    repo.append("tags", "c".into(), filter.clone())
        .await
        .unwrap();
    repo.remove("tags", "a".into(), filter.clone())
        .await
        .unwrap();

    assert_eq!(
        repo.pop("tags", filter.clone()).await.unwrap(),
        Some(Bson::String("c".into()))
    );
    assert_eq!(
        repo.pop("tags", filter.clone()).await.unwrap(),
        Some(Bson::String("b".into()))
    );
    assert_eq!(repo.pop("tags", filter.clone()).await.unwrap(), None);
    assert_eq!(
        repo.pop("tags", Filter::new().eq("name", "nobody"))
            .await
            .unwrap(),
        None
    );

    assert!(matches!(
        repo.append("name", "x".into(), filter).await,
        Err(RepositoryError::MethodNotEnabled(name)) if name == "name__append"
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_are_not_lost() {
    let store = InMemoryStore::new();
    let repo = Arc::new(users(&store, Features::default().integer_field("visits")).await);
    let ann = repo.add(user("ann")).await.unwrap();

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let repo = Arc::clone(&repo);
            let id = ann.id.clone();
            tokio::spawn(async move {
                repo.increment("visits", None, Filter::by_id(&id).unwrap())
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let filter = Filter::by_id(&ann.id).unwrap();
    repo.decrement("visits", None, filter.clone())
        .await
        .unwrap();
    repo.increment("visits", Some(10), filter.clone())
        .await
        .unwrap();

    let ann = repo.get(filter).await.unwrap().unwrap();
    assert_eq!(ann.visits, 59);
}

#[tokio::test]
async fn get_all_streams_and_get_list_pages() {
    let store = InMemoryStore::new();
    let repo = users(&store, Features::default()).await;
    for name in ["a", "b", "c", "d", "e"] {
        let mut dto = user(name);
        dto.visits = if name < "c" { 1 } else { 2 };
        repo.add(dto).await.unwrap();
    }

    let twos: Vec<User> = repo
        .get_all(Filter::new().eq("visits", 2))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let names: Vec<&str> = twos
        .iter()
        .map(|dto| dto.name.as_str())
        .collect();
    assert_eq!(names, vec!["c", "d", "e"]);

    let page = repo.get_list(1, 2).await.unwrap();
    let names: Vec<&str> = page
        .iter()
        .map(|dto| dto.name.as_str())
        .collect();
    assert_eq!(names, vec!["b", "c"]);

    assert!(repo.get_list(10, 20).await.unwrap().is_empty());
}

#[tokio::test]
async fn get_all_fails_at_the_undecodable_document() {
    let store = InMemoryStore::new();
    let repo = Repository::<Simple, _>::builder()
        .collection(store.collection("simple"))
        .build()
        .await
        .unwrap();

    repo.add(Simple { x: "a".into(), y: 1 })
        .await
        .unwrap();
    repo.collection()
        .insert_one(doc! { "x": "missing y" })
        .await
        .unwrap();
    repo.add(Simple { x: "c".into(), y: 3 })
        .await
        .unwrap();

    let mut all = repo.get_all(Filter::all()).await.unwrap();

    assert_eq!(all.next().await.unwrap().unwrap(), Simple { x: "a".into(), y: 1 });
    assert!(matches!(all.next().await, Some(Err(RepositoryError::Conversion(_)))));
    assert_eq!(all.next().await.unwrap().unwrap(), Simple { x: "c".into(), y: 3 });
    assert!(all.next().await.is_none());
}

#[tokio::test]
async fn unique_index_rejects_duplicate_adds() {
    let store = InMemoryStore::new();
    let repo = Repository::<User, _>::builder()
        .collection(store.collection("users"))
        .index(IndexSpec::new("name").unique(true))
        .build()
        .await
        .unwrap();

    repo.add(user("ann")).await.unwrap();
    assert!(matches!(
        repo.add(user("ann")).await,
        Err(RepositoryError::DuplicateKey { collection, .. }) if collection == "users"
    ));

    // building again over the same collection reuses the index
    let again = Repository::<User, _>::builder()
        .collection(store.collection("users"))
        .index(IndexSpec::new("name").unique(true))
        .build()
        .await;
    assert!(again.is_ok());
}

#[tokio::test]
async fn disabled_methods_are_absent() {
    let store = InMemoryStore::new();
    let repo = users(
        &store,
        Features {
            delete: false,
            ..Features::default()
        },
    )
    .await;

    assert!(!repo.has_method("delete"));
    assert!(matches!(
        repo.delete(Filter::all()).await,
        Err(RepositoryError::MethodNotEnabled(_))
    ));
}

#[tokio::test]
async fn invoke_dispatches_by_mangled_name() {
    let store = InMemoryStore::new();
    let repo = Repository::<User, _>::builder()
        .collection(store.collection("users"))
        .method_access(Access::Protected)
        .features(Features::default().integer_field("visits"))
        .build()
        .await
        .unwrap();

    assert!(repo.has_method("_create"));
    assert!(!repo.has_method("add"));

    let added = repo
        .invoke("_create", CallArgs::new().serialized_arg(&user("ann")).unwrap())
        .await
        .unwrap()
        .into_dto()
        .unwrap();

    repo.invoke(
        "_increment_visits",
        CallArgs::new().kwarg("weight", 5).kwarg("name", "ann"),
    )
    .await
    .unwrap();

    let found = repo
        .invoke("_get", CallArgs::new().kwarg("_id", added.id.as_str()))
        .await
        .unwrap()
        .into_dto()
        .unwrap();
    assert_eq!(found.visits, 5);

    let all = repo
        .invoke("_get_all", CallArgs::new())
        .await
        .unwrap()
        .into_dtos()
        .unwrap();
    assert_eq!(all.len(), 1);

    assert!(matches!(
        repo.invoke("get", CallArgs::new()).await,
        Err(RepositoryError::MethodNotEnabled(_))
    ));
    assert!(matches!(
        repo.invoke("_get_list", CallArgs::new().kwarg("name", "ann"))
            .await,
        Err(RepositoryError::UnexpectedArgument { .. })
    ));
}

#[tokio::test]
async fn substituted_signature_maps_positional_arguments() {
    let store = InMemoryStore::new();
    let repo = Repository::<User, _>::builder()
        .collection(store.collection("users"))
        .substitute(
            MethodSignature::new("update_field")
                .param("field_name")
                .param("value")
                .var_keyword("filters")
                .returns(TypeAnnotation::optional(TypeAnnotation::Dto)),
        )
        .build()
        .await
        .unwrap();
    repo.add(user("ann")).await.unwrap();

    let signature = repo.signature("update_field").unwrap();
    assert_eq!(signature.return_type(), "Option<User>");

    let updated = repo
        .invoke(
            "update_field",
            CallArgs::new()
                .arg("visits")
                .arg(7_i64)
                .kwarg("name", "ann"),
        )
        .await
        .unwrap()
        .into_dto()
        .unwrap();
    assert_eq!(updated.visits, 7);
}

#[tokio::test]
async fn substituted_signature_binds_renamed_parameters_by_position() {
    let store = InMemoryStore::new();
    let repo = Repository::<Simple, _>::builder()
        .collection(store.collection("simple"))
        .substitute(
            MethodSignature::new("update")
                .param("item")
                .var_keyword("filters")
                .returns(TypeAnnotation::optional(TypeAnnotation::Dto)),
        )
        .build()
        .await
        .unwrap();
    repo.add(Simple { x: "hey".into(), y: 42 })
        .await
        .unwrap();

    let updated = repo
        .invoke(
            "update",
            CallArgs::new()
                .serialized_arg(&Simple { x: "hey all!".into(), y: 13 })
                .unwrap()
                .kwarg("y", 42),
        )
        .await
        .unwrap()
        .into_dto();
    assert_eq!(updated, Some(Simple { x: "hey all!".into(), y: 13 }));
}

#[tokio::test]
async fn repositories_are_usable_through_capability_traits() {
    async fn add_then_count<R: CrudRepository<User>>(repo: &R) -> usize {
        repo.add(user("ann")).await.unwrap();
        repo.get_list(0, 20).await.unwrap().len()
    }

    let store = InMemoryStore::new();
    let repo = users(&store, Features::default()).await;

    assert_eq!(add_then_count(&repo).await, 1);
}
