use std::collections::HashMap;

use docrepo::prelude::*;

#[derive(Debug, Clone, Serialize, Deserialize, Dto)]
#[serde(rename_all = "camelCase")]
struct Profile {
    #[dto(id)]
    #[serde(default)]
    profile_id: String,
    display_name: String,
    #[serde(rename = "years")]
    age: Option<u32>,
    score: f64,
    active: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    labels: Vec<String>,
    settings: HashMap<String, String>,
    #[dto(kind = "integer")]
    legacy_counter: serde_json::Value,
    #[serde(skip)]
    cache: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Dto)]
#[dto(name = "Account")]
struct AccountRecord {
    owner: String,
}

#[test]
fn derive_follows_serde_names() {
    let descriptor = Profile::descriptor();

    assert_eq!(descriptor.name(), "Profile");
    assert_eq!(descriptor.id_field(), Some("profileId"));

    let fields: Vec<(&str, FieldKind)> = descriptor
        .fields()
        .iter()
        .map(|field| (field.name.as_str(), field.kind))
        .collect();
    assert_eq!(
        fields,
        vec![
            ("profileId", FieldKind::Identifier),
            ("displayName", FieldKind::String),
            ("years", FieldKind::Integer),
            ("score", FieldKind::Float),
            ("active", FieldKind::Boolean),
            ("labels", FieldKind::Array),
            ("settings", FieldKind::Document),
            ("legacyCounter", FieldKind::Integer),
        ]
    );
    assert!(descriptor.validate().is_ok());
}

#[test]
fn derive_accepts_a_container_name() {
    let descriptor = AccountRecord::descriptor();

    assert_eq!(descriptor.name(), "Account");
    assert_eq!(descriptor.id_field(), None);
    assert!(descriptor.field("owner").is_some());
}

#[test]
fn skipped_fields_stay_out_of_the_document() {
    let profile = Profile {
        profile_id: String::new(),
        display_name: "ann".into(),
        age: None,
        score: 1.5,
        active: true,
        labels: Vec::new(),
        settings: HashMap::new(),
        legacy_counter: serde_json::json!(3),
        cache: Some("warm".into()),
    };
    assert_eq!(profile.cache.as_deref(), Some("warm"));

    let value = serde_json::to_value(&profile).unwrap();
    assert!(value.get("cache").is_none());
    assert!(value.get("labels").is_none());
    assert!(Profile::descriptor().field("cache").is_none());

    let decoded: Profile = serde_json::from_value(value).unwrap();
    assert_eq!(decoded.display_name, "ann");
    assert_eq!(decoded.cache, None);
}
