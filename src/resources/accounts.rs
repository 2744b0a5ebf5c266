//! Users, API keys and profiles.

use super::{created_on, max_length, modified, required, resource, table};
use crate::config::{
    AuthorizationConfig, ColumnConfig, FilterConfig, FullConfig, IndexColumnEntry, IndexConfig, Lookup, Method,
    RelatedFieldConfig, ValidationRule,
};
use std::collections::{BTreeMap, HashMap};

pub const USER: &str = "account/user";
pub const PROFILE: &str = "account/profile";

pub fn config() -> FullConfig {
    let user = table(
        "account_user",
        vec![
            ColumnConfig::new("username", "VARCHAR(150)").not_null().unique(),
            ColumnConfig::new("first_name", "VARCHAR(30)").not_null().default_literal(""),
            ColumnConfig::new("last_name", "VARCHAR(30)").not_null().default_literal(""),
            ColumnConfig::new("email", "VARCHAR(254)").not_null().default_literal(""),
            ColumnConfig::new("password", "VARCHAR(128)"),
            ColumnConfig::new("is_staff", "BOOLEAN").not_null().default_expr("FALSE"),
            ColumnConfig::new("is_superuser", "BOOLEAN").not_null().default_expr("FALSE"),
            ColumnConfig::new("is_active", "BOOLEAN").not_null().default_expr("TRUE"),
            ColumnConfig::new("date_joined", "TIMESTAMPTZ").not_null().default_expr("NOW()"),
            ColumnConfig::new("last_login", "TIMESTAMPTZ"),
        ],
    );

    let mut apikey = table(
        "account_apikey",
        vec![
            ColumnConfig::new("user_id", "BIGINT")
                .not_null()
                .unique()
                .references("account_user", "CASCADE"),
            ColumnConfig::new("key", "VARCHAR(128)").not_null(),
            created_on(),
        ],
    );
    apikey.indexes.push(IndexConfig {
        name: "account_apikey_key_idx".into(),
        method: None,
        unique: false,
        columns: vec![IndexColumnEntry::Name("key".into())],
    });

    let mut profile = table(
        "account_profile",
        vec![
            ColumnConfig::new("user_id", "BIGINT")
                .not_null()
                .unique()
                .references("account_user", "CASCADE"),
            ColumnConfig::new("bio", "TEXT"),
            ColumnConfig::new("location", "VARCHAR(100)"),
            ColumnConfig::new("website", "VARCHAR(200)"),
            ColumnConfig::new("picture_url", "VARCHAR(200)"),
            created_on(),
            modified(),
        ],
    );
    profile.auto_now = Some("modified".into());

    let mut users = resource(USER, "account_user", &[Method::Get, Method::Post, Method::Patch]);
    users.excludes = vec!["is_superuser".into()];
    users.password_columns = vec!["password".into()];
    users.readonly = vec!["is_staff".into(), "is_active".into(), "date_joined".into(), "last_login".into()];
    users.always_return_data = true;
    users.authorization = AuthorizationConfig::AdminOrOwner {
        owner_column: Some("id".into()),
    };
    users.filtering = BTreeMap::from([
        ("username".to_string(), FilterConfig::Lookups(vec![Lookup::Exact, Lookup::Iexact, Lookup::Istartswith])),
        ("id".to_string(), FilterConfig::All),
        ("is_active".to_string(), FilterConfig::exact()),
    ]);
    users.ordering = vec!["username".into(), "date_joined".into(), "id".into()];
    users.validation = HashMap::from([
        (
            "username".to_string(),
            ValidationRule {
                required: Some(true),
                max_length: Some(150),
                pattern: Some(r"^[\w.@+-]+$".into()),
                ..Default::default()
            },
        ),
        (
            "email".to_string(),
            ValidationRule {
                format: Some("email".into()),
                max_length: Some(254),
                ..Default::default()
            },
        ),
        (
            "password".to_string(),
            ValidationRule {
                min_length: Some(8),
                ..Default::default()
            },
        ),
        ("first_name".to_string(), max_length(30)),
        ("last_name".to_string(), max_length(30)),
    ]);

    let mut profiles = resource(PROFILE, "account_profile", &[Method::Get, Method::Post, Method::Patch]);
    profiles.related = vec![RelatedFieldConfig::to_one("user", USER, "user_id").full()];
    profiles.always_return_data = true;
    profiles.authorization = AuthorizationConfig::AdminOrOwner {
        owner_column: Some("user_id".into()),
    };
    profiles.filtering = BTreeMap::from([("user".to_string(), FilterConfig::AllWithRelations)]);
    profiles.ordering = vec!["created_on".into(), "modified".into()];
    profiles.validation = HashMap::from([
        ("user_id".to_string(), required()),
        (
            "website".to_string(),
            ValidationRule {
                format: Some("url".into()),
                max_length: Some(200),
                ..Default::default()
            },
        ),
        ("location".to_string(), max_length(100)),
    ]);

    FullConfig {
        tables: vec![user, apikey, profile],
        resources: vec![users, profiles],
        search_indexes: vec![],
    }
}
