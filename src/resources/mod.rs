//! Concrete resource declarations.

pub mod accounts;
pub mod projects;
pub mod projectsheet;
pub mod scout;

use crate::config::{
    resolve, Api, AuthBackend, AuthorizationConfig, ColumnConfig, FullConfig, Method, ResourceConfig,
    TableConfig, ValidationRule,
};
use crate::error::ConfigError;
use std::collections::BTreeMap;

/// Every table, resource and search index served by this crate.
pub fn config() -> FullConfig {
    accounts::config()
        .merge(projects::config())
        .merge(projectsheet::config())
        .merge(scout::config())
}

pub fn api() -> Result<Api, ConfigError> {
    resolve(&config())
}

/// Table with a `BIGSERIAL id` primary key followed by `columns`.
pub(crate) fn table(name: &str, columns: Vec<ColumnConfig>) -> TableConfig {
    let mut all = vec![ColumnConfig::new("id", "BIGSERIAL").not_null()];
    all.extend(columns);
    TableConfig {
        name: name.into(),
        primary_key: "id".into(),
        columns: all,
        unique: vec![],
        indexes: vec![],
        history: false,
        auto_now: None,
    }
}

pub(crate) fn created_on() -> ColumnConfig {
    ColumnConfig::new("created_on", "TIMESTAMPTZ").not_null().default_expr("NOW()")
}

pub(crate) fn modified() -> ColumnConfig {
    ColumnConfig::new("modified", "TIMESTAMPTZ").not_null().default_expr("NOW()")
}

/// Resource with basic + anonymous api key authentication and admin-or-owner authorization.
pub(crate) fn resource(name: &str, table: &str, methods: &[Method]) -> ResourceConfig {
    ResourceConfig {
        resource_name: name.into(),
        table: table.into(),
        allowed_methods: methods.to_vec(),
        fields: vec![],
        excludes: vec![],
        related: vec![],
        detail_only: vec![],
        filtering: BTreeMap::new(),
        ordering: vec![],
        always_return_data: false,
        authentication: vec![AuthBackend::Basic, AuthBackend::AnonymousApiKey],
        authorization: AuthorizationConfig::AdminOrOwner { owner_column: None },
        hydrate_lookups: vec![],
        password_columns: vec![],
        readonly: vec![],
        validation: Default::default(),
    }
}

pub(crate) fn required() -> ValidationRule {
    ValidationRule {
        required: Some(true),
        ..Default::default()
    }
}

pub(crate) fn max_length(n: u32) -> ValidationRule {
    ValidationRule {
        max_length: Some(n),
        ..Default::default()
    }
}

pub(crate) fn between(min: f64, max: f64) -> ValidationRule {
    ValidationRule {
        minimum: Some(min),
        maximum: Some(max),
        ..Default::default()
    }
}
