//! Build the runtime `Api` registry from declarations.

use crate::config::resolved::{Api, ColumnInfo, PkType, ResolvedResource, ResolvedTable};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

/// Validate then resolve every resource declaration.
pub fn resolve(config: &FullConfig) -> Result<Api, ConfigError> {
    validate(config)?;

    let tables_by_name: HashMap<&str, &TableConfig> =
        config.tables.iter().map(|t| (t.name.as_str(), t)).collect();
    let indexes_by_model: HashMap<&str, &SearchIndexConfig> = config
        .search_indexes
        .iter()
        .map(|i| (i.model.as_str(), i))
        .collect();

    let mut resources = Vec::with_capacity(config.resources.len());
    for r in &config.resources {
        let table = tables_by_name
            .get(r.table.as_str())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "table",
                id: r.table.clone(),
            })?;
        let table = resolve_table(table)?;

        let mut sensitive: HashSet<String> = r.excludes.iter().cloned().collect();
        sensitive.extend(r.password_columns.iter().cloned());

        // FK columns behind a related field are exposed through that field, not as raw ids.
        let related_attrs: HashSet<&str> = r
            .related
            .iter()
            .filter(|rel| rel.kind == RelationKind::ToOne)
            .map(|rel| rel.attribute.as_str())
            .collect();
        let exposed: Vec<String> = if r.fields.is_empty() {
            table.columns.iter().map(|c| c.name.clone()).collect()
        } else {
            r.fields.clone()
        }
        .into_iter()
        .filter(|c| !sensitive.contains(c) && !related_attrs.contains(c.as_str()))
        .collect();

        resources.push(ResolvedResource {
            resource_name: r.resource_name.clone(),
            table,
            allowed_methods: r.allowed_methods.clone(),
            exposed,
            detail_only: r.detail_only.iter().cloned().collect(),
            sensitive,
            related: r.related.clone(),
            filtering: r.filtering.clone(),
            ordering: r.ordering.clone(),
            always_return_data: r.always_return_data,
            authentication: r.authentication.clone(),
            authorization: r.authorization.clone(),
            hydrate_lookups: r.hydrate_lookups.clone(),
            password_columns: r.password_columns.iter().cloned().collect(),
            readonly: r.readonly.iter().cloned().collect(),
            validation: r.validation.clone(),
            search_index: indexes_by_model.get(r.resource_name.as_str()).map(|i| (*i).clone()),
        });
    }

    Ok(Api::new(resources))
}

fn resolve_table(table: &TableConfig) -> Result<ResolvedTable, ConfigError> {
    let pk_col = table
        .columns
        .iter()
        .find(|c| c.name == table.primary_key)
        .ok_or_else(|| ConfigError::InvalidPrimaryKey {
            table: table.name.clone(),
            column: table.primary_key.clone(),
        })?;
    let pk_type = infer_pk_type(pk_col);
    let columns = table
        .columns
        .iter()
        .map(|c| {
            let is_pk = c.name == table.primary_key;
            ColumnInfo {
                name: c.name.clone(),
                pk_type: if is_pk { Some(pk_type.clone()) } else { None },
                nullable: c.nullable,
                has_default: c.default.is_some() || is_serial(&c.type_),
                pg_type: cast_type_name(&c.type_),
            }
        })
        .collect();
    Ok(ResolvedTable {
        name: table.name.clone(),
        pk: table.primary_key.clone(),
        pk_type,
        columns,
        history: table.history,
        auto_now: table.auto_now.clone(),
    })
}

fn is_serial(ty: &str) -> bool {
    ty.to_lowercase().contains("serial")
}

/// Type every bound parameter for a column is cast to, so text and numbers bind uniformly.
pub(crate) fn cast_type_name(ty: &str) -> String {
    let lower = ty.to_lowercase();
    let cast = match lower.as_str() {
        "bigserial" | "bigint" | "int8" => "bigint",
        "serial" | "integer" | "int" | "int4" => "integer",
        "smallint" | "int2" | "smallserial" => "smallint",
        "boolean" | "bool" => "boolean",
        "double precision" | "float8" | "real" | "float4" => "double precision",
        "numeric" | "decimal" => "numeric",
        "timestamptz" | "timestamp with time zone" => "timestamptz",
        "date" => "date",
        "uuid" => "uuid",
        "jsonb" => "jsonb",
        "json" => "json",
        l if l.starts_with("timestamp") => "timestamp",
        _ => "text",
    };
    cast.to_string()
}

fn infer_pk_type(col: &ColumnConfig) -> PkType {
    let type_lower = col.type_.to_lowercase();
    if type_lower.contains("uuid") {
        PkType::Uuid
    } else if type_lower.contains("bigserial") || type_lower.contains("bigint") {
        PkType::BigInt
    } else if type_lower.contains("serial") || type_lower.contains("int") {
        PkType::Int
    } else {
        PkType::Text
    }
}
