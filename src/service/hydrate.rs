//! Wire payload -> row values ready for the SQL builder.

use super::crud::{CrudService, RowMap};
use super::validation::{RequestValidator, ValidationMode};
use crate::auth::password::{hash_password, is_password_hash};
use crate::config::{Api, PkType, RelationKind, ResolvedResource, API_PREFIX};
use crate::error::AppError;
use serde_json::{Map, Value};
use sqlx::PgPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Replace,
    Patch,
}

impl WriteMode {
    fn validation(&self) -> ValidationMode {
        match self {
            WriteMode::Create | WriteMode::Replace => ValidationMode::Full,
            WriteMode::Patch => ValidationMode::Partial,
        }
    }
}

/// Parse a path or body id for a table's primary key type.
pub fn parse_id(raw: &str, pk_type: &PkType) -> Result<Value, AppError> {
    let raw = raw.trim();
    Ok(match pk_type {
        PkType::Uuid => {
            let u = uuid::Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("invalid uuid '{}'", raw)))?;
            Value::String(u.to_string())
        }
        PkType::BigInt | PkType::Int => {
            let n: i64 = raw
                .parse()
                .map_err(|_| AppError::BadRequest(format!("invalid id '{}'", raw)))?;
            Value::Number(n.into())
        }
        PkType::Text => Value::String(raw.to_string()),
    })
}

/// Resolve a to-one value (URI, bare id, or object with `id`/`resource_uri`) to the target's primary key.
pub fn parse_reference(value: &Value, target: &ResolvedResource) -> Result<Value, AppError> {
    match value {
        Value::Number(n) => parse_id(&n.to_string(), &target.table.pk_type),
        Value::String(s) if s.starts_with('/') => {
            let prefix = target.list_uri();
            let id = s
                .strip_prefix(&prefix)
                .map(|rest| rest.trim_end_matches('/'))
                .filter(|rest| !rest.is_empty() && !rest.contains('/'))
                .ok_or_else(|| {
                    AppError::BadRequest(format!("'{}' is not a URI of {}{}/", s, API_PREFIX, target.resource_name))
                })?;
            parse_id(id, &target.table.pk_type)
        }
        Value::String(s) => parse_id(s, &target.table.pk_type),
        Value::Object(obj) => match obj.get(&target.table.pk).or_else(|| obj.get("resource_uri")) {
            Some(inner) if !inner.is_object() => parse_reference(inner, target),
            _ => Err(AppError::BadRequest(format!(
                "related {} object needs '{}' or 'resource_uri'",
                target.resource_name, target.table.pk
            ))),
        },
        other => Err(AppError::BadRequest(format!(
            "cannot use {} as a reference to {}",
            other, target.resource_name
        ))),
    }
}

/// Map the payload onto writable columns without touching the database.
pub fn map_payload(api: &Api, resource: &ResolvedResource, data: &Map<String, Value>) -> Result<RowMap, AppError> {
    let mut row = Map::new();
    for (key, value) in data {
        if let Some(rel) = resource.related_field(key) {
            if rel.kind == RelationKind::ToMany {
                continue;
            }
            let target = api
                .resource(&rel.resource)
                .ok_or_else(|| AppError::Internal(format!("unknown related resource {}", rel.resource)))?;
            let fk = if value.is_null() {
                if !rel.null {
                    return Err(AppError::BadRequest(format!("'{}' may not be null", key)));
                }
                Value::Null
            } else {
                parse_reference(value, target)?
            };
            row.insert(rel.attribute.clone(), fk);
            continue;
        }
        let writable = key != &resource.table.pk
            && resource.table.column(key).is_some()
            && !resource.readonly.contains(key)
            && (!resource.sensitive.contains(key) || resource.password_columns.contains(key));
        if writable && !row.contains_key(key) {
            row.insert(key.clone(), value.clone());
        }
    }
    Ok(row)
}

/// Full hydrate: map, resolve lookups, validate, hash passwords.
pub async fn hydrate(
    pool: &PgPool,
    api: &Api,
    resource: &ResolvedResource,
    data: &Map<String, Value>,
    mode: WriteMode,
) -> Result<RowMap, AppError> {
    let mut row = map_payload(api, resource, data)?;

    for lookup in &resource.hydrate_lookups {
        let raw = match data.get(&lookup.key) {
            Some(v) if !v.is_null() => v,
            _ => {
                if lookup.required && mode == WriteMode::Create {
                    return Err(AppError::BadRequest(format!("'{}' is required", lookup.key)));
                }
                continue;
            }
        };
        let target = api
            .resource(&lookup.resource)
            .ok_or_else(|| AppError::Internal(format!("unknown lookup resource {}", lookup.resource)))?;
        let id = parse_reference(raw, target)?;
        let found = CrudService::read(pool, &target.table, &id).await?;
        let Some(found) = found else {
            return Err(AppError::BadRequest(format!(
                "{} {} does not exist",
                target.resource_name, id
            )));
        };
        let pk = found.get(&target.table.pk).cloned().unwrap_or(id);
        row.insert(lookup.column.clone(), pk);
    }

    RequestValidator::validate(&row, &resource.validation, mode.validation())?;

    for col in &resource.password_columns {
        if let Some(Value::String(plain)) = row.get(col) {
            if !is_password_hash(plain) {
                let hashed = hash_password(plain)?;
                row.insert(col.clone(), Value::String(hashed));
            }
        }
    }
    Ok(row)
}
