//! Rows -> API bundles, with related fields batch-loaded per page.

use super::crud::{CrudService, RowMap};
use crate::config::{Api, RelationKind, RelatedFieldConfig, ResolvedResource};
use crate::error::AppError;
use serde_json::{Map, Value};
use sqlx::PgPool;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// Full relations nest at most this deep; below it they render as URIs.
pub const MAX_NESTING: usize = 3;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Key for grouping rows by a JSON id.
fn id_key(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn distinct_ids<'r>(rows: impl Iterator<Item = &'r RowMap>, column: &str) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for row in rows {
        if let Some(v) = row.get(column) {
            if let Some(k) = id_key(v) {
                if seen.insert(k) {
                    out.push(v.clone());
                }
            }
        }
    }
    out
}

/// Exposed columns and `resource_uri`; no related fields.
pub fn base_bundle(resource: &ResolvedResource, row: &RowMap, for_list: bool) -> Map<String, Value> {
    let mut bundle = Map::new();
    for col in &resource.exposed {
        if for_list && resource.detail_only.contains(col) {
            continue;
        }
        bundle.insert(col.clone(), row.get(col).cloned().unwrap_or(Value::Null));
    }
    let pk = row.get(&resource.table.pk).cloned().unwrap_or(Value::Null);
    bundle.insert("resource_uri".into(), Value::String(resource.detail_uri(&pk)));
    bundle
}

/// Dehydrate a page of rows of `resource`.
pub fn dehydrate_rows<'a>(
    pool: &'a PgPool,
    api: &'a Api,
    resource: &'a ResolvedResource,
    rows: &'a [RowMap],
    for_list: bool,
    depth: usize,
) -> BoxFuture<'a, Result<Vec<Value>, AppError>> {
    Box::pin(async move {
        let mut bundles: Vec<Map<String, Value>> =
            rows.iter().map(|r| base_bundle(resource, r, for_list)).collect();
        for rel in resource.related.iter().filter(|r| r.use_in.includes(for_list)) {
            let target = api
                .resource(&rel.resource)
                .ok_or_else(|| AppError::Internal(format!("unknown related resource {}", rel.resource)))?;
            let nest = rel.full && depth < MAX_NESTING;
            let values = match rel.kind {
                RelationKind::ToOne => to_one(pool, api, rel, target, rows, for_list, depth, nest).await?,
                RelationKind::ToMany => to_many(pool, api, resource, rel, target, rows, for_list, depth, nest).await?,
            };
            for (bundle, v) in bundles.iter_mut().zip(values) {
                bundle.insert(rel.name.clone(), v);
            }
        }
        Ok(bundles.into_iter().map(Value::Object).collect())
    })
}

#[allow(clippy::too_many_arguments)]
async fn to_one(
    pool: &PgPool,
    api: &Api,
    rel: &RelatedFieldConfig,
    target: &ResolvedResource,
    rows: &[RowMap],
    for_list: bool,
    depth: usize,
    nest: bool,
) -> Result<Vec<Value>, AppError> {
    if !nest {
        return Ok(rows
            .iter()
            .map(|r| match r.get(&rel.attribute) {
                Some(v) if !v.is_null() => Value::String(target.detail_uri(v)),
                _ => Value::Null,
            })
            .collect());
    }
    let ids = distinct_ids(rows.iter(), &rel.attribute);
    let related = CrudService::fetch_where_column_in(pool, &target.table, &target.table.pk, &ids).await?;
    let nested = dehydrate_rows(pool, api, target, &related, for_list, depth + 1).await?;
    let by_id: HashMap<String, Value> = related
        .iter()
        .zip(nested)
        .filter_map(|(row, bundle)| row.get(&target.table.pk).and_then(id_key).map(|k| (k, bundle)))
        .collect();
    Ok(rows
        .iter()
        .map(|r| {
            r.get(&rel.attribute)
                .and_then(id_key)
                .and_then(|k| by_id.get(&k).cloned())
                .unwrap_or(Value::Null)
        })
        .collect())
}

#[allow(clippy::too_many_arguments)]
async fn to_many(
    pool: &PgPool,
    api: &Api,
    resource: &ResolvedResource,
    rel: &RelatedFieldConfig,
    target: &ResolvedResource,
    rows: &[RowMap],
    for_list: bool,
    depth: usize,
    nest: bool,
) -> Result<Vec<Value>, AppError> {
    let ids = distinct_ids(rows.iter(), &resource.table.pk);
    let related = CrudService::fetch_where_column_in(pool, &target.table, &rel.attribute, &ids).await?;
    let rendered: Vec<Value> = if nest {
        dehydrate_rows(pool, api, target, &related, for_list, depth + 1).await?
    } else {
        related
            .iter()
            .map(|r| {
                let pk = r.get(&target.table.pk).cloned().unwrap_or(Value::Null);
                Value::String(target.detail_uri(&pk))
            })
            .collect()
    };
    let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
    for (row, v) in related.iter().zip(rendered) {
        if let Some(k) = row.get(&rel.attribute).and_then(id_key) {
            grouped.entry(k).or_default().push(v);
        }
    }
    Ok(rows
        .iter()
        .map(|r| {
            let items = r
                .get(&resource.table.pk)
                .and_then(id_key)
                .and_then(|k| grouped.remove(&k))
                .unwrap_or_default();
            Value::Array(items)
        })
        .collect())
}

/// Dehydrate a single row.
pub async fn dehydrate_one(
    pool: &PgPool,
    api: &Api,
    resource: &ResolvedResource,
    row: RowMap,
    for_list: bool,
) -> Result<Value, AppError> {
    let rows = [row];
    let mut out = dehydrate_rows(pool, api, resource, &rows, for_list, 0).await?;
    out.pop()
        .ok_or_else(|| AppError::Internal("dehydrate produced no bundle".into()))
}
