//! Resource endpoints: list/create, detail/replace/patch/delete, set, schema and history.
//!
//! Every handler is mounted with `any()` so that methods outside the resource's allowed list
//! answer our own 405 with an `Allow` header.

use crate::auth::{authenticate, authorize, Requester};
use crate::config::{
    AuthorizationConfig, FilterConfig, Method, PkType, RelationKind, ResolvedResource, API_PREFIX,
};
use crate::error::AppError;
use crate::extractors::Credentials;
use crate::paginator::{Meta, Page};
use crate::response;
use crate::service::{
    dehydrate_one, dehydrate_rows, hydrate, list_history, parse_filters, parse_id, parse_ordering,
    CrudService, RowMap, WriteMode,
};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::Method as HttpMethod,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Resource served by a route, attached as a request extension.
#[derive(Clone, Debug)]
pub struct ResourceName(pub Arc<str>);

const LIST_METHODS: [Method; 2] = [Method::Get, Method::Post];
const DETAIL_METHODS: [Method; 4] = [Method::Get, Method::Put, Method::Patch, Method::Delete];
const READ_METHODS: [Method; 1] = [Method::Get];

/// Separator between ids in `set/` URIs.
const SET_SEPARATOR: char = ';';

pub(crate) fn lookup<'a>(state: &'a AppState, name: &ResourceName) -> Result<&'a ResolvedResource, AppError> {
    state
        .api
        .resource(&name.0)
        .ok_or_else(|| AppError::NotFound(format!("resource {}", name.0)))
}

/// Methods both the endpoint and the resource allow, in declaration order.
fn permitted(resource: &ResolvedResource, endpoint: &[Method]) -> Vec<Method> {
    resource
        .allowed_methods
        .iter()
        .copied()
        .filter(|m| endpoint.contains(m))
        .collect()
}

pub(crate) fn check_method(
    resource: &ResolvedResource,
    endpoint: &[Method],
    method: &HttpMethod,
) -> Result<Method, AppError> {
    let permitted = permitted(resource, endpoint);
    match Method::from_http(method) {
        Some(m) if permitted.contains(&m) => Ok(m),
        _ => Err(AppError::MethodNotAllowed {
            method: method.to_string(),
            allowed: permitted.iter().map(Method::as_str).collect(),
        }),
    }
}

/// Authenticate, then authorize a request that does not touch an existing row.
pub(crate) async fn admit(
    state: &AppState,
    resource: &ResolvedResource,
    method: Method,
    credentials: &Credentials,
) -> Result<Requester, AppError> {
    let requester = authenticate(&state.pool, &resource.authentication, method, credentials).await?;
    authorize(&resource.authorization, &requester, method, None)?;
    Ok(requester)
}

pub(crate) fn log_access(requester: &Requester, resource: &ResolvedResource, method: Method, detail: &str) {
    tracing::info!(
        user = requester.label(),
        resource = %resource.resource_name,
        method = method.as_str(),
        detail,
        "access"
    );
}

fn parse_body(body: &Bytes) -> Result<Map<String, Value>, AppError> {
    if body.is_empty() {
        return Err(AppError::BadRequest("request body is empty".into()));
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::BadRequest("body must be a JSON object".into())),
        Err(e) => Err(AppError::BadRequest(format!("invalid JSON body: {}", e))),
    }
}

/// Owner column of the resource's policy, unless it is the primary key.
fn owner_column(resource: &ResolvedResource) -> Option<&str> {
    match &resource.authorization {
        AuthorizationConfig::AdminOrOwner { owner_column: Some(c) } if *c != resource.table.pk => Some(c),
        _ => None,
    }
}

/// Fill the owner column with the requester's id when the payload leaves it out.
fn assign_owner(resource: &ResolvedResource, requester: &Requester, data: &mut Map<String, Value>) {
    let (Some(column), Some(user_id)) = (owner_column(resource), requester.user_id()) else {
        return;
    };
    let via_relation = resource
        .related
        .iter()
        .any(|r| r.kind == RelationKind::ToOne && r.attribute == column && data.contains_key(&r.name));
    if !via_relation && !data.contains_key(column) {
        data.insert(column.to_string(), Value::from(user_id));
    }
}

/// Non-admins may only write rows they own.
fn check_ownership(resource: &ResolvedResource, requester: &Requester, row: &RowMap) -> Result<(), AppError> {
    match owner_column(resource) {
        Some(column) if !requester.is_admin() && row.contains_key(column) && !requester.owns(row.get(column)) => {
            Err(AppError::Forbidden(format!("{} must be the requesting user", column)))
        }
        _ => Ok(()),
    }
}

fn index_id(resource: &ResolvedResource, row: &RowMap) -> Option<i64> {
    row.get(&resource.table.pk).and_then(Value::as_i64)
}

/// Keep the search index in step with a committed write. Failures are logged; the write stands.
async fn reindex(state: &AppState, resource: &ResolvedResource, row: &RowMap, removed: bool) {
    let (Some(def), Some(id)) = (resource.search_index.as_ref(), index_id(resource, row)) else {
        return;
    };
    let result = if removed {
        state.search.remove_object(def, id).await
    } else {
        state.search.update_object(&state.pool, def, id).await
    };
    if let Err(e) = result {
        tracing::warn!(resource = %resource.resource_name, id, error = %e, "search index update failed");
    }
}

/// `/{name}/`: GET list, POST create.
pub async fn collection(
    State(state): State<AppState>,
    Extension(name): Extension<ResourceName>,
    method: HttpMethod,
    credentials: Credentials,
    Query(params): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let resource = lookup(&state, &name)?;
    match check_method(resource, &LIST_METHODS, &method)? {
        Method::Post => create(&state, resource, &credentials, &body).await,
        _ => list(&state, resource, &credentials, &params).await,
    }
}

async fn list(
    state: &AppState,
    resource: &ResolvedResource,
    credentials: &Credentials,
    params: &[(String, String)],
) -> Result<Response, AppError> {
    let requester = admit(state, resource, Method::Get, credentials).await?;
    let filters = parse_filters(resource, params)?;
    let order = parse_ordering(resource, params)?;
    let page = Page::from_params(params, &state.settings)?;
    let (rows, total) = CrudService::list(&state.pool, &resource.table, &filters, &order, page).await?;
    let objects = dehydrate_rows(&state.pool, &state.api, resource, &rows, true, 0).await?;
    let meta = Meta::new(&resource.list_uri(), params, page, total);
    log_access(&requester, resource, Method::Get, "list");
    Ok(response::list(meta, objects).into_response())
}

async fn create(
    state: &AppState,
    resource: &ResolvedResource,
    credentials: &Credentials,
    body: &Bytes,
) -> Result<Response, AppError> {
    let requester = admit(state, resource, Method::Post, credentials).await?;
    let mut data = parse_body(body)?;
    assign_owner(resource, &requester, &mut data);
    let row = hydrate(&state.pool, &state.api, resource, &data, WriteMode::Create).await?;
    check_ownership(resource, &requester, &row)?;
    let created = CrudService::create(&state.pool, &resource.table, &row, requester.user_id()).await?;
    reindex(state, resource, &created, false).await;
    let pk = created.get(&resource.table.pk).cloned().unwrap_or(Value::Null);
    let location = resource.detail_uri(&pk);
    log_access(&requester, resource, Method::Post, &location);
    let bundle = if resource.always_return_data {
        Some(dehydrate_one(&state.pool, &state.api, resource, created, false).await?)
    } else {
        None
    };
    Ok(response::created(&location, bundle))
}

/// `/{name}/{id}/`: GET, PUT, PATCH, DELETE.
pub async fn detail(
    State(state): State<AppState>,
    Extension(name): Extension<ResourceName>,
    Path(id): Path<String>,
    method: HttpMethod,
    credentials: Credentials,
    body: Bytes,
) -> Result<Response, AppError> {
    let resource = lookup(&state, &name)?;
    let method = check_method(resource, &DETAIL_METHODS, &method)?;
    let id = parse_id(&id, &resource.table.pk_type)?;
    match method {
        Method::Get => read(&state, resource, &credentials, &id).await,
        Method::Put => write(&state, resource, &credentials, &id, &body, WriteMode::Replace).await,
        Method::Patch => write(&state, resource, &credentials, &id, &body, WriteMode::Patch).await,
        Method::Delete => remove(&state, resource, &credentials, &id).await,
        Method::Post => Err(AppError::Internal("POST routed to detail".into())),
    }
}

async fn load(state: &AppState, resource: &ResolvedResource, id: &Value) -> Result<RowMap, AppError> {
    CrudService::read(&state.pool, &resource.table, id)
        .await?
        .ok_or_else(|| AppError::NotFound(resource.detail_uri(id)))
}

async fn read(
    state: &AppState,
    resource: &ResolvedResource,
    credentials: &Credentials,
    id: &Value,
) -> Result<Response, AppError> {
    let requester = admit(state, resource, Method::Get, credentials).await?;
    let row = load(state, resource, id).await?;
    let bundle = dehydrate_one(&state.pool, &state.api, resource, row, false).await?;
    log_access(&requester, resource, Method::Get, &resource.detail_uri(id));
    Ok(response::detail(bundle).into_response())
}

async fn write(
    state: &AppState,
    resource: &ResolvedResource,
    credentials: &Credentials,
    id: &Value,
    body: &Bytes,
    mode: WriteMode,
) -> Result<Response, AppError> {
    let method = if mode == WriteMode::Patch { Method::Patch } else { Method::Put };
    let requester = authenticate(&state.pool, &resource.authentication, method, credentials).await?;
    let existing = load(state, resource, id).await?;
    authorize(&resource.authorization, &requester, method, Some(&existing))?;
    let data = parse_body(body)?;
    let row = hydrate(&state.pool, &state.api, resource, &data, mode).await?;
    check_ownership(resource, &requester, &row)?;
    let updated = CrudService::update(&state.pool, &resource.table, id, &row, requester.user_id())
        .await?
        .ok_or_else(|| AppError::NotFound(resource.detail_uri(id)))?;
    reindex(state, resource, &updated, false).await;
    log_access(&requester, resource, method, &resource.detail_uri(id));
    let bundle = if resource.always_return_data {
        Some(dehydrate_one(&state.pool, &state.api, resource, updated, false).await?)
    } else {
        None
    };
    Ok(response::updated(bundle))
}

async fn remove(
    state: &AppState,
    resource: &ResolvedResource,
    credentials: &Credentials,
    id: &Value,
) -> Result<Response, AppError> {
    let requester = authenticate(&state.pool, &resource.authentication, Method::Delete, credentials).await?;
    let existing = load(state, resource, id).await?;
    authorize(&resource.authorization, &requester, Method::Delete, Some(&existing))?;
    let deleted = CrudService::delete(&state.pool, &resource.table, id, requester.user_id())
        .await?
        .ok_or_else(|| AppError::NotFound(resource.detail_uri(id)))?;
    reindex(state, resource, &deleted, true).await;
    log_access(&requester, resource, Method::Delete, &resource.detail_uri(id));
    Ok(response::deleted())
}

/// `/{name}/set/{ids}/`: several objects by `;`-separated ids, in request order.
pub async fn set(
    State(state): State<AppState>,
    Extension(name): Extension<ResourceName>,
    Path(ids): Path<String>,
    method: HttpMethod,
    credentials: Credentials,
) -> Result<Response, AppError> {
    let resource = lookup(&state, &name)?;
    check_method(resource, &READ_METHODS, &method)?;
    let requester = admit(&state, resource, Method::Get, &credentials).await?;
    let raw: Vec<&str> = ids.split(SET_SEPARATOR).map(str::trim).filter(|s| !s.is_empty()).collect();
    let parsed = raw
        .iter()
        .map(|s| parse_id(s, &resource.table.pk_type))
        .collect::<Result<Vec<_>, _>>()?;
    let rows = CrudService::fetch_where_column_in(&state.pool, &resource.table, &resource.table.pk, &parsed).await?;
    let pk = &resource.table.pk;
    let mut ordered = Vec::with_capacity(rows.len());
    let mut not_found = Vec::new();
    for (raw_id, id) in raw.iter().zip(&parsed) {
        match rows.iter().find(|r| r.get(pk) == Some(id)) {
            Some(row) => ordered.push(row.clone()),
            None => not_found.push(Value::String(raw_id.to_string())),
        }
    }
    let objects = dehydrate_rows(&state.pool, &state.api, resource, &ordered, true, 0).await?;
    log_access(&requester, resource, Method::Get, "set");
    let mut body = json!({ "objects": objects });
    if !not_found.is_empty() {
        body["not_found"] = Value::Array(not_found);
    }
    Ok(Json(body).into_response())
}

/// `/{name}/{id}/history/`: snapshots newest first.
pub async fn history(
    State(state): State<AppState>,
    Extension(name): Extension<ResourceName>,
    Path(id): Path<String>,
    method: HttpMethod,
    credentials: Credentials,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let resource = lookup(&state, &name)?;
    check_method(resource, &READ_METHODS, &method)?;
    let id = parse_id(&id, &resource.table.pk_type)?;
    let requester = admit(&state, resource, Method::Get, &credentials).await?;
    let page = Page::from_params(&params, &state.settings)?;
    let (objects, total) = list_history(&state.pool, resource, &id, page).await?;
    let base = format!("{}history/", resource.detail_uri(&id));
    let meta = Meta::new(&base, &params, page, total);
    log_access(&requester, resource, Method::Get, &base);
    Ok(response::list(meta, objects).into_response())
}

/// `/{name}/schema/`: fields, filtering, ordering and allowed methods.
pub async fn schema(
    State(state): State<AppState>,
    Extension(name): Extension<ResourceName>,
    method: HttpMethod,
    credentials: Credentials,
) -> Result<Response, AppError> {
    let resource = lookup(&state, &name)?;
    check_method(resource, &READ_METHODS, &method)?;
    let requester = admit(&state, resource, Method::Get, &credentials).await?;
    log_access(&requester, resource, Method::Get, "schema");
    Ok(Json(describe(resource, state.settings.limit_per_page)).into_response())
}

fn field_type(pg_type: &str) -> &'static str {
    match pg_type {
        "bigint" | "integer" | "smallint" => "integer",
        "boolean" => "boolean",
        "double precision" => "float",
        "numeric" => "decimal",
        "timestamptz" | "timestamp" => "datetime",
        "date" => "date",
        "jsonb" | "json" => "json",
        _ => "string",
    }
}

fn filter_schema(filter: &FilterConfig) -> Value {
    match filter {
        FilterConfig::All => json!(1),
        FilterConfig::AllWithRelations => json!(2),
        FilterConfig::Lookups(lookups) => Value::Array(lookups.iter().map(|l| json!(l.as_str())).collect()),
    }
}

pub fn describe(resource: &ResolvedResource, default_limit: u32) -> Value {
    let mut fields = Map::new();
    for name in &resource.exposed {
        let Some(col) = resource.table.column(name) else { continue };
        fields.insert(
            name.clone(),
            json!({
                "type": field_type(&col.pg_type),
                "nullable": col.nullable,
                "blank": col.has_default,
                "readonly": *name == resource.table.pk || resource.readonly.contains(name),
                "detail_only": resource.detail_only.contains(name),
            }),
        );
    }
    for rel in &resource.related {
        fields.insert(
            rel.name.clone(),
            json!({
                "type": "related",
                "related_type": match rel.kind {
                    RelationKind::ToOne => "to_one",
                    RelationKind::ToMany => "to_many",
                },
                "related_schema": format!("{}/{}/schema/", API_PREFIX, rel.resource),
                "nullable": rel.null,
                "readonly": rel.kind == RelationKind::ToMany,
            }),
        );
    }
    fields.insert(
        "resource_uri".into(),
        json!({"type": "string", "nullable": false, "readonly": true}),
    );
    let filtering: Map<String, Value> = resource
        .filtering
        .iter()
        .map(|(k, v)| (k.clone(), filter_schema(v)))
        .collect();
    json!({
        "allowed_list_http_methods": permitted(resource, &LIST_METHODS),
        "allowed_detail_http_methods": permitted(resource, &DETAIL_METHODS),
        "default_format": "application/json",
        "default_limit": default_limit,
        "fields": fields,
        "filtering": filtering,
        "ordering": resource.ordering,
        "pk_type": match resource.table.pk_type {
            PkType::Uuid => "uuid",
            PkType::BigInt | PkType::Int => "integer",
            PkType::Text => "string",
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::User;
    use crate::resources;

    fn user(id: i64, is_staff: bool) -> Requester {
        Requester::User(User {
            id,
            username: format!("u{}", id),
            is_staff,
            is_superuser: false,
        })
    }

    #[test]
    fn method_check_intersects_endpoint_and_resource() {
        let api = resources::api().unwrap();
        let questions = api.resource("project/sheet/question").unwrap();
        assert_eq!(check_method(questions, &LIST_METHODS, &HttpMethod::POST).unwrap(), Method::Post);
        match check_method(questions, &DETAIL_METHODS, &HttpMethod::DELETE) {
            Err(AppError::MethodNotAllowed { allowed, .. }) => assert_eq!(allowed, vec!["GET"]),
            other => panic!("unexpected {:?}", other.map(|m| m.as_str())),
        }
        assert!(check_method(questions, &LIST_METHODS, &HttpMethod::OPTIONS).is_err());
    }

    #[test]
    fn owner_is_assigned_unless_given() {
        let api = resources::api().unwrap();
        let markers = api.resource("scout/marker").unwrap();
        let mut data = Map::new();
        assign_owner(markers, &user(7, false), &mut data);
        assert_eq!(data.get("created_by_id"), Some(&json!(7)));

        let mut data = json!({"created_by": "/api/v0/account/user/9/"}).as_object().unwrap().clone();
        assign_owner(markers, &user(7, false), &mut data);
        assert!(!data.contains_key("created_by_id"));

        let users = api.resource("account/user").unwrap();
        let mut data = Map::new();
        assign_owner(users, &user(7, false), &mut data);
        assert!(data.is_empty());
    }

    #[test]
    fn non_admins_cannot_write_for_others() {
        let api = resources::api().unwrap();
        let markers = api.resource("scout/marker").unwrap();
        let row = json!({"created_by_id": 9, "lat": 1.0}).as_object().unwrap().clone();
        assert!(matches!(
            check_ownership(markers, &user(7, false), &row),
            Err(AppError::Forbidden(_))
        ));
        assert!(check_ownership(markers, &user(9, false), &row).is_ok());
        assert!(check_ownership(markers, &user(1, true), &row).is_ok());
        let partial = json!({"lat": 2.0}).as_object().unwrap().clone();
        assert!(check_ownership(markers, &user(7, false), &partial).is_ok());
    }

    #[test]
    fn schema_describes_fields_and_filters() {
        let api = resources::api().unwrap();
        let sheets = api.resource("project/sheet/projectsheet").unwrap();
        let schema = describe(sheets, 20);
        assert_eq!(schema["allowed_list_http_methods"], json!(["get", "post"]));
        assert_eq!(schema["allowed_detail_http_methods"], json!(["get", "put", "patch"]));
        assert_eq!(schema["filtering"]["project"], json!(2));
        assert_eq!(schema["fields"]["project"]["related_type"], json!("to_one"));
        assert_eq!(schema["fields"]["question_answers"]["readonly"], json!(true));
        assert_eq!(schema["fields"]["id"]["readonly"], json!(true));
        assert_eq!(schema["fields"]["tags"]["type"], json!("json"));
        assert_eq!(schema["default_limit"], json!(20));

        let users = api.resource("account/user").unwrap();
        let schema = describe(users, 20);
        assert!(schema["fields"].get("password").is_none());
        assert_eq!(schema["fields"]["is_staff"]["readonly"], json!(true));
    }
}
