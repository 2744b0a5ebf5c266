//! Response envelopes: `{meta, objects}` lists, bare bundles, and write responses.

use crate::paginator::Meta;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub meta: Meta,
    pub objects: Vec<T>,
}

/// Response without pagination (autocomplete, `set/`).
#[derive(Serialize)]
pub struct ObjectsResponse<T> {
    pub objects: Vec<T>,
}

pub fn list<T: Serialize>(meta: Meta, objects: Vec<T>) -> (StatusCode, Json<ListResponse<T>>) {
    (StatusCode::OK, Json(ListResponse { meta, objects }))
}

pub fn objects<T: Serialize>(objects: Vec<T>) -> (StatusCode, Json<ObjectsResponse<T>>) {
    (StatusCode::OK, Json(ObjectsResponse { objects }))
}

pub fn detail(bundle: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(bundle))
}

/// 201 with `Location`; the body only when the resource returns data on write.
pub fn created(location: &str, bundle: Option<Value>) -> Response {
    let mut response = match bundle {
        Some(b) => (StatusCode::CREATED, Json(b)).into_response(),
        None => StatusCode::CREATED.into_response(),
    };
    if let Ok(v) = HeaderValue::from_str(location) {
        response.headers_mut().insert(header::LOCATION, v);
    }
    response
}

/// 202 with the bundle, or 204 when the resource does not return data on write.
pub fn updated(bundle: Option<Value>) -> Response {
    match bundle {
        Some(b) => (StatusCode::ACCEPTED, Json(b)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

pub fn deleted() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn created_sets_location() {
        let r = created("/api/v0/scout/map/7/", None);
        assert_eq!(r.status(), StatusCode::CREATED);
        assert_eq!(r.headers().get(header::LOCATION).unwrap(), "/api/v0/scout/map/7/");
    }

    #[test]
    fn update_status_depends_on_returned_data() {
        assert_eq!(updated(Some(json!({"id": 1}))).status(), StatusCode::ACCEPTED);
        assert_eq!(updated(None).status(), StatusCode::NO_CONTENT);
    }
}
