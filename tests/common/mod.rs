#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dataserver::search::{MemoryIndex, PgSearchIndex, SearchIndex};
use dataserver::{resources, AppState, Settings};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceExt;

pub const SHEET: &str = "project/sheet/projectsheet";

/// State whose pool never connects. Only for paths that stay off the database.
pub fn lazy_state(index: MemoryIndex) -> AppState {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/dataserver_unused")
        .unwrap();
    let api = resources::api().unwrap();
    AppState::new(pool, api, Arc::new(index), Settings::default())
}

/// Migrated database with postgres search.
pub async fn db_state(pool: PgPool) -> AppState {
    let config = resources::config();
    dataserver::apply_migrations(&pool, &config).await.unwrap();
    let api = dataserver::resolve(&config).unwrap();
    let search: Arc<dyn SearchIndex> = Arc::new(PgSearchIndex::new(pool.clone()));
    AppState::new(pool, api, search, Settings::default())
}

/// Migrated database with an in-process index, rebuilt from whatever rows exist now.
pub async fn memory_db_state(pool: PgPool) -> AppState {
    let config = resources::config();
    dataserver::apply_migrations(&pool, &config).await.unwrap();
    let api = dataserver::resolve(&config).unwrap();
    let index = MemoryIndex::new();
    index.rebuild(&pool, &api).await.unwrap();
    AppState::new(pool, api, Arc::new(index), Settings::default())
}

/// Insert an active user with an argon2 password; returns its id.
pub async fn create_user(pool: &PgPool, username: &str, password: &str, is_staff: bool) -> i64 {
    let hash = dataserver::auth::password::hash_password(password).unwrap();
    sqlx::query_scalar(
        "INSERT INTO \"account_user\" (\"username\", \"password\", \"is_staff\") VALUES ($1, $2, $3) RETURNING \"id\"",
    )
    .bind(username)
    .bind(hash)
    .bind(is_staff)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}

pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, None).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
