//! End-to-end resource tests against a live database. Run with
//! `DATABASE_URL=postgres://... cargo test -- --ignored`.

mod common;

use axum::http::{header, Method, StatusCode};
use common::{basic, body_json, create_user, db_state, get, memory_db_state, send};
use dataserver::app;
use serde_json::json;
use sqlx::PgPool;

async fn create_project(app: &axum::Router, auth: &str, slug: &str, title: &str) -> String {
    let response = send(
        app.clone(),
        Method::POST,
        "/api/v0/project/project/",
        Some(auth),
        Some(json!({"title": title, "slug": slug, "description": format!("{} description", title)})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response.headers()[header::LOCATION].to_str().unwrap().to_string()
}

async fn create_sheet(app: &axum::Router, auth: &str, project: &str, tags: serde_json::Value) -> StatusCode {
    send(
        app.clone(),
        Method::POST,
        "/api/v0/project/sheet/projectsheet/",
        Some(auth),
        Some(json!({"project": project, "tags": tags})),
    )
    .await
    .status()
}

#[sqlx::test(migrations = false)]
#[ignore]
async fn sheet_creation_attaches_template(pool: PgPool) {
    let state = db_state(pool.clone()).await;
    create_user(&pool, "admin", "correct horse", true).await;
    let auth = basic("admin", "correct horse");
    let app = app(state);

    let project = create_project(&app, &auth, "hives", "Urban hives").await;
    let response = send(
        app.clone(),
        Method::POST,
        "/api/v0/project/sheet/template/",
        Some(&auth),
        Some(json!({"name": "Default", "slug": "default"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let template = body_json(response).await;

    let response = send(
        app.clone(),
        Method::POST,
        "/api/v0/project/sheet/projectsheet/",
        Some(&auth),
        Some(json!({"project": project, "template_id": template["id"], "tags": ["bees"]})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let sheet = body_json(response).await;
    assert_eq!(sheet["template"], template["resource_uri"]);
    assert_eq!(sheet["project"]["resource_uri"], json!(project));
    assert_eq!(sheet["question_answers"], json!([]));

    let response = send(
        app.clone(),
        Method::POST,
        "/api/v0/project/sheet/projectsheet/",
        Some(&auth),
        Some(json!({"project": project, "template_id": 999_999})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM \"projectsheet_projectsheet\"")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[sqlx::test(migrations = false)]
#[ignore]
async fn faceted_search_narrows_and_autocompletes(pool: PgPool) {
    let state = db_state(pool.clone()).await;
    create_user(&pool, "admin", "correct horse", true).await;
    let auth = basic("admin", "correct horse");
    let app = app(state);

    let solar = create_project(&app, &auth, "solar", "Community solar").await;
    let hives = create_project(&app, &auth, "hives", "Urban hives").await;
    let cafe = create_project(&app, &auth, "cafe", "Repair cafe").await;
    assert_eq!(create_sheet(&app, &auth, &solar, json!(["urgent", "energy"])).await, StatusCode::CREATED);
    assert_eq!(create_sheet(&app, &auth, &hives, json!(["urgent", "urban"])).await, StatusCode::CREATED);
    assert_eq!(create_sheet(&app, &auth, &cafe, json!(["repair"])).await, StatusCode::CREATED);

    let all = body_json(get(app.clone(), "/api/v0/project/sheet/projectsheet/search/").await).await;
    assert_eq!(all["meta"]["total_count"], 3);
    let listed = body_json(get(app.clone(), "/api/v0/project/sheet/projectsheet/").await).await;
    assert_eq!(listed["meta"]["total_count"], 3);

    let urgent = body_json(get(app.clone(), "/api/v0/project/sheet/projectsheet/search/?facet=urgent").await).await;
    assert_eq!(urgent["meta"]["total_count"], 2);
    for sheet in urgent["objects"].as_array().unwrap() {
        assert!(sheet["tags"].as_array().unwrap().contains(&json!("urgent")));
    }

    let text = body_json(get(app.clone(), "/api/v0/project/sheet/projectsheet/search/?q=solar").await).await;
    assert_eq!(text["meta"]["total_count"], 1);
    assert_eq!(text["objects"][0]["project"]["title"], "Community solar");

    let auto = body_json(get(app.clone(), "/api/v0/project/sheet/projectsheet/search/?auto=ur").await).await;
    assert_eq!(
        auto,
        json!({"objects": [{"name": "urgent", "count": 2}, {"name": "urban", "count": 1}]})
    );
}

#[sqlx::test(migrations = false)]
#[ignore]
async fn users_never_expose_passwords(pool: PgPool) {
    let state = db_state(pool.clone()).await;
    let id = create_user(&pool, "ann", "correct horse", false).await;
    let app = app(state);

    let body = body_json(get(app.clone(), &format!("/api/v0/account/user/{}/", id)).await).await;
    assert_eq!(body["username"], "ann");
    assert!(body.get("password").is_none());
    assert!(body.get("is_superuser").is_none());

    let response = send(
        app.clone(),
        Method::PATCH,
        &format!("/api/v0/account/user/{}/", id),
        Some(&basic("ann", "correct horse")),
        Some(json!({"first_name": "Ann", "is_staff": true})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["first_name"], "Ann");
    assert_eq!(body["is_staff"], false);
}

#[sqlx::test(migrations = false)]
#[ignore]
async fn markers_belong_to_their_creator(pool: PgPool) {
    let state = db_state(pool.clone()).await;
    create_user(&pool, "ann", "pw-ann-123", false).await;
    create_user(&pool, "bob", "pw-bob-123", false).await;
    let ann = basic("ann", "pw-ann-123");
    let bob = basic("bob", "pw-bob-123");
    let app = app(state);

    let response = send(
        app.clone(),
        Method::POST,
        "/api/v0/scout/map/",
        Some(&ann),
        Some(json!({"name": "Allotments", "center_lat": 48.85, "center_lng": 2.35})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let map = body_json(response).await;

    let response = send(
        app.clone(),
        Method::POST,
        "/api/v0/scout/marker/",
        Some(&ann),
        Some(json!({"map": map["resource_uri"], "lat": 48.86, "lng": 2.34, "title": "Gate"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let marker = body_json(response).await;
    assert_eq!(marker["created_by"]["username"], "ann");
    let uri = marker["resource_uri"].as_str().unwrap().to_string();

    let response = send(app.clone(), Method::PATCH, &uri, Some(&bob), Some(json!({"title": "Mine"}))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = send(app.clone(), Method::DELETE, &uri, Some(&ann), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(get(app, &uri).await.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = false)]
#[ignore]
async fn sheet_history_records_each_change(pool: PgPool) {
    let state = db_state(pool.clone()).await;
    create_user(&pool, "admin", "correct horse", true).await;
    let auth = basic("admin", "correct horse");
    let app = app(state);

    let project = create_project(&app, &auth, "hives", "Urban hives").await;
    let response = send(
        app.clone(),
        Method::POST,
        "/api/v0/project/sheet/projectsheet/",
        Some(&auth),
        Some(json!({"project": project, "tags": ["bees"]})),
    )
    .await;
    let uri = response.headers()[header::LOCATION].to_str().unwrap().to_string();
    let response = send(app.clone(), Method::PATCH, &uri, Some(&auth), Some(json!({"tags": ["bees", "urgent"]}))).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let history = body_json(get(app, &format!("{}history/", uri)).await).await;
    assert_eq!(history["meta"]["total_count"], 2);
    assert_eq!(history["objects"][0]["history_type"], "~");
    assert_eq!(history["objects"][0]["snapshot"]["tags"], json!(["bees", "urgent"]));
    assert_eq!(history["objects"][1]["history_type"], "+");
}

#[sqlx::test(migrations = false)]
#[ignore]
async fn list_filters_and_paginates(pool: PgPool) {
    let state = db_state(pool.clone()).await;
    create_user(&pool, "admin", "correct horse", true).await;
    let auth = basic("admin", "correct horse");
    let app = app(state);
    for (slug, title) in [("a", "Alpha"), ("b", "Beta"), ("c", "Gamma")] {
        create_project(&app, &auth, slug, title).await;
    }

    let page = body_json(get(app.clone(), "/api/v0/project/project/?limit=2&order_by=-title").await).await;
    assert_eq!(page["meta"]["total_count"], 3);
    assert_eq!(page["objects"][0]["title"], "Gamma");
    assert!(page["meta"]["next"].as_str().unwrap().contains("offset=2"));
    assert!(page["meta"]["previous"].is_null());

    let filtered = body_json(get(app.clone(), "/api/v0/project/project/?title__icontains=ET").await).await;
    assert_eq!(filtered["meta"]["total_count"], 1);
    assert_eq!(filtered["objects"][0]["slug"], "b");

    let response = get(app, "/api/v0/project/project/?title__regex=x").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = false)]
#[ignore]
async fn tags_must_be_a_list_and_bad_rows_do_not_break_search(pool: PgPool) {
    let state = db_state(pool.clone()).await;
    create_user(&pool, "admin", "correct horse", true).await;
    let auth = basic("admin", "correct horse");
    let app = app(state);

    let hives = create_project(&app, &auth, "hives", "Urban hives").await;
    assert_eq!(create_sheet(&app, &auth, &hives, json!(["urgent"])).await, StatusCode::CREATED);
    assert_eq!(create_sheet(&app, &auth, &hives, json!("urgent")).await, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(create_sheet(&app, &auth, &hives, json!({"urgent": 1})).await, StatusCode::UNPROCESSABLE_ENTITY);

    // A row written outside the API with scalar tags.
    let project_id: i64 = sqlx::query_scalar("SELECT \"id\" FROM \"projects_project\" WHERE \"slug\" = 'hives'")
        .fetch_one(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO \"projectsheet_projectsheet\" (\"project_id\", \"tags\") VALUES ($1, '\"urban\"'::jsonb)")
        .bind(project_id)
        .execute(&pool)
        .await
        .unwrap();

    let response = get(app.clone(), "/api/v0/project/sheet/projectsheet/search/?auto=ur").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"objects": [{"name": "urgent", "count": 1}]}));

    let response = get(app.clone(), "/api/v0/project/sheet/projectsheet/search/?q=hives").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["meta"]["total_count"], 2);

    let response = get(app, "/api/v0/project/sheet/projectsheet/search/?facet=urgent").await;
    assert_eq!(body_json(response).await["meta"]["total_count"], 1);
}

#[sqlx::test(migrations = false)]
#[ignore]
async fn malformed_values_are_bad_requests(pool: PgPool) {
    let state = db_state(pool.clone()).await;
    create_user(&pool, "admin", "correct horse", true).await;
    let auth = basic("admin", "correct horse");
    let app = app(state);

    let response = get(app.clone(), "/api/v0/project/project/?begin_date=notadate").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "bad_request");

    let response = send(
        app.clone(),
        Method::POST,
        "/api/v0/project/project/",
        Some(&auth),
        Some(json!({"title": "Calendar", "slug": "calendar", "begin_date": "2024-13-45"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        app.clone(),
        Method::POST,
        "/api/v0/project/sheet/template/",
        Some(&auth),
        Some(json!({"name": "Default", "slug": "default"})),
    )
    .await;
    let template = body_json(response).await;
    let response = send(
        app.clone(),
        Method::POST,
        "/api/v0/project/sheet/question/",
        Some(&auth),
        Some(json!({"template_id": template["id"], "text": "Budget?", "slug": "budget", "order": 99_999_999_999i64})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        app,
        Method::POST,
        "/api/v0/project/sheet/question/",
        Some(&auth),
        Some(json!({"text": "Budget?", "slug": "budget"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM \"projectsheet_question\"")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[sqlx::test(migrations = false)]
#[ignore]
async fn stopword_only_query_matches_like_an_empty_one(pool: PgPool) {
    let state = db_state(pool.clone()).await;
    create_user(&pool, "admin", "correct horse", true).await;
    let auth = basic("admin", "correct horse");
    let app = app(state);

    let solar = create_project(&app, &auth, "solar", "Community solar").await;
    let cafe = create_project(&app, &auth, "cafe", "Repair cafe").await;
    create_sheet(&app, &auth, &solar, json!(["energy"])).await;
    create_sheet(&app, &auth, &cafe, json!(["repair"])).await;

    let body = body_json(get(app, "/api/v0/project/sheet/projectsheet/search/?q=the").await).await;
    assert_eq!(body["meta"]["total_count"], 2);
}

#[sqlx::test(migrations = false)]
#[ignore]
async fn memory_index_is_rebuilt_then_follows_writes(pool: PgPool) {
    let config = dataserver::resources::config();
    dataserver::apply_migrations(&pool, &config).await.unwrap();
    let seeded: i64 = sqlx::query_scalar(
        "INSERT INTO \"projects_project\" (\"title\", \"slug\") VALUES ('Seed library', 'seeds') RETURNING \"id\"",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO \"projectsheet_projectsheet\" (\"project_id\", \"tags\") VALUES ($1, '[\"seeds\", \"urgent\"]'::jsonb)")
        .bind(seeded)
        .execute(&pool)
        .await
        .unwrap();

    let state = memory_db_state(pool.clone()).await;
    create_user(&pool, "admin", "correct horse", true).await;
    let auth = basic("admin", "correct horse");
    let app = app(state);

    let body = body_json(get(app.clone(), "/api/v0/project/sheet/projectsheet/search/?q=seed").await).await;
    assert_eq!(body["meta"]["total_count"], 1);
    assert_eq!(body["objects"][0]["tags"], json!(["seeds", "urgent"]));

    let hives = create_project(&app, &auth, "hives", "Urban hives").await;
    let response = send(
        app.clone(),
        Method::POST,
        "/api/v0/project/sheet/projectsheet/",
        Some(&auth),
        Some(json!({"project": hives, "tags": ["urban"]})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let uri = response.headers()[header::LOCATION].to_str().unwrap().to_string();

    let body = body_json(get(app.clone(), "/api/v0/project/sheet/projectsheet/search/?q=hives").await).await;
    assert_eq!(body["meta"]["total_count"], 1);

    let response = send(app.clone(), Method::PATCH, &uri, Some(&auth), Some(json!({"tags": ["urban", "urgent"]}))).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let auto = body_json(get(app, "/api/v0/project/sheet/projectsheet/search/?auto=ur").await).await;
    assert_eq!(
        auto,
        json!({"objects": [{"name": "urgent", "count": 2}, {"name": "urban", "count": 1}]})
    );
}
