//! Routes for every declared resource under `/api/v0`.
//! Each resource gets its own static paths; static segments (`schema`, `set`, `search`) win over `:id`.

use crate::config::ResolvedResource;
use crate::handlers::resource::{collection, detail, history, schema, set, ResourceName};
use crate::handlers::search::search;
use crate::state::AppState;
use axum::{routing::any, Extension, Router};
use std::sync::Arc;

fn routes_for(resource: &ResolvedResource) -> Router<AppState> {
    let base = resource.list_uri();
    let mut router = Router::new()
        .route(&base, any(collection))
        .route(&format!("{}schema/", base), any(schema))
        .route(&format!("{}set/:ids/", base), any(set))
        .route(&format!("{}:id/", base), any(detail))
        .route(&format!("{}:id/history/", base), any(history));
    if resource.search_index.is_some() {
        router = router.route(&resource.search_uri(), any(search));
    }
    router.layer(Extension(ResourceName(Arc::from(resource.resource_name.as_str()))))
}

/// One router per resource, merged. Resource names are unique, so paths never collide.
pub fn resource_routes(state: AppState) -> Router {
    let mut router = Router::new();
    for resource in &state.api.resources {
        router = router.merge(routes_for(resource));
    }
    router.with_state(state)
}
