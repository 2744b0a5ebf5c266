//! dataserver: declarative REST resources for accounts, project sheets and scout maps on PostgreSQL.

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod migration;
pub mod paginator;
pub mod resources;
pub mod response;
pub mod routes;
pub mod search;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{resolve, Api, FullConfig, ResolvedResource};
pub use error::{AppError, ConfigError};
pub use migration::apply_migrations;
pub use routes::{common_routes, resource_routes};
pub use settings::{SearchBackend, Settings};
pub use state::AppState;
pub use store::ensure_database_exists;

use axum::Router;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// The full HTTP application: common routes plus every resource route.
pub fn app(state: AppState) -> Router {
    let body_limit = state.settings.body_limit_bytes;
    common_routes(state.clone())
        .merge(resource_routes(state))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
}
