//! Shared application state for all routes. Immutable after startup apart from the search index's own lock.

use crate::config::Api;
use crate::search::SearchIndex;
use crate::settings::Settings;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub api: Arc<Api>,
    pub search: Arc<dyn SearchIndex>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(pool: PgPool, api: Api, search: Arc<dyn SearchIndex>, settings: Settings) -> Self {
        AppState {
            pool,
            api: Arc::new(api),
            search,
            settings: Arc::new(settings),
        }
    }
}
