use dataserver::search::{MemoryIndex, PgSearchIndex, SearchIndex};
use dataserver::{apply_migrations, app, ensure_database_exists, resources, store, AppState, SearchBackend, Settings};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dataserver=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    ensure_database_exists(&settings.database_url).await?;
    let pool = store::connect(&settings).await?;

    let config = resources::config();
    apply_migrations(&pool, &config).await?;
    let api = dataserver::resolve(&config)?;

    let search: Arc<dyn SearchIndex> = match settings.search_backend {
        SearchBackend::Postgres => Arc::new(PgSearchIndex::new(pool.clone())),
        SearchBackend::Memory => {
            let index = MemoryIndex::new();
            index.rebuild(&pool, &api).await?;
            Arc::new(index)
        }
    };

    let addr = settings.bind_addr();
    let state = AppState::new(pool, api, search, settings);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        resources = state.api.resources.len(),
        "dataserver listening"
    );
    axum::serve(listener, app(state)).await?;
    Ok(())
}
