use axum::Router;
use quantum5ocial::{
    db::{ConnectionStore, DatabaseConfig, MemoryConnectionStore, PgConnectionStore},
    handlers::{api_router, AppState},
    utils::{self, StoreBackend},
    get_db_pool, Config,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use axum::http::{HeaderValue, Method};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::init_logging();

    let config = Config::from_env()?;
    let store = open_store(&config).await?;

    let port = config.port;
    let app = create_router(store, config);

    let listener = tokio::net::TcpListener::bind(&format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Server running on port {}", port);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn ConnectionStore>> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let db_config = DatabaseConfig::from_env()?;
            let pool = get_db_pool(&db_config).await?;

            // Run migrations
            quantum5ocial::db::migrations::run_migrations(&pool).await?;

            Ok(Arc::new(PgConnectionStore::new(pool)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory connection store; nothing will be persisted");
            Ok(Arc::new(MemoryConnectionStore::new()))
        }
    }
}

fn create_router(store: Arc<dyn ConnectionStore>, config: Config) -> Router {
    let cors_layer = create_cors_layer(&config);
    tracing::info!("Decline policy: {:?}", config.decline_policy);

    api_router(AppState::new(store, config))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
}

fn create_cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        // Default to permissive for development
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}
