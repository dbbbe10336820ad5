pub mod entanglements;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::db::ConnectionStore;
use crate::services::InFlight;
use crate::utils::Config;

pub use entanglements::{
    decline, entanglement_status, entanglement_statuses, list_entanglements, remove,
    request_or_accept, ApiError, Viewer,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConnectionStore>,
    pub config: Config,
    pub in_flight: InFlight,
}

impl AppState {
    pub fn new(store: Arc<dyn ConnectionStore>, config: Config) -> Self {
        Self {
            store,
            config,
            in_flight: InFlight::new(),
        }
    }
}

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/entanglements", get(list_entanglements))
        .route("/api/entanglements/statuses", post(entanglement_statuses))
        .route(
            "/api/entanglements/{other}",
            get(entanglement_status).post(request_or_accept).delete(remove),
        )
        .route("/api/entanglements/{other}/decline", post(decline))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
