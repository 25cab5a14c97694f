use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/execute", post(handlers::execute))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            handlers::require_api_key,
        ))
        .route("/health", get(handlers::health_check))
        .with_state(state)
}
