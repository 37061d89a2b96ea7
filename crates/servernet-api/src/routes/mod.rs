pub mod server_networks;


use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Server network lifecycle
        .route(
            "/v1/server-networks",
            post(server_networks::create_server_network),
        )
        .route(
            "/v1/server-networks/{id}",
            get(server_networks::get_server_network)
                .patch(server_networks::update_server_network)
                .delete(server_networks::delete_server_network),
        )
        .route(
            "/v1/server-networks/{id}/refresh",
            post(server_networks::refresh_server_network),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
