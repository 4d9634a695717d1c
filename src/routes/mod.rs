//! HTTP route table.

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{configuration, memory, system};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/Configuration/GetSchema",
            get(configuration::get_schema),
        )
        .route(
            "/api/Configuration/GetSettings",
            get(configuration::get_settings),
        )
        .route(
            "/api/Configuration/UpdateSettings",
            post(configuration::update_settings),
        )
        .route(
            "/api/Configuration/DeleteSettings",
            delete(configuration::delete_settings),
        )
        .route("/api/System/GetLogs", get(system::get_logs))
        .route("/api/Memory", get(memory::list))
        .route("/api/Memory/search", get(memory::search))
        .route("/api/Memory/stats", get(memory::stats))
        .route("/api/Memory/clear", delete(memory::clear))
        .route(
            "/api/Memory/{key}",
            get(memory::get).put(memory::put).delete(memory::delete),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
