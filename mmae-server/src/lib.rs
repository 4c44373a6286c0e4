//! HTTP surface for acquiring audio, rendering spectrograms and exporting
//! clips.

pub mod api;
pub mod config;
pub mod error;
pub mod state;
pub mod storage;
pub mod sweeper;

use axum::{Router, extract::DefaultBodyLimit, routing::get};
use tower_http::{
    limit::RequestBodyLimitLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

pub use config::AppConfig;
pub use state::AppState;
pub use sweeper::spawn_sweeper;

/// Builds the full application router. The index page and `/static` are
/// served from `server.static_dir`.
pub fn build_router(state: AppState, server: &config::ServerConfig) -> Router {
    let index = server.static_dir.join("index.html");

    Router::new()
        .route("/health", get(api::health))
        .nest("/api", api::routes())
        .route_service("/", ServeFile::new(index))
        .nest_service("/static", ServeDir::new(&server.static_dir))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(server.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
