//! HTTP server and routes.

mod handlers;
mod state;

pub use state::AppState;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Leave headroom above the configured ceilings; precise rejection
    // happens in store validation.
    let body_limit =
        (state.config.upload.max_book_bytes + state.config.upload.max_cover_bytes) as usize
            + 1024 * 1024;

    let books_dir = state.config.storage.books_dir();
    let covers_dir = state.config.storage.covers_dir();

    Router::new()
        .route(
            "/books",
            get(handlers::list_books).post(handlers::create_book),
        )
        .route(
            "/books/{id}",
            get(handlers::book_metadata).delete(handlers::delete_book),
        )
        .route("/books/{id}/download", get(handlers::book_download))
        .route("/favorites", get(handlers::list_favorites))
        .route("/favorites/{id}", post(handlers::toggle_favorite))
        // ServeDir answers Range requests, which the paginated pipeline
        // uses for incremental page access.
        .nest_service("/assets/books", ServeDir::new(books_dir))
        .nest_service("/assets/image", ServeDir::new(covers_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
