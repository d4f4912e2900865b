//! API Routes
//!
//! Configures the Axum router with all blob server endpoints.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    health_handler, info_handler, retrieve_blob_handler, stats_handler, store_blob_handler,
    AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /info` - Echo of the request and the configured cache server
/// - `GET /health` - Cache reachability
/// - `GET /stats` - In-memory cache statistics
/// - `PUT /blobs/:name` - Store the request body as a blob (`?force=true` replaces)
/// - `GET /blobs/:name` - Retrieve a verified blob
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
/// - Body limit: one byte past the largest storable blob, so oversized
///   uploads still reach the size check and get its error message
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = usize::try_from(state.blobs.settings().max_blob_size)
        .unwrap_or(usize::MAX)
        .saturating_add(1);

    Router::new()
        .route("/info", get(info_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route(
            "/blobs/:name",
            put(store_blob_handler).get(retrieve_blob_handler),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::ChunkSettings;
    use crate::cache::{CacheBackend, MemcacheClient, MemoryCache};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        let cache = CacheBackend::Memory(MemoryCache::new(100, 1024));
        create_router(AppState::new(cache, ChunkSettings::default()))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = create_test_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let response = create_test_app()
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_not_available_for_memcached() {
        let cache = CacheBackend::Memcached(MemcacheClient::new(
            "127.0.0.1:1",
            Duration::from_millis(200),
        ));
        let app = create_router(AppState::new(cache, ChunkSettings::default()));

        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_put_blob_endpoint() {
        let response = create_test_app()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/blobs/test")
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_get_blob_not_found() {
        let response = create_test_app()
            .oneshot(
                Request::builder()
                    .uri("/blobs/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
