//! Top-level router configuration.
//!
//! # Route Structure
//!
//! - `GET  /health`  - Health check (store ping)
//! - `/api/*`        - REST API, see [`crate::api::routes`]
//! - anything else   - JSON 404
//!
//! # Middleware
//!
//! In request order:
//!
//! 1. **Tracing** - Structured request/response logging
//! 2. **Panic catcher** - A panicking handler becomes a JSON 500
//! 3. **Rate limiting** - Per-IP token bucket, when enabled
//!
//! [`app_service`] wraps the result in trailing-slash normalization, which
//! has to run before routing.

use crate::api::handlers::{health_handler, not_found_handler};
use crate::api::middleware::rate_limit::RateLimitLayer;
use crate::api::middleware::tracing;
use crate::api::routes::api_routes;
use crate::error::handle_panic;
use crate::state::AppState;
use axum::Router;
use axum::routing::get;
use tower::Layer;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};

/// Optional parts of the pipeline.
#[derive(Default)]
pub struct RouterOptions {
    pub rate_limit: Option<RateLimitLayer>,
}

/// Constructs the application router with all routes and middleware.
pub fn app_router(state: AppState, options: RouterOptions) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api_routes())
        .fallback(not_found_handler)
        .method_not_allowed_fallback(not_found_handler)
        .with_state(state);

    if let Some(rate_limit) = options.rate_limit {
        router = router.layer(rate_limit);
    }

    router
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(tracing::layer())
}

/// Wraps the router so `/api/users/` is routed like `/api/users`.
pub fn app_service(router: Router) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odm::store::MockDocumentStore;
    use crate::server::build_odm;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_panicking_handler_becomes_json_500() {
        let mut store = MockDocumentStore::new();
        store
            .expect_ping()
            .returning(|| panic!("store driver bug"));

        let odm = build_odm(Arc::new(store)).unwrap();
        let app = app_router(AppState::new(odm).unwrap(), RouterOptions::default());

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal Server Error");
    }
}
