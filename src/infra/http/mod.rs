pub mod api;
mod health;
mod middleware;
mod rate_limit;

pub use api::{ApiState, build_api_router};
pub use health::{Component, ComponentStatus, HealthResponse};
pub use rate_limit::RateLimiter;

use std::sync::Arc;

use axum::{Router, middleware as axum_middleware, routing::get};

use crate::cache::{CacheState, CacheStore, response_cache_layer};

use self::middleware::{log_responses, set_request_context};
use self::rate_limit::rate_limit;

#[derive(Clone)]
pub struct HttpState {
    pub api: ApiState,
    /// Probed by `/health` whether or not the response cache is enabled.
    pub store: Arc<dyn CacheStore>,
    pub cache: Option<CacheState>,
    pub rate_limit: Option<RateLimiter>,
}

pub fn build_router(state: HttpState) -> Router {
    // Only the task API is cached; health must always reach its handler.
    let api_routes = build_api_router(state.api.clone());
    let api_routes = if let Some(cache_state) = state.cache.clone() {
        api_routes.layer(axum_middleware::from_fn_with_state(
            cache_state,
            response_cache_layer,
        ))
    } else {
        api_routes
    };

    let limiter = state.rate_limit.clone();
    let status_routes = Router::new()
        .route("/health", get(health::health))
        .with_state(state);

    let router = api_routes.merge(status_routes);
    let router = match limiter {
        Some(limiter) => router.layer(axum_middleware::from_fn_with_state(limiter, rate_limit)),
        None => router,
    };

    router
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
