use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use time::OffsetDateTime;

use crate::application::error::ErrorReport;
use crate::cache::CacheStore;

use super::HttpState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComponentStatus {
    Up,
    Down,
}

#[derive(Debug, Serialize)]
pub struct Component {
    pub status: ComponentStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Services {
    pub cache: Component,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub version: &'static str,
    pub services: Services,
}

pub(super) async fn health(State(state): State<HttpState>) -> Response {
    let cache = check_cache(&state.store).await;
    let status = cache.status;
    let detail = (status == ComponentStatus::Down).then(|| cache.message.clone());

    let body = HealthResponse {
        status,
        timestamp: OffsetDateTime::now_utc(),
        version: env!("CARGO_PKG_VERSION"),
        services: Services { cache },
    };

    match detail {
        None => (StatusCode::OK, Json(body)).into_response(),
        Some(detail) => {
            let mut response = (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
            ErrorReport::from_message(
                "infra::http::health",
                StatusCode::SERVICE_UNAVAILABLE,
                detail,
            )
            .attach(&mut response);
            response
        }
    }
}

async fn check_cache(store: &Arc<dyn CacheStore>) -> Component {
    match store.ping().await {
        Ok(()) => Component {
            status: ComponentStatus::Up,
            message: "cache store reachable".to_string(),
        },
        Err(err) => Component {
            status: ComponentStatus::Down,
            message: format!("cache store unreachable: {err}"),
        },
    }
}
