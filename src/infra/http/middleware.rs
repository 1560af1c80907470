use std::time::Instant;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;
use crate::cache::SCOPE_HEADER;

/// Per-request identifier, available to handlers and echoed on the response
/// extensions.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    pub request_id: Uuid,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext {
        request_id: Uuid::new_v4(),
    };
    request.extensions_mut().insert(ctx);

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Logs every 4xx/5xx response together with the diagnostic the handler attached.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id);
    let scope = request
        .headers()
        .get(SCOPE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let mut response = next.run(request).await;
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    FailedRequest {
        method,
        path,
        query,
        status,
        elapsed_ms: started.elapsed().as_millis() as u64,
        request_id,
        scope,
        report: response.extensions_mut().remove::<ErrorReport>(),
    }
    .log();

    response
}

struct FailedRequest {
    method: Method,
    path: String,
    query: Option<String>,
    status: StatusCode,
    elapsed_ms: u64,
    request_id: Option<Uuid>,
    scope: Option<String>,
    report: Option<ErrorReport>,
}

impl FailedRequest {
    fn log(&self) {
        let (source, chain) = match &self.report {
            Some(report) => (report.source, report.messages.as_slice()),
            None => ("unknown", &[][..]),
        };
        let detail = chain
            .first()
            .map(String::as_str)
            .unwrap_or("no diagnostic available");
        let request_id = self.request_id.map(|id| id.to_string()).unwrap_or_default();
        let query = self.query.as_deref().unwrap_or("");
        let user_id = self.scope.as_deref().unwrap_or("");

        if self.status.is_server_error() {
            error!(
                target: "taskdeck::http::response",
                status = self.status.as_u16(),
                method = %self.method,
                path = %self.path,
                query,
                elapsed_ms = self.elapsed_ms,
                source,
                detail,
                chain = ?chain,
                request_id = %request_id,
                user_id,
                "request failed"
            );
        } else {
            warn!(
                target: "taskdeck::http::response",
                status = self.status.as_u16(),
                method = %self.method,
                path = %self.path,
                query,
                elapsed_ms = self.elapsed_ms,
                source,
                detail,
                chain = ?chain,
                request_id = %request_id,
                user_id,
                "client request rejected"
            );
        }
    }
}
