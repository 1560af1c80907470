use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;

/// Machine-readable error category returned in `error.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    InvalidInput,
    NotFound,
    RateLimited,
    RepoError,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            Self::BadRequest | Self::InvalidInput => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::RepoError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    error: Body<'a>,
}

#[derive(Serialize)]
struct Body<'a> {
    code: ErrorCode,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
}

/// Error returned by task handlers; renders as `{"error":{code,message,hint?}}`.
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self {
            code: ErrorCode::BadRequest,
            message,
            hint,
        }
    }

    pub fn invalid_input(hint: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: "Invalid input",
            hint: Some(hint.into()),
        }
    }

    pub fn not_found(message: &'static str) -> Self {
        Self {
            code: ErrorCode::NotFound,
            message,
            hint: None,
        }
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self {
            code: ErrorCode::RateLimited,
            message: "Rate limit exceeded",
            hint: Some(format!("Retry after {retry_after_secs} seconds")),
        }
    }

    /// Repository failure; the detail is logged, never sent to the client.
    pub fn persistence(detail: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::RepoError,
            message: "Persistence error",
            hint: Some(detail.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        let public_hint = match self.code {
            ErrorCode::RepoError => None,
            _ => self.hint.as_deref(),
        };
        let body = Envelope {
            error: Body {
                code: self.code,
                message: self.message,
                hint: public_hint,
            },
        };
        let mut response = (status, Json(body)).into_response();

        let detail = self.hint.as_deref().unwrap_or(self.message);
        ErrorReport::from_message("infra::http::api", status, detail).attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn render(error: ApiError) -> (StatusCode, serde_json::Value, Option<ErrorReport>) {
        let response = error.into_response();
        let status = response.status();
        let report = response.extensions().get::<ErrorReport>().cloned();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap(), report)
    }

    #[tokio::test]
    async fn invalid_input_carries_hint() {
        let (status, body, report) = render(ApiError::invalid_input("title is required")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_input");
        assert_eq!(body["error"]["hint"], "title is required");
        assert_eq!(report.unwrap().messages, vec!["title is required"]);
    }

    #[tokio::test]
    async fn not_found_omits_hint() {
        let (status, body, _) = render(ApiError::not_found("task not found")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "task not found");
        assert!(body["error"].get("hint").is_none());
    }

    #[tokio::test]
    async fn rate_limited_is_429_with_retry_hint() {
        let (status, body, _) = render(ApiError::rate_limited(2)).await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "rate_limited");
        assert_eq!(body["error"]["hint"], "Retry after 2 seconds");
    }

    #[tokio::test]
    async fn persistence_detail_stays_in_report() {
        let (status, body, report) = render(ApiError::persistence("lock poisoned")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "repo_error");
        assert!(body["error"].get("hint").is_none());
        assert_eq!(report.unwrap().messages, vec!["lock poisoned"]);
    }
}
