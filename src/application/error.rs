use std::error::Error as StdError;
use std::iter;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::infra::error::InfraError;

/// Diagnostic an error response carries in its extensions for the response
/// logger. Never serialized to the client.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Display text of `error` and each of its causes, outermost first.
pub fn error_chain(error: &(dyn StdError + 'static)) -> Vec<String> {
    iter::successors(Some(error), |current| (*current).source())
        .map(ToString::to_string)
        .collect()
}

/// Failure at the binary boundary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::StoreError;

    use super::*;

    #[test]
    fn chain_lists_every_cause() {
        let error = AppError::from(InfraError::from(StoreError::unavailable("refused")));
        assert_eq!(
            error_chain(&error),
            vec![
                "cache store error: cache store unavailable: refused",
                "cache store unavailable: refused",
            ]
        );
    }

    #[test]
    fn unexpected_error_is_its_own_chain() {
        let error = AppError::unexpected("server task failed");
        assert_eq!(error_chain(&error), vec!["unexpected error: server task failed"]);
    }
}
