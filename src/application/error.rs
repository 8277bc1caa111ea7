use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{cache::CacheError, infra::error::InfraError};

/// Diagnostic chain attached to error responses for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

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

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            public_message,
            report: ErrorReport::from_message(source, status, detail),
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        Self {
            status,
            public_message,
            report: ErrorReport::from_error(source, status, error),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Map a cache failure onto the response a client should see.
    pub fn from_cache(source: &'static str, error: &CacheError) -> Self {
        let (status, public_message) = match error {
            CacheError::InvalidPattern { .. } => (StatusCode::BAD_REQUEST, "Invalid pattern"),
            CacheError::Serialization(_) => (StatusCode::BAD_REQUEST, "Invalid parameters"),
            CacheError::Generator(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Artifact generation failed")
            }
            CacheError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "Cache unavailable"),
        };
        Self::from_error(source, status, public_message, error)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::Cache(CacheError::InvalidPattern { .. })
            | AppError::Cache(CacheError::Serialization(_)) => StatusCode::BAD_REQUEST,
            AppError::Cache(CacheError::Store(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Cache(CacheError::Generator(_))
            | AppError::Infra(_)
            | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Validation(_)
            | AppError::Cache(CacheError::InvalidPattern { .. })
            | AppError::Cache(CacheError::Serialization(_)) => "Request could not be processed",
            AppError::Cache(CacheError::Store(_)) => "Service temporarily unavailable",
            AppError::Cache(CacheError::Generator(_)) => "Artifact generation failed",
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_)) => "I/O failure during request",
            AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.presentation_message();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, message).into_response();
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StoreError;

    #[test]
    fn cache_errors_map_to_statuses() {
        let pattern = HttpError::from_cache("test", &CacheError::invalid_pattern("[", "unclosed"));
        assert_eq!(pattern.status(), StatusCode::BAD_REQUEST);

        let store = HttpError::from_cache(
            "test",
            &CacheError::from(StoreError::unavailable("down")),
        );
        assert_eq!(store.status(), StatusCode::SERVICE_UNAVAILABLE);

        let generator = HttpError::from_cache(
            "test",
            &CacheError::generator(std::io::Error::other("boom")),
        );
        assert_eq!(generator.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn report_collects_source_chain() {
        let error = CacheError::generator(std::io::Error::other("font missing"));
        let report = ErrorReport::from_error("test", StatusCode::INTERNAL_SERVER_ERROR, &error);

        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[1], "font missing");
    }

    #[test]
    fn http_error_attaches_report() {
        let response =
            HttpError::new("test", StatusCode::NOT_FOUND, "Entry not found", "abc").into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.source, "test");
        assert_eq!(report.messages, vec!["abc".to_string()]);
    }
}
