use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;
use tracing::error;

use cm_common::db::{DbPoolError, SavedSearchError};
use cm_common::matching::{EngineError, FetchError, FilterError, ProviderError, StoreError};

tokio::task_local! {
    static REQUEST_ID: String;
}

fn sanitize_message(message: &str) -> String {
    const MAX_LEN: usize = 240;

    let mut cleaned = message
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .split_whitespace()
        .map(|token| {
            if token.contains("://") {
                "[redacted-url]".to_string()
            } else if token.starts_with('/') || token.contains('\\') {
                "[redacted-path]".to_string()
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.len() > MAX_LEN {
        let mut cut = MAX_LEN;
        while !cleaned.is_char_boundary(cut) {
            cut -= 1;
        }
        cleaned.truncate(cut);
        cleaned.push_str("...");
    }

    if cleaned.trim().is_empty() {
        "unexpected error".to_string()
    } else {
        cleaned
    }
}

pub async fn with_request_id<Fut, T>(request_id: Option<String>, fut: Fut) -> T
where
    Fut: Future<Output = T>,
{
    if let Some(request_id) = request_id {
        REQUEST_ID.scope(request_id, fut).await
    } else {
        fut.await
    }
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|value| value.clone()).ok()
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("database error: {0}")]
    Database(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("too many requests: {0}")]
    TooManyRequests(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
    request_id: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let code = self.code();
        let request_id = current_request_id();

        error!(
            code,
            status = %status,
            request_id = request_id.as_deref().unwrap_or(""),
            error = %self,
            "api_error"
        );

        let body = Json(ErrorResponse {
            code,
            message: self.public_message().into_owned(),
            request_id,
        });

        (status, body).into_response()
    }
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::TooManyRequests(_) => "too_many_requests",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::Upstream(_) => "upstream_error",
            ApiError::Database(_) => "database_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn public_message(&self) -> Cow<'static, str> {
        match self {
            ApiError::BadRequest(msg) => Cow::Owned(sanitize_message(msg)),
            ApiError::Unauthorized(_) => Cow::Borrowed("unauthorized"),
            ApiError::Forbidden(_) => Cow::Borrowed("forbidden"),
            ApiError::NotFound(msg) => Cow::Owned(sanitize_message(msg)),
            ApiError::Conflict(msg) => Cow::Owned(sanitize_message(msg)),
            ApiError::TooManyRequests(_) => Cow::Borrowed("too many requests"),
            ApiError::ServiceUnavailable(_) => Cow::Borrowed("service unavailable"),
            ApiError::Upstream(_) => Cow::Borrowed("compatibility service returned an invalid response"),
            ApiError::Database(_) | ApiError::Internal(_) => Cow::Borrowed("internal server error"),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<FilterError> for ApiError {
    fn from(value: FilterError) -> Self {
        ApiError::BadRequest(value.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            StoreError::Unavailable(msg) => ApiError::ServiceUnavailable(msg),
            StoreError::Backend(msg) => ApiError::Database(msg),
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(value: FetchError) -> Self {
        match value {
            FetchError::Provider(ProviderError::NotFound(msg)) => ApiError::NotFound(msg),
            FetchError::Provider(ProviderError::Unavailable(msg)) => {
                ApiError::ServiceUnavailable(msg)
            }
            FetchError::Provider(ProviderError::Malformed(msg)) => ApiError::Upstream(msg),
            FetchError::Provider(ProviderError::Backend(msg)) => ApiError::Database(msg),
            FetchError::Timeout(_) => ApiError::ServiceUnavailable(value.to_string()),
            FetchError::Empty => ApiError::NotFound("no compatibility score for this pair".into()),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(value: EngineError) -> Self {
        match value {
            EngineError::Filters(err) => err.into(),
            EngineError::Store(err) => err.into(),
            EngineError::Fetch(err) => err.into(),
            EngineError::ProfileNotFound(id) => ApiError::NotFound(format!("profile {id} not found")),
            EngineError::GigNotFound(id) => ApiError::NotFound(format!("gig {id} not found")),
            EngineError::Superseded(generation) => ApiError::Conflict(format!(
                "superseded by a newer request (generation {generation})"
            )),
        }
    }
}

impl From<SavedSearchError> for ApiError {
    fn from(value: SavedSearchError) -> Self {
        match value {
            SavedSearchError::MissingUser => {
                ApiError::BadRequest("saved search owner is required".into())
            }
            SavedSearchError::MissingName => {
                ApiError::BadRequest("saved search name must not be empty".into())
            }
            SavedSearchError::Serialization(err) => ApiError::Internal(err.to_string()),
            other => ApiError::Database(other.to_string()),
        }
    }
}

impl From<DbPoolError> for ApiError {
    fn from(value: DbPoolError) -> Self {
        ApiError::Database(format!("failed to create pool: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use serde_json::Value;

    use super::*;

    #[tokio::test]
    async fn includes_request_id_in_response_body_when_present() {
        let err = ApiError::Internal("boom".into());
        let response = with_request_id(Some("req-123".into()), async { err.into_response() }).await;

        let (parts, body) = response.into_parts();
        assert_eq!(parts.status, StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = body.collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["request_id"], "req-123");
        assert_eq!(json["message"], "internal server error");
    }

    #[test]
    fn engine_errors_map_to_statuses() {
        let cases = [
            (EngineError::Superseded(4), StatusCode::CONFLICT),
            (EngineError::ProfileNotFound("p".into()), StatusCode::NOT_FOUND),
            (
                EngineError::Filters(FilterError::Inverted { min: 90.0, max: 10.0 }),
                StatusCode::BAD_REQUEST,
            ),
            (
                EngineError::Fetch(FetchError::Timeout(std::time::Duration::from_secs(5))),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                EngineError::Fetch(FetchError::Provider(ProviderError::Malformed("x".into()))),
                StatusCode::BAD_GATEWAY,
            ),
            (
                EngineError::Store(StoreError::Unavailable("down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status_code(), status);
        }
    }

    #[test]
    fn sanitize_redacts_urls_and_paths() {
        let cleaned = sanitize_message("failed postgres://u:p@db/x at /var/lib/file");
        assert_eq!(cleaned, "failed [redacted-url] at [redacted-path]");
    }
}
