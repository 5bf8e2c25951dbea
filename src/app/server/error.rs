use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::app::catalog::CatalogError;
use crate::app::download::DownloadError;
use crate::app::episode::ValidationError;

#[derive(Debug, Error)]
pub(crate) enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Malformed(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Malformed(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    kind: &'static str,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    retryable: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = self.to_string();
        let (status, kind, error, details, retryable) = match &self {
            ApiError::Validation(_)
            | ApiError::Malformed(_)
            | ApiError::Download(DownloadError::Invalid(_)) => (
                StatusCode::BAD_REQUEST,
                "validation",
                detail,
                None,
                false,
            ),
            ApiError::Download(DownloadError::ToolNotFound(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "tool_not_found",
                "Downloader is not installed or not in PATH".to_string(),
                Some(detail),
                false,
            ),
            ApiError::Download(DownloadError::ToolFailed { .. }) => (
                StatusCode::BAD_GATEWAY,
                "tool_failed",
                "Downloader reported an error".to_string(),
                Some(detail),
                true,
            ),
            ApiError::Download(DownloadError::OutputNotDetected) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "output_not_detected",
                "Downloader ran but no downloaded file was found".to_string(),
                None,
                true,
            ),
            ApiError::Download(DownloadError::Io(_)) => {
                tracing::error!("download directory error: {detail}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage",
                    "Download directory is not accessible".to_string(),
                    Some(detail),
                    false,
                )
            }
            ApiError::Catalog(_) => {
                tracing::warn!("catalog error: {detail}");
                (
                    StatusCode::BAD_GATEWAY,
                    "search_failed",
                    "Search failed".to_string(),
                    Some(detail),
                    true,
                )
            }
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", detail, None, false),
            ApiError::Internal(_) => {
                tracing::error!("internal error: {detail}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal error".to_string(),
                    Some(detail),
                    false,
                )
            }
        };

        let body = ErrorResponse {
            kind,
            error,
            details,
            retryable,
        };
        (status, Json(body)).into_response()
    }
}

pub(crate) type ApiResult<T> = Result<T, ApiError>;
