use crate::blob_store::BlobError;
use crate::database::DatabaseError;
use crate::jira_client::TrackerError;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;

/// A failed write to one of the two persistence collaborators.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("document store: {0}")]
    Database(#[from] DatabaseError),
    #[error("blob store: {0}")]
    Blob(#[from] BlobError),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    ExternalService(String),
    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("{0}")]
    Internal(String),
}

impl From<TrackerError> for AppError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::NotFound(message) => AppError::NotFound(message),
            TrackerError::ExternalService(message) => AppError::ExternalService(message),
            TrackerError::InvalidRequest(message) => AppError::Validation(message),
            TrackerError::RateLimited {
                message,
                retry_after,
            } => AppError::RateLimited {
                message,
                retry_after,
            },
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::RateLimited { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Persistence(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "Request rejected");
        }

        let mut response = (
            status,
            axum::Json(serde_json::json!({ "detail": self.to_string() })),
        )
            .into_response();

        if let AppError::RateLimited {
            retry_after: Some(retry_after),
            ..
        } = &self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
