use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use aws_smithy_types::error::operation::BuildError as SmithyBuildError;
use thiserror::Error;

// --- Domain/Infrastructure Errors ---

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Document store unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),

    #[error("Stored post could not be decoded: {0}")]
    DataCorruption(String),

    #[error("Database backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

impl From<SmithyBuildError> for RepoError {
    fn from(err: SmithyBuildError) -> Self {
        RepoError::BackendError(anyhow::Error::new(err).context("Failed to build DynamoDB request"))
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File not found with key: {0}")]
    NotFound(String),

    #[error("Invalid file key: {0}")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// --- Web Layer Error ---

/// The four observable failure classes of the HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    StoreUnavailable,
    InternalError,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            // The API reports every store failure as a plain 500.
            ErrorKind::StoreUnavailable | ErrorKind::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    // Request errors
    #[error("Post not found with ID: {0}")]
    PostNotFound(String),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Error processing multipart form data: {0}")]
    MultipartError(#[from] axum::extract::multipart::MultipartError),
    /// Body extractor rejection, keeping axum's status (e.g. 413 over the body limit).
    #[error("Request body rejected ({0}): {1}")]
    RequestRejected(StatusCode, String),

    // Store/storage errors
    #[error("Document store unavailable")]
    StoreUnavailable(#[source] RepoError),
    #[error("Could not complete post store operation")]
    RepositoryError(#[source] RepoError),
    #[error("Could not perform file storage operation")]
    StorageError(#[source] StorageError),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::PostNotFound(_) | AppError::FileNotFound(_) => ErrorKind::NotFound,
            AppError::InvalidInput(_)
            | AppError::MultipartError(_)
            | AppError::RequestRejected(..) => ErrorKind::InvalidInput,
            AppError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            AppError::RepositoryError(_) | AppError::StorageError(_) => ErrorKind::InternalError,
        }
    }
}

// --- Conversions from Domain Errors to AppError ---

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            e @ RepoError::Unavailable(_) => AppError::StoreUnavailable(e),
            e => AppError::RepositoryError(e),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) | StorageError::InvalidKey(key) => AppError::FileNotFound(key),
            e => AppError::StorageError(e),
        }
    }
}

// --- Axum Response Implementation ---

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::MultipartError(e) => e.status(),
            AppError::RequestRejected(status, _) => *status,
            other => other.kind().status(),
        };
        let body = match &self {
            AppError::PostNotFound(id) => {
                tracing::debug!(post_id = %id, "Responding with 404");
                "Post not found".to_string()
            }
            AppError::FileNotFound(key) => {
                tracing::debug!(file_key = %key, "Responding with 404");
                "File not found".to_string()
            }
            AppError::InvalidInput(msg) => {
                tracing::warn!(error.message = %msg, "Rejecting invalid input");
                msg.clone()
            }
            AppError::MultipartError(e) => {
                tracing::warn!(error = %e, status = %e.status(), "Rejecting multipart body");
                e.body_text()
            }
            AppError::RequestRejected(status, msg) => {
                tracing::warn!(error.message = %msg, %status, "Rejecting request body");
                msg.clone()
            }
            AppError::StoreUnavailable(e) | AppError::RepositoryError(e) => {
                tracing::error!(error.source = ?e, error.detail = %self, "Post store error occurred");
                "Server Error".to_string()
            }
            AppError::StorageError(e) => {
                tracing::error!(error.source = ?e, "Storage error occurred");
                "Server Error".to_string()
            }
        };

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_fixed_status_codes() {
        assert_eq!(ErrorKind::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::InvalidInput.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::StoreUnavailable.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ErrorKind::InternalError.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unavailable_store_is_classified_separately() {
        let err: AppError = RepoError::Unavailable(anyhow::anyhow!("connection refused")).into();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);

        let err: AppError = RepoError::DataCorruption("bad likes".into()).into();
        assert_eq!(err.kind(), ErrorKind::InternalError);
    }

    #[test]
    fn missing_or_rejected_files_are_not_found() {
        let err: AppError = StorageError::InvalidKey("../etc/passwd".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let io = std::io::Error::other("disk full");
        let err: AppError = StorageError::Io(io).into();
        assert_eq!(err.kind(), ErrorKind::InternalError);
    }

    #[test]
    fn body_rejections_keep_their_status() {
        let response =
            AppError::RequestRejected(StatusCode::PAYLOAD_TOO_LARGE, "too big".into()).into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            AppError::RequestRejected(StatusCode::UNSUPPORTED_MEDIA_TYPE, "x".into()).kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn server_errors_hide_details() {
        let response =
            AppError::RepositoryError(RepoError::DataCorruption("x".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }
}
