//! # Error Handling and Response Types
//!
//! Every handler returns [`AppResult`]. Failures from the engine arrive as
//! [`RegistryError`] and are classified here:
//!
//! - **Validation Errors** (400): bad identities, malformed ranges, and
//!   uploads rejected at the extract, manifest, or validate stage
//! - **Not Found** (404): unknown packages or versions, and ranges nothing
//!   satisfies
//! - **Upload Errors** (413): oversized bodies
//! - **Internal Errors** (500): placement, checksum, and filesystem failures
//!
//! Errors render as
//!
//! ```json
//! {
//!   "error": "ingestion of /data/temp/upload-….tgz failed at validate stage: …",
//!   "code": "validation_error",
//!   "stage": "validate",
//!   "details": null,
//!   "timestamp": "2024-01-01T12:00:00Z"
//! }
//! ```
//!
//! npm client routes wrap errors in [`NpmError`], which renders not-found
//! conditions the way the npm registry does.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use pkgd_core::{RegistryError, Stage};
use serde::Serialize;
use serde_json::{json, Value};

/// Standardized error response structure for consistent API error handling
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub error: String,
    pub code: String,
    /// Ingestion stage that failed, for upload errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub details: Option<Value>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    UploadError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::NotFound => "not_found",
            ErrorCode::UploadError => "upload_error",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::UploadError => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    UploadError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::Registry(e) => registry_error_code(e),
            AppError::BadRequest(_) | AppError::Json(_) => ErrorCode::ValidationError,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::UploadError(_) => ErrorCode::UploadError,
            AppError::InternalError(_) => ErrorCode::InternalError,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            AppError::Registry(RegistryError::Ingestion(e)) => Some(e.stage),
            _ => None,
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::Registry(RegistryError::Ingestion(e)) => {
                Some(json!({ "artifact": e.artifact.display().to_string() }))
            }
            AppError::Registry(RegistryError::NotSatisfied { name, constraint }) => {
                Some(json!({ "package": name, "constraint": constraint }))
            }
            _ => None,
        }
    }

    pub fn to_error_response(&self) -> ApiErrorResponse {
        ApiErrorResponse {
            error: self.to_string(),
            code: self.error_code().as_str().to_string(),
            stage: self.stage(),
            details: self.details(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

fn registry_error_code(err: &RegistryError) -> ErrorCode {
    match err {
        RegistryError::PackageNotFound { .. }
        | RegistryError::VersionNotFound { .. }
        | RegistryError::ArtifactMissing { .. }
        | RegistryError::NotSatisfied { .. } => ErrorCode::NotFound,
        RegistryError::Ingestion(e) => match e.stage {
            Stage::Extract | Stage::Manifest | Stage::Validate => ErrorCode::ValidationError,
            Stage::Place | Stage::Checksum => ErrorCode::InternalError,
        },
        RegistryError::InvalidRange(_)
        | RegistryError::InvalidInput(_)
        | RegistryError::InvalidUpload(_)
        | RegistryError::Base64(_)
        | RegistryError::Json(_) => ErrorCode::ValidationError,
        RegistryError::Unlink { .. } | RegistryError::Config(_) | RegistryError::Io(_) => {
            ErrorCode::InternalError
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        if code == ErrorCode::InternalError {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, code = code.as_str(), "Request rejected");
        }

        let error_response = self.to_error_response();
        (code.http_status(), Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Error wrapper for npm client routes.
#[derive(Debug)]
pub struct NpmError(pub AppError);

impl From<AppError> for NpmError {
    fn from(err: AppError) -> Self {
        NpmError(err)
    }
}

impl From<RegistryError> for NpmError {
    fn from(err: RegistryError) -> Self {
        NpmError(AppError::Registry(err))
    }
}

impl IntoResponse for NpmError {
    fn into_response(self) -> Response {
        if self.0.error_code() == ErrorCode::NotFound {
            tracing::debug!(error = %self.0, "npm document not found");
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "not_found", "reason": "document not found" })),
            )
                .into_response();
        }
        self.0.into_response()
    }
}

pub type NpmResult<T> = Result<T, NpmError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pkgd_core::error::{IngestionError, PlacementError, ValidationError};
    use std::path::{Path, PathBuf};

    fn ingestion(kind: impl Into<pkgd_core::error::IngestionErrorKind>) -> AppError {
        AppError::Registry(RegistryError::Ingestion(IngestionError::new(
            Path::new("/data/temp/upload.tgz"),
            kind,
        )))
    }

    #[test]
    fn test_stage_mapping() {
        let mismatch = ingestion(ValidationError::Mismatch {
            expected_name: "a".into(),
            expected_version: "1.0.0".into(),
            name: "b".into(),
            version: "2.0.0".into(),
        });
        assert_eq!(mismatch.error_code(), ErrorCode::ValidationError);
        assert_eq!(mismatch.stage(), Some(Stage::Validate));

        let placement = ingestion(PlacementError::CreateDir {
            path: PathBuf::from("/data/packages"),
            source: std::io::Error::other("disk full"),
        });
        assert_eq!(placement.error_code(), ErrorCode::InternalError);
        assert_eq!(placement.error_code().http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_not_found_mapping() {
        let err = AppError::from(RegistryError::NotSatisfied {
            name: "a".into(),
            constraint: ">2.0.0".into(),
        });
        assert_eq!(err.error_code(), ErrorCode::NotFound);
        assert_eq!(err.details(), Some(json!({"package": "a", "constraint": ">2.0.0"})));
    }

    #[test]
    fn test_error_response_format() {
        let response = AppError::BadRequest("bad".to_string()).to_error_response();
        assert_eq!(response.code, "validation_error");
        assert_eq!(response.error, "bad");
        assert!(response.stage.is_none());
        assert!(chrono::DateTime::parse_from_rfc3339(&response.timestamp).is_ok());
    }
}
