//! Error kinds surfaced by the pipeline manager and their HTTP rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

use crate::metrics;
use crate::quality_gate::QualityGateError;
use crate::scm::ScmError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    ContentNotFound(String),

    #[error("no permission to create webhook for pipeline {0}, grant webhook permission to the SCM account")]
    CreateWebhookPermissionDenied(String),

    #[error("{0} is not implemented")]
    NotImplemented(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scm(ScmError),

    #[error(transparent)]
    QualityGate(#[from] QualityGateError),
}

pub type Result<T> = std::result::Result<T, ManagerError>;

impl ManagerError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ManagerError::ValidationFailed {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable reason used in API responses.
    pub fn reason(&self) -> &'static str {
        match self {
            ManagerError::ValidationFailed { .. } => "ValidationFailed",
            ManagerError::AlreadyExists(_) => "AlreadyExists",
            ManagerError::ContentNotFound(_) => "ContentNotFound",
            ManagerError::CreateWebhookPermissionDenied(_) => "CreateWebhookPermissionDenied",
            ManagerError::NotImplemented(_) => "NotImplemented",
            ManagerError::Store(_) => "StoreError",
            ManagerError::Scm(_) => "ScmError",
            ManagerError::QualityGate(_) => "QualityGateError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ManagerError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
            ManagerError::AlreadyExists(_) => StatusCode::CONFLICT,
            ManagerError::ContentNotFound(_) => StatusCode::NOT_FOUND,
            ManagerError::CreateWebhookPermissionDenied(_) => StatusCode::FORBIDDEN,
            ManagerError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ManagerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ManagerError::Scm(_) | ManagerError::QualityGate(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<ScmError> for ManagerError {
    fn from(err: ScmError) -> Self {
        match err {
            ScmError::NotImplemented(what) => ManagerError::NotImplemented(what),
            other => ManagerError::Scm(other),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    reason: &'static str,
    message: String,
}

impl IntoResponse for ManagerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            metrics::error_recorded(self.reason());
        }
        let body = ErrorBody {
            reason: self.reason(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
