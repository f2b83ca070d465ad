//! HTTP error type for the agent API
//!
//! Every failure renders as
//! `{"error": {"code", "message", "retryable", "timestamp", "details"?}}`.
//! `details` carries internal context and is only emitted by debug builds.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::automation::AutomationError;
use crate::models::{InvalidStatus, ProfileValidationError, TransitionError};
use crate::services::ingestion::IngestionError;
use crate::services::resume_structurer::StructureError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// 404
    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    /// 400
    #[error("{message}")]
    BadRequest { code: &'static str, message: String },

    /// 409
    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    /// 503, a capability the agent was started without
    #[error("{message}")]
    Unavailable { code: &'static str, message: String },

    /// Resource or upstream fault
    #[error("{message}")]
    Failed {
        status: StatusCode,
        code: &'static str,
        message: String,
        retryable: bool,
        details: Option<String>,
    },

    #[error("Common error: {0}")]
    Common(#[from] hjf_common::Error),
}

impl ApiError {
    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::NotFound { code, message: message.into() }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest { code, message: message.into() }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound { code, .. }
            | ApiError::BadRequest { code, .. }
            | ApiError::Conflict { code, .. }
            | ApiError::Unavailable { code, .. }
            | ApiError::Failed { code, .. } => code,
            ApiError::Common(_) => "DATABASE_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Failed { status, .. } => *status,
            ApiError::Common(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn retryable(&self) -> bool {
        match self {
            ApiError::NotFound { .. } | ApiError::BadRequest { .. } => false,
            ApiError::Conflict { .. } | ApiError::Unavailable { .. } => false,
            ApiError::Failed { retryable, .. } => *retryable,
            ApiError::Common(_) => true,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            ApiError::Failed { details, .. } => details.clone(),
            ApiError::Common(e) => Some(e.to_string()),
            _ => None,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Common(_) => "Database operation failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
        }

        let mut body = json!({
            "code": self.code(),
            "message": self.message(),
            "retryable": self.retryable(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        if cfg!(debug_assertions) {
            if let Some(details) = self.details() {
                body["details"] = json!(details);
            }
        }

        (status, Json(json!({ "error": body }))).into_response()
    }
}

impl From<TransitionError> for ApiError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::Invalid { .. } => ApiError::BadRequest {
                code: e.code(),
                message: e.to_string(),
            },
            TransitionError::NotFound(_) => ApiError::NotFound {
                code: e.code(),
                message: e.to_string(),
            },
            TransitionError::Storage(inner) => ApiError::Common(inner),
        }
    }
}

impl From<InvalidStatus> for ApiError {
    fn from(e: InvalidStatus) -> Self {
        ApiError::bad_request("INVALID_STATUS", e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::bad_request("INVALID_REQUEST_BODY", e.body_text())
    }
}

impl From<ProfileValidationError> for ApiError {
    fn from(e: ProfileValidationError) -> Self {
        ApiError::bad_request(e.code(), e.to_string())
    }
}

impl From<IngestionError> for ApiError {
    fn from(e: IngestionError) -> Self {
        ApiError::Conflict {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

impl From<AutomationError> for ApiError {
    fn from(e: AutomationError) -> Self {
        let code = e.code();
        let message = e.to_string();
        match e {
            AutomationError::JobNotFound(_)
            | AutomationError::SessionNotFound(_)
            | AutomationError::ProfileNotFound => ApiError::NotFound { code, message },
            AutomationError::InvalidJobStatus { .. } => ApiError::BadRequest { code, message },
            AutomationError::SessionAlreadyActive(_) | AutomationError::InvalidSessionState { .. } => {
                ApiError::Conflict { code, message }
            }
            AutomationError::Transition(inner) => ApiError::from(inner),
            AutomationError::Storage(inner) => ApiError::Common(inner),
            other => {
                let status = match other {
                    AutomationError::Navigation(_) => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                ApiError::Failed {
                    status,
                    code,
                    retryable: other.is_retryable(),
                    details: Some(format!("{:?}", other)),
                    message,
                }
            }
        }
    }
}

impl From<StructureError> for ApiError {
    fn from(e: StructureError) -> Self {
        let retryable = match &e {
            StructureError::Oracle(inner) => !inner.is_authentication(),
            _ => true,
        };
        ApiError::Failed {
            status: StatusCode::BAD_GATEWAY,
            code: "STRUCTURE_FAILED",
            message: "Failed to structure resume".to_string(),
            retryable,
            details: Some(e.to_string()),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
