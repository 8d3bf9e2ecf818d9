//! Mapping of engine errors onto HTTP responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sdesync_core::SdeError;

/// Engine-wide failure returned by a handler
///
/// Per-item problems never get here: they travel inside a 200 report.
#[derive(Debug)]
pub struct ApiError(pub SdeError);

impl From<SdeError> for ApiError {
    fn from(error: SdeError) -> Self {
        Self(error)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            SdeError::ProjectNotFound { .. }
            | SdeError::FileNotFound { .. }
            | SdeError::FactNotFound { .. } => StatusCode::NOT_FOUND,
            SdeError::InvalidPath { .. }
            | SdeError::InvalidConfig { .. }
            | SdeError::UnknownStatus { .. } => StatusCode::BAD_REQUEST,
            SdeError::JsonParse { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SdeError::CacheBusy { .. } | SdeError::Cancelled { .. } => StatusCode::CONFLICT,
            SdeError::BackupRequired { .. } => StatusCode::PRECONDITION_FAILED,
            SdeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            SdeError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            SdeError::FileRead { .. } | SdeError::FileWrite { .. } | SdeError::Serialize { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, "Request rejected");
        }

        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "retryable": self.0.is_retryable(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_conflicts_and_timeouts() {
        let busy = ApiError(SdeError::CacheBusy {
            project_id: "p".into(),
            reason: "bulk sync".into(),
        });
        let timeout = ApiError(SdeError::Timeout {
            operation: "bulk lookup".into(),
            timeout_secs: 30,
        });
        assert_eq!(busy.status(), StatusCode::CONFLICT);
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_missing_backup_is_precondition() {
        let err = ApiError(SdeError::BackupRequired {
            project_id: "p".into(),
        });
        assert_eq!(err.status(), StatusCode::PRECONDITION_FAILED);
    }
}
