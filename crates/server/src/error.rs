use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use vitalia_core::errors::{ApplicationError, DomainError, InterfaceError};

/// Handler-level error. Rendered once here without the request path; the
/// request-context middleware completes the envelope on the way out.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    pub fn unauthenticated() -> Self {
        Self(InterfaceError::unauthenticated("unassigned"))
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        ApplicationError::from(DomainError::validation(field, message)).into()
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        Self(error.into())
    }
}

impl From<InterfaceError> for ApiError {
    fn from(error: InterfaceError) -> Self {
        Self(error)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub code: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Left in the response extensions for the request-context layer.
#[derive(Clone, Debug)]
pub(crate) struct ErrorReport {
    pub envelope: ErrorEnvelope,
    pub internal: String,
}

impl ErrorReport {
    pub fn into_response(mut self, status: StatusCode, path: String) -> Response {
        self.envelope.path = Some(path);
        (status, Json(self.envelope)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let envelope = ErrorEnvelope {
            error: self.0.user_message(),
            code: self.0.code().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            path: None,
            details: self.0.details().cloned(),
        };
        let mut response = (status, Json(envelope.clone())).into_response();
        response.extensions_mut().insert(ErrorReport { envelope, internal: self.0.to_string() });
        response
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};
    use vitalia_core::errors::{ApplicationError, ConsentError};

    use super::{ApiError, ErrorReport};

    #[test]
    fn consent_errors_map_to_forbidden_with_a_report() {
        let error: ApiError = ApplicationError::from(ConsentError::HealthConsentRequired).into();
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let report = response.extensions().get::<ErrorReport>().expect("report");
        assert_eq!(report.envelope.code, "HEALTH_CONSENT_REQUIRED");
        assert!(report.envelope.path.is_none());
    }

    #[test]
    fn validation_errors_keep_the_offending_field() {
        let response = ApiError::validation("answer", "is required").into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let report = response.extensions().get::<ErrorReport>().expect("report");
        assert_eq!(report.envelope.code, "VALIDATION_ERROR");
        assert!(report.envelope.details.is_some());
    }

    #[test]
    fn persistence_errors_hide_internal_detail() {
        let error: ApiError = ApplicationError::Persistence("disk I/O error at page 7".into()).into();
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let report = response.extensions().get::<ErrorReport>().expect("report");
        assert!(!report.envelope.error.contains("page 7"));
        assert!(report.internal.contains("page 7"));
    }
}
