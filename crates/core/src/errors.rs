use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::consent::ConsentType;
use crate::domain::rights::DataCategory;
use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },
    #[error("question {question_id} has already been answered")]
    DuplicateAnswer { question_id: String },
    #[error("question {question_id} is not the pending question")]
    UnexpectedQuestion { question_id: String, pending: Option<String> },
    #[error("{resource} not found")]
    NotFound { resource: String },
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConsentError {
    #[error("an active health data consent token is required")]
    HealthConsentRequired,
    #[error("missing consents: {}", join_types(.missing))]
    MissingConsents { missing: Vec<ConsentType> },
    #[error("processing is restricted for {categories:?}")]
    ProcessingRestricted { categories: Vec<DataCategory> },
}

fn join_types(types: &[ConsentType]) -> String {
    types.iter().map(ConsentType::as_str).collect::<Vec<_>>().join(", ")
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PrivacyError {
    #[error("anonymization failed: {0}")]
    AnonymizationFailed(String),
    #[error("minimization failed: {0}")]
    MinimizationFailed(String),
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Consent(#[from] ConsentError),
    #[error(transparent)]
    Privacy(#[from] PrivacyError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("encryption failure: {0}")]
    Crypto(String),
    #[error("inference provider failure: {0}")]
    Provider(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// Transport-neutral error carrying the stable wire `code` and HTTP status.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { code: &'static str, message: String, details: Option<Value>, correlation_id: String },
    #[error("unauthenticated: {message}")]
    Unauthenticated { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { code: &'static str, message: String, details: Option<Value>, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("unprocessable: {message}")]
    Unprocessable { code: &'static str, message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { code: &'static str, message: String, correlation_id: String },
}

const UNASSIGNED: &str = "unassigned";

impl InterfaceError {
    pub fn unauthenticated(correlation_id: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: "missing authenticated identity".to_owned(),
            correlation_id: correlation_id.into(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Unauthenticated { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Unprocessable { .. } => 422,
            Self::ServiceUnavailable { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { code, .. }
            | Self::Forbidden { code, .. }
            | Self::Unprocessable { code, .. }
            | Self::Internal { code, .. } => code,
            Self::Unauthenticated { .. } => "UNAUTHENTICATED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ServiceUnavailable { .. } => "PROVIDER_UNAVAILABLE",
        }
    }

    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::BadRequest { details, .. } | Self::Forbidden { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthenticated { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Unprocessable { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    /// Text safe to return to callers. Internal failures never echo their cause.
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. } => message.clone(),
            Self::Unauthenticated { .. } => "Authentication is required.".to_owned(),
            Self::Unprocessable { .. } => {
                "The payload could not be anonymized and was not processed.".to_owned()
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly.".to_owned()
            }
            Self::Internal { .. } => "An unexpected internal error occurred.".to_owned(),
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unauthenticated { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Unprocessable { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = UNASSIGNED.to_owned();
        match value {
            ApplicationError::Domain(DomainError::Validation { field, message }) => {
                Self::BadRequest {
                    code: "VALIDATION_ERROR",
                    message: format!("invalid {field}: {message}"),
                    details: Some(json!({ "field": field })),
                    correlation_id,
                }
            }
            ApplicationError::Domain(DomainError::DuplicateAnswer { question_id }) => {
                Self::BadRequest {
                    code: "DUPLICATE_ANSWER",
                    message: format!("question {question_id} has already been answered"),
                    details: Some(json!({ "field": "questionId", "questionId": question_id })),
                    correlation_id,
                }
            }
            ApplicationError::Domain(DomainError::UnexpectedQuestion { question_id, pending }) => {
                let message = match &pending {
                    Some(pending) => format!("question {question_id} is not pending; answer {pending}"),
                    None => format!(
                        "question {question_id} is not pending; request the next question first"
                    ),
                };
                Self::BadRequest {
                    code: "UNEXPECTED_QUESTION",
                    message,
                    details: Some(json!({
                        "field": "questionId",
                        "questionId": question_id,
                        "pendingQuestionId": pending,
                    })),
                    correlation_id,
                }
            }
            ApplicationError::Domain(DomainError::FlowTransition(error)) => Self::BadRequest {
                code: "INVALID_TRANSITION",
                message: error.to_string(),
                details: None,
                correlation_id,
            },
            ApplicationError::Domain(DomainError::NotFound { resource }) => {
                Self::NotFound { message: format!("{resource} not found"), correlation_id }
            }
            ApplicationError::Consent(ConsentError::HealthConsentRequired) => Self::Forbidden {
                code: "HEALTH_CONSENT_REQUIRED",
                message: "A valid health data consent is required for this operation.".to_owned(),
                details: None,
                correlation_id,
            },
            ApplicationError::Consent(ConsentError::MissingConsents { missing }) => {
                let names: Vec<&str> = missing.iter().map(ConsentType::as_str).collect();
                Self::Forbidden {
                    code: "MISSING_CONSENTS",
                    message: format!("Missing required consents: {}", names.join(", ")),
                    details: Some(json!({ "missingConsents": names })),
                    correlation_id,
                }
            }
            ApplicationError::Consent(ConsentError::ProcessingRestricted { categories }) => {
                let names: Vec<&str> = categories.iter().map(DataCategory::as_str).collect();
                Self::Forbidden {
                    code: "PROCESSING_RESTRICTED",
                    message: "Processing of this data is currently restricted.".to_owned(),
                    details: Some(json!({ "categories": names })),
                    correlation_id,
                }
            }
            ApplicationError::Privacy(error) => Self::Unprocessable {
                code: "ANONYMIZATION_FAILED",
                message: error.to_string(),
                correlation_id,
            },
            ApplicationError::Persistence(message) | ApplicationError::Crypto(message) => {
                Self::Internal { code: "PERSISTENCE_ERROR", message, correlation_id }
            }
            ApplicationError::Provider(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { code: "INTERNAL_ERROR", message, correlation_id }
            }
        }
    }
}
