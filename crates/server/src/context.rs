//! Per-request plumbing: correlation ids, the authenticated identity placed
//! by the upstream gateway, and the privacy context every protected handler
//! runs under.

use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::{request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
    Json,
};
use serde::de::DeserializeOwned;
use tracing::{error, warn};
use uuid::Uuid;

use vitalia_core::domain::assessment::OwnerId;
use vitalia_core::privacy::{AnonymizationLevel, PrivacyContext, RequestMetadata};

use crate::error::{ApiError, ErrorReport};
use crate::state::AppState;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
pub const AUTHENTICATED_USER_HEADER: &str = "x-authenticated-user";
pub const CONSENT_TOKEN_HEADER: &str = "x-consent-token";
pub const ANONYMIZATION_LEVEL_HEADER: &str = "x-anonymization-level";
pub const AUTHORIZE_RAW_DATA_HEADER: &str = "x-authorize-raw-data";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationId(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub owner_id: OwnerId,
}

/// Outermost layer. Assigns the correlation id, echoes it back and turns
/// any [`ErrorReport`] into the final envelope with the request path.
pub async fn request_context(mut request: Request, next: Next) -> Response {
    let correlation_id = header(request.headers(), CORRELATION_ID_HEADER)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let path = request.uri().path().to_owned();
    request.extensions_mut().insert(CorrelationId(correlation_id.clone()));

    let mut response = next.run(request).await;
    if let Some(report) = response.extensions_mut().remove::<ErrorReport>() {
        let status = response.status();
        if status.is_server_error() {
            error!(
                event_name = "http.request.failed",
                correlation_id = %correlation_id,
                path = %path,
                status = status.as_u16(),
                code = %report.envelope.code,
                error = %report.internal,
                "request failed"
            );
        } else {
            warn!(
                event_name = "http.request.rejected",
                correlation_id = %correlation_id,
                path = %path,
                status = status.as_u16(),
                code = %report.envelope.code,
                "request rejected"
            );
        }
        response = report.into_response(status, path);
    }

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

/// Protected routes only. Identity comes from the gateway header.
pub async fn require_identity(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let Some(owner) = header(request.headers(), AUTHENTICATED_USER_HEADER) else {
        return Err(ApiError::unauthenticated());
    };
    request.extensions_mut().insert(Identity { owner_id: OwnerId(owner) });
    Ok(next.run(request).await)
}

/// Resolved privacy context for the calling subject.
pub struct RequestPrivacy(pub PrivacyContext);

impl FromRequestParts<AppState> for RequestPrivacy {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity =
            parts.extensions.get::<Identity>().cloned().ok_or_else(ApiError::unauthenticated)?;
        let correlation_id = parts
            .extensions
            .get::<CorrelationId>()
            .map(|id| id.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let requested_level = match header(&parts.headers, ANONYMIZATION_LEVEL_HEADER) {
            Some(raw) => Some(
                raw.parse::<AnonymizationLevel>()
                    .map_err(|message| ApiError::validation(ANONYMIZATION_LEVEL_HEADER, message))?,
            ),
            None => None,
        };

        let metadata = RequestMetadata {
            correlation_id,
            consent_token: header(&parts.headers, CONSENT_TOKEN_HEADER),
            caller_ip: header(&parts.headers, FORWARDED_FOR_HEADER)
                .and_then(|value| value.split(',').next().map(|ip| ip.trim().to_owned())),
            user_agent: header(&parts.headers, "user-agent"),
            requested_level,
            authorize_raw_data: header(&parts.headers, AUTHORIZE_RAW_DATA_HEADER)
                .is_some_and(|value| value.eq_ignore_ascii_case("true")),
        };

        let context = state.resolver.resolve(&identity.owner_id, metadata).await?;
        Ok(Self(context))
    }
}

/// JSON body whose rejections use the standard error envelope.
pub struct Payload<T>(pub T);

impl<T, S> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(request, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(|rejection| ApiError::validation("body", rejection.body_text()))
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}
