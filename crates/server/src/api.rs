//! HTTP surface. Every route except `/health` requires the gateway identity
//! header and runs under a freshly resolved privacy context.

use axum::{
    body::Bytes,
    extract::{Path, State},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use vitalia_agent::{AdviceRequest, AnswerSubmission, MealPlanRequest, ProgressRequest};
use vitalia_core::domain::assessment::{AssessmentId, HealthProfile};
use vitalia_core::domain::consent::{ConsentId, ConsentType};
use vitalia_core::domain::rights::DataCategory;
use vitalia_core::errors::ApplicationError;
use vitalia_core::rights::ExportFormat;

use crate::context::{request_context, require_identity, Payload, RequestPrivacy};
use crate::error::ApiError;
use crate::health;
use crate::response::{export_file, Private};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/assessment", post(start_assessment))
        .route("/assessment/{id}", get(get_assessment).delete(delete_assessment))
        .route("/assessment/{id}/answer", post(submit_answer))
        .route("/assessment/{id}/next-question", post(next_question))
        .route("/advice", post(advice))
        .route("/meal-plan", post(meal_plan))
        .route("/track-progress", post(track_progress))
        .route("/consent", get(list_consents).post(grant_consent))
        .route("/consent/revoke", post(revoke_consent))
        .route("/data", get(get_data))
        .route("/data/export", post(export_data))
        .route("/data/rectify", put(rectify_data))
        .route("/data/restrict", post(restrict_processing))
        .route("/data/delete", delete(delete_data))
        .route("/data/object", post(object_to_processing))
        .route_layer(middleware::from_fn(require_identity));

    Router::new()
        .merge(protected)
        .merge(health::routes())
        .layer(middleware::from_fn(request_context))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type ApiResult<T> = Result<T, ApiError>;

async fn start_assessment(
    State(state): State<AppState>,
    RequestPrivacy(privacy): RequestPrivacy,
    Payload(profile): Payload<HealthProfile>,
) -> ApiResult<impl IntoResponse> {
    let started = state.assessments.start(profile, &privacy).await?;
    Ok(Private::created(&privacy, started))
}

async fn submit_answer(
    State(state): State<AppState>,
    RequestPrivacy(privacy): RequestPrivacy,
    Path(id): Path<String>,
    Payload(submission): Payload<AnswerSubmission>,
) -> ApiResult<impl IntoResponse> {
    let outcome =
        state.assessments.submit_answer(&AssessmentId(id), &privacy, submission).await?;
    Ok(Private::ok(&privacy, outcome))
}

async fn next_question(
    State(state): State<AppState>,
    RequestPrivacy(privacy): RequestPrivacy,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.assessments.next_question(&AssessmentId(id), &privacy).await?;
    Ok(Private::ok(&privacy, outcome))
}

async fn get_assessment(
    State(state): State<AppState>,
    RequestPrivacy(privacy): RequestPrivacy,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let view = state.assessments.get(&AssessmentId(id), &privacy).await?;
    Ok(Private::ok(&privacy, view))
}

async fn delete_assessment(
    State(state): State<AppState>,
    RequestPrivacy(privacy): RequestPrivacy,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = AssessmentId(id);
    state.assessments.delete(&id, &privacy.owner_id, &privacy.correlation_id).await?;
    Ok(Private::ok(&privacy, json!({ "id": id.0, "deleted": true })))
}

async fn advice(
    State(state): State<AppState>,
    RequestPrivacy(privacy): RequestPrivacy,
    Payload(request): Payload<AdviceRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = state.guidance.advice(request, &privacy).await?;
    Ok(Private::ok(&privacy, response))
}

async fn meal_plan(
    State(state): State<AppState>,
    RequestPrivacy(privacy): RequestPrivacy,
    Payload(request): Payload<MealPlanRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = state.guidance.meal_plan(request, &privacy).await?;
    Ok(Private::ok(&privacy, response))
}

async fn track_progress(
    State(state): State<AppState>,
    RequestPrivacy(privacy): RequestPrivacy,
    Payload(request): Payload<ProgressRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = state.guidance.track_progress(request, &privacy).await?;
    Ok(Private::ok(&privacy, response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantConsentBody {
    #[serde(alias = "type")]
    consent_type: String,
    purpose: String,
    #[serde(default)]
    expires_in_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevokeConsentBody {
    consent_id: String,
}

async fn list_consents(
    State(state): State<AppState>,
    RequestPrivacy(privacy): RequestPrivacy,
) -> ApiResult<impl IntoResponse> {
    let consents = state.rights.list_consents(&privacy.owner_id).await?;
    Ok(Private::ok(&privacy, consents))
}

async fn grant_consent(
    State(state): State<AppState>,
    RequestPrivacy(privacy): RequestPrivacy,
    Payload(body): Payload<GrantConsentBody>,
) -> ApiResult<impl IntoResponse> {
    let consent_type = ConsentType::parse(&body.consent_type).ok_or_else(|| {
        ApiError::validation(
            "consentType",
            format!(
                "unknown consent type `{}` (expected one of {})",
                body.consent_type,
                ConsentType::ALL.map(|kind| kind.as_str()).join(", ")
            ),
        )
    })?;
    let consent = state
        .rights
        .grant_consent(
            &privacy.owner_id,
            consent_type,
            &body.purpose,
            body.expires_in_days,
            &privacy.correlation_id,
        )
        .await?;
    Ok(Private::created(&privacy, consent))
}

async fn revoke_consent(
    State(state): State<AppState>,
    RequestPrivacy(privacy): RequestPrivacy,
    Payload(body): Payload<RevokeConsentBody>,
) -> ApiResult<impl IntoResponse> {
    let consent = state
        .rights
        .revoke_consent(&privacy.owner_id, &ConsentId(body.consent_id), &privacy.correlation_id)
        .await?;
    Ok(Private::ok(&privacy, consent))
}

#[derive(Debug, Default, Deserialize)]
struct ExportBody {
    #[serde(default)]
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RectifyBody {
    field: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestrictBody {
    reason: String,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default, alias = "duration")]
    duration_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DeleteBody {
    #[serde(default)]
    categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectBody {
    reason: String,
    processing_type: String,
}

async fn get_data(
    State(state): State<AppState>,
    RequestPrivacy(privacy): RequestPrivacy,
) -> ApiResult<impl IntoResponse> {
    let aggregate = state.rights.get_user_data(&privacy.owner_id, &privacy.correlation_id).await?;
    Ok(Private::ok(&privacy, aggregate))
}

async fn export_data(
    State(state): State<AppState>,
    RequestPrivacy(privacy): RequestPrivacy,
    body: Bytes,
) -> ApiResult<Response> {
    let body: ExportBody = optional_body(&body)?;
    let format = ExportFormat::parse(body.format.as_deref().unwrap_or("json"))
        .map_err(ApplicationError::from)?;
    let export =
        state.rights.export_user_data(&privacy.owner_id, format, &privacy.correlation_id).await?;
    Ok(export_file(&privacy, export))
}

async fn rectify_data(
    State(state): State<AppState>,
    RequestPrivacy(privacy): RequestPrivacy,
    Payload(body): Payload<RectifyBody>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state
        .rights
        .rectify_field(&privacy.owner_id, &body.field, body.value, &privacy.correlation_id)
        .await?;
    Ok(Private::ok(&privacy, outcome))
}

async fn restrict_processing(
    State(state): State<AppState>,
    RequestPrivacy(privacy): RequestPrivacy,
    Payload(body): Payload<RestrictBody>,
) -> ApiResult<impl IntoResponse> {
    let categories = parse_categories(&body.categories)?;
    let outcome = state
        .rights
        .restrict_processing(
            &privacy.owner_id,
            &body.reason,
            categories,
            body.duration_days,
            &privacy.correlation_id,
        )
        .await?;
    Ok(Private::ok(&privacy, outcome))
}

async fn delete_data(
    State(state): State<AppState>,
    RequestPrivacy(privacy): RequestPrivacy,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let body: DeleteBody = optional_body(&body)?;
    let categories = parse_categories(&body.categories)?;
    let summary = state
        .rights
        .delete_user_data(&privacy.owner_id, categories, &privacy.correlation_id)
        .await?;
    Ok(Private::ok(&privacy, summary))
}

async fn object_to_processing(
    State(state): State<AppState>,
    RequestPrivacy(privacy): RequestPrivacy,
    Payload(body): Payload<ObjectBody>,
) -> ApiResult<impl IntoResponse> {
    let objection = state
        .rights
        .object_to_processing(
            &privacy.owner_id,
            &body.reason,
            &body.processing_type,
            &privacy.correlation_id,
        )
        .await?;
    Ok(Private::ok(&privacy, objection))
}

/// Bodies that may be omitted entirely fall back to their defaults.
fn optional_body<T: Default + serde::de::DeserializeOwned>(raw: &Bytes) -> ApiResult<T> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(raw).map_err(|error| ApiError::validation("body", error.to_string()))
}

fn parse_categories(raw: &[String]) -> ApiResult<Vec<DataCategory>> {
    raw.iter()
        .map(|category| {
            DataCategory::parse(category).ok_or_else(|| {
                ApiError::validation("categories", format!("unknown data category `{category}`"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::test_support::{test_state, test_state_with, CountingResponder};

    use super::router;

    const OWNER: &str = "user-42";

    fn request(method: Method, uri: &str, body: Option<Value>) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(uri).header("x-authenticated-user", OWNER);
        if body.is_some() {
            builder.header(header::CONTENT_TYPE, "application/json")
        } else {
            builder
        }
    }

    async fn send(
        app: &Router,
        builder: axum::http::request::Builder,
        body: Option<Value>,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let body = body.map(|value| Body::from(value.to_string())).unwrap_or_else(Body::empty);
        let response =
            app.clone().oneshot(builder.body(body).expect("request")).await.expect("response");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, json)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, _, json) = send(app, request(method, uri, body.clone()), body).await;
        (status, json)
    }

    async fn grant(app: &Router, consent_type: &str) -> String {
        let (status, body) = call(
            app,
            Method::POST,
            "/consent",
            Some(json!({ "consentType": consent_type, "purpose": "nutrition coaching" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().expect("consent id").to_string()
    }

    fn profile() -> Value {
        json!({
            "age": 34,
            "weight": 82.0,
            "height": 178.0,
            "gender": "female",
            "activityLevel": "moderate",
            "goals": ["weight_loss"],
            "allergies": ["peanuts"]
        })
    }

    #[tokio::test]
    async fn protected_routes_require_an_identity() {
        let app = router(test_state().await);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/advice")
                    .header("x-correlation-id", "corr-123")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "question": "hydration?" }).to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["x-correlation-id"], "corr-123");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["code"], "UNAUTHENTICATED");
        assert_eq!(body["path"], "/advice");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = router(test_state().await);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-correlation-id"));
    }

    #[tokio::test]
    async fn health_operations_without_consent_never_reach_a_provider() {
        let provider = Arc::new(CountingResponder::default());
        let app = router(test_state_with(provider.clone()).await);

        let (status, body) = call(&app, Method::POST, "/assessment", Some(profile())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "HEALTH_CONSENT_REQUIRED");
        assert_eq!(body["path"], "/assessment");

        let (status, body) = call(
            &app,
            Method::POST,
            "/advice",
            Some(json!({ "question": "How much water should I drink?" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "HEALTH_CONSENT_REQUIRED");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn assessment_lifecycle_over_http_carries_transparency_metadata() {
        let provider = Arc::new(CountingResponder::default());
        let app = router(test_state_with(provider.clone()).await);
        let token = grant(&app, "health_data_processing").await;
        grant(&app, "ai_analysis").await;

        let body = Some(profile());
        let (status, headers, started) = send(
            &app,
            request(Method::POST, "/assessment", body.clone()).header("x-consent-token", &token),
            body,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{started}");
        assert_eq!(started["data"]["firstQuestion"]["questionId"], "q1");
        assert_eq!(started["data"]["progress"], 0);
        assert_eq!(started["privacy"]["consentValid"], true);
        assert_eq!(started["privacy"]["anonymization"], "medium");
        assert_eq!(headers["x-anonymization"], "medium");
        assert!(headers.contains_key("x-data-retention-until"));
        let retention_days = started["privacy"]["dataRetentionDays"].as_u64().expect("days");
        assert_eq!(headers["x-data-retention-days"], retention_days.to_string().as_str());

        let id = started["data"]["id"].as_str().expect("id").to_string();
        let answer = Some(json!({ "questionId": "q1", "answer": "Two meals a day", "confidence": 0.8 }));
        let (status, _, outcome) = send(
            &app,
            request(Method::POST, &format!("/assessment/{id}/answer"), answer.clone())
                .header("x-consent-token", &token),
            answer,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{outcome}");
        assert_eq!(outcome["data"]["nextQuestion"]["questionId"], "q2");

        let (status, view) = call(&app, Method::GET, &format!("/assessment/{id}"), None).await;
        assert_eq!(status, StatusCode::OK, "{view}");
        assert_eq!(view["data"]["answers"].as_array().map(Vec::len), Some(1));
        assert!(view["data"].get("rawHealthData").is_none());
        assert_eq!(provider.calls(), 2);

        let (status, _) = call(&app, Method::DELETE, &format!("/assessment/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&app, Method::GET, &format!("/assessment/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn unknown_anonymization_level_is_a_validation_error() {
        let app = router(test_state().await);

        let (status, _, body) = send(
            &app,
            request(Method::GET, "/consent", None).header("x-anonymization-level", "extreme"),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn malformed_bodies_use_the_error_envelope() {
        let app = router(test_state().await);

        let (status, body) =
            call(&app, Method::POST, "/consent", Some(json!({ "purpose": 12 }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["path"], "/consent");
    }

    #[tokio::test]
    async fn data_rights_routes_cover_access_export_and_erasure() {
        let app = router(test_state().await);

        let (status, body) = call(&app, Method::GET, "/data", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{body}");

        let (status, body) = call(
            &app,
            Method::PUT,
            "/data/rectify",
            Some(json!({ "field": "email", "value": "subject@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["field"], "email");

        let (status, body) = call(&app, Method::GET, "/data", None).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["rectifications"].as_array().map(Vec::len), Some(1));

        let export = json!({ "format": "csv" });
        let response = app
            .clone()
            .oneshot(
                request(Method::POST, "/data/export", Some(export.clone()))
                    .body(Body::from(export.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .expect("content type")
            .starts_with("text/csv"));
        assert!(response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .expect("disposition")
            .contains(".csv"));

        let (status, body) = call(
            &app,
            Method::POST,
            "/data/restrict",
            Some(json!({ "reason": "accuracy contested", "categories": ["health"], "durationDays": 30 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        let (status, body) = call(
            &app,
            Method::POST,
            "/data/object",
            Some(json!({ "reason": "no profiling", "processingType": "ai_analysis" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["processingType"], "ai_analysis");

        let (status, body) = call(&app, Method::DELETE, "/data/delete", None).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert!(body["data"]["deletedRecords"].as_u64().unwrap_or(0) >= 3);

        let (status, body) = call(&app, Method::DELETE, "/data/delete", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["path"], "/data/delete");
    }

    #[tokio::test]
    async fn consents_can_be_listed_and_revoked() {
        let app = router(test_state().await);
        let id = grant(&app, "health_data_processing").await;

        let (status, body) =
            call(&app, Method::POST, "/consent/revoke", Some(json!({ "consentId": id }))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["granted"], false);

        let (status, body) = call(&app, Method::GET, "/consent", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

        let (status, body) = call(
            &app,
            Method::POST,
            "/consent",
            Some(json!({ "consentType": "telepathy", "purpose": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"]["field"], "consentType");
    }
}
