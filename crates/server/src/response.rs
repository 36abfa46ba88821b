use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use vitalia_core::privacy::{PrivacyContext, TransparencyMetadata};
use vitalia_core::rights::ExportedData;

const RETENTION_DAYS_HEADER: &str = "x-data-retention-days";
const RETENTION_UNTIL_HEADER: &str = "x-data-retention-until";
const ANONYMIZATION_HEADER: &str = "x-anonymization";

#[derive(Serialize)]
struct Body<T> {
    data: T,
    privacy: TransparencyMetadata,
}

/// Successful response: `{data, privacy}` plus the transparency headers.
pub struct Private<T> {
    status: StatusCode,
    data: T,
    headers: HeaderMap,
    privacy: TransparencyMetadata,
}

impl<T: Serialize> Private<T> {
    pub fn ok(context: &PrivacyContext, data: T) -> Self {
        Self::with_status(StatusCode::OK, context, data)
    }

    pub fn created(context: &PrivacyContext, data: T) -> Self {
        Self::with_status(StatusCode::CREATED, context, data)
    }

    fn with_status(status: StatusCode, context: &PrivacyContext, data: T) -> Self {
        let privacy = context.transparency();
        Self { status, data, headers: transparency_headers(context, &privacy), privacy }
    }
}

impl<T: Serialize> IntoResponse for Private<T> {
    fn into_response(self) -> Response {
        let body = Body { data: self.data, privacy: self.privacy };
        (self.status, self.headers, Json(body)).into_response()
    }
}

/// Raw export file with the same transparency headers.
pub fn export_file(context: &PrivacyContext, export: ExportedData) -> Response {
    let mut headers = transparency_headers(context, &context.transparency());
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(export.content_type));
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", export.file_name))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    (StatusCode::OK, headers, export.body).into_response()
}

fn transparency_headers(context: &PrivacyContext, privacy: &TransparencyMetadata) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let values = [
        (RETENTION_DAYS_HEADER, privacy.data_retention_days.to_string()),
        (RETENTION_UNTIL_HEADER, context.retention_until().to_rfc3339()),
        (ANONYMIZATION_HEADER, privacy.anonymization.clone()),
    ];
    for (name, value) in values {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    headers
}
