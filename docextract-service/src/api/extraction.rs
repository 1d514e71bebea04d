//! Document extraction endpoints.
//!
//! Uploads are held in memory only and handed to the extraction service,
//! which erases them once processing ends.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::HeaderMap,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::error::{ServiceError, ServiceResult};
use crate::extraction::{DocumentType, ExtractionJob, SensitiveBuffer};

use super::AppState;

/// Identity header set by the authenticating gateway
const USER_ID_HEADER: &str = "x-user-id";

/// Start an extraction job.
///
/// Multipart fields: `file`, `document_type` (one of the document type tags)
/// and `consent_timestamp` (RFC 3339).
pub async fn extract_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ServiceResult<Json<ExtractionJob>> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| invalid_request("Missing X-User-ID header"))?
        .to_string();

    let mut file: Option<SensitiveBuffer> = None;
    let mut document_type: Option<String> = None;
    let mut consent_timestamp: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| invalid_request("File too large or invalid multipart form"))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|_| invalid_request("File too large or invalid multipart form"))?;
                file = Some(into_sensitive(data));
            }
            "document_type" => {
                document_type = Some(field.text().await.map_err(|e| ServiceError::InvalidRequest {
                    message: e.to_string(),
                })?);
            }
            "consent_timestamp" => {
                consent_timestamp =
                    Some(field.text().await.map_err(|e| ServiceError::InvalidRequest {
                        message: e.to_string(),
                    })?);
            }
            _ => {}
        }
    }

    let doc_type = document_type
        .as_deref()
        .and_then(|tag| DocumentType::from_str(tag.trim()).ok())
        .ok_or_else(|| {
            invalid_request(
                "Invalid document_type. Must be one of: personalausweis, reisepass, fuehrerschein, lebenslauf",
            )
        })?;

    let consent_timestamp = consent_timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts.trim()).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .ok_or_else(|| invalid_request("Invalid consent_timestamp. Must be RFC3339 format."))?;

    let file = file.ok_or_else(|| invalid_request("Missing file in request"))?;

    let job = state
        .service
        .start_extraction(file, doc_type, consent_timestamp, user_id);

    info!(
        job_id = %job.job_id,
        doc_type = %doc_type,
        status = job.status.as_str(),
        "Extraction job accepted"
    );

    Ok(Json(job))
}

/// Poll an extraction job
pub async fn get_result_handler(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ServiceResult<Json<ExtractionJob>> {
    state
        .service
        .get_job(&job_id)
        .map(Json)
        .ok_or(ServiceError::JobNotFound { job_id })
}

fn into_sensitive(data: Bytes) -> SensitiveBuffer {
    SensitiveBuffer::from(Vec::from(data))
}

fn invalid_request(message: &str) -> ServiceError {
    ServiceError::InvalidRequest {
        message: message.to_string(),
    }
}
