//! Remote vision-model (VLM) processor.
//!
//! Sends document photos to the vision service and maps its response into
//! an [`ExtractionResult`]. Anything that isn't a JPEG or PNG is rejected
//! before a request is made, which lets MRZ text uploads fall through to the
//! MRZ parser.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};

use super::DocumentProcessor;
use crate::config::VisionConfig;
use crate::error::ProcessorError;
use crate::extraction::types::{DocumentType, ExtractionField, ExtractionResult};

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47];

const EXTRACT_PATH: &str = "/api/v1/extract";
const HEALTH_PATH: &str = "/health";

/// Vision service client
pub struct VisionProcessor {
    client: Client,
    base_url: String,
}

impl VisionProcessor {
    /// Create a client for the configured vision service
    pub fn new(config: &VisionConfig) -> Result<Self, ProcessorError> {
        Self::with_timeout(&config.base_url, config.request_timeout())
    }

    /// Create a client with an explicit request timeout.
    ///
    /// Vision inference routinely takes 10-20s, so this timeout is separate
    /// from anything the HTTP caller sees.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ProcessorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProcessorError::ClientBuild)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the vision service is reachable
    pub async fn health_check(&self) -> bool {
        let url = format!("{}{}", self.base_url, HEALTH_PATH);

        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Vision service health check failed");
                false
            }
        }
    }
}

#[async_trait]
impl DocumentProcessor for VisionProcessor {
    fn name(&self) -> &'static str {
        "vlm"
    }

    fn can_process(&self, doc_type: DocumentType) -> bool {
        matches!(
            doc_type,
            DocumentType::IdCard | DocumentType::Passport | DocumentType::DriverLicense
        )
    }

    async fn process(
        &self,
        data: &[u8],
        doc_type: DocumentType,
    ) -> Result<ExtractionResult, ProcessorError> {
        if !is_image_data(data) {
            return Err(ProcessorError::NotAnImage);
        }

        let url = format!("{}{}", self.base_url, EXTRACT_PATH);

        // The request body owns its own copy of the image; it is dropped as
        // soon as the request completes.
        let form = Form::new()
            .part("file", Part::bytes(data.to_vec()).file_name("document.bin"))
            .text("document_type", doc_type.as_str());

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProcessorError::Request {
                url: url.clone(),
                source: e,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProcessorError::Request {
                url: url.clone(),
                source: e,
            })?;

        if !status.is_success() {
            return Err(ProcessorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: VisionExtractionResponse = serde_json::from_str(&body)
            .map_err(|source| ProcessorError::InvalidResponse { source })?;

        debug!(
            remote_document_type = %parsed.document_type,
            fields = parsed.fields.len(),
            "Vision service responded"
        );

        Ok(parsed.into_result(doc_type))
    }
}

/// Whether the data starts with a JPEG or PNG signature
fn is_image_data(data: &[u8]) -> bool {
    data.len() >= 4 && (data.starts_with(JPEG_MAGIC) || data.starts_with(PNG_MAGIC))
}

// Vision service API types

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VisionExtractionResponse {
    document_type: String,
    fields: Vec<VisionField>,
    warnings: Vec<String>,
    processing_time_ms: u64,
}

#[derive(Debug, Deserialize)]
struct VisionField {
    key: String,
    value: String,
    confidence: f64,
    // The service echoes its own tag here; results are attributed to the
    // requested document type instead.
    #[serde(default)]
    #[allow(dead_code)]
    source: Option<String>,
}

impl VisionExtractionResponse {
    fn into_result(self, doc_type: DocumentType) -> ExtractionResult {
        ExtractionResult {
            document_type: doc_type,
            fields: self
                .fields
                .into_iter()
                .map(|f| ExtractionField::new(f.key, f.value, f.confidence, doc_type))
                .collect(),
            warnings: self.warnings,
            processing_time_ms: self.processing_time_ms,
        }
    }
}
