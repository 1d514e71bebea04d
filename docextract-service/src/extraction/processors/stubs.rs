//! Placeholder processors for document types without real extraction yet.
//!
//! Both always succeed with zero fields, so a stub is always the end of a
//! fallback chain.

use std::time::Instant;

use async_trait::async_trait;

use super::DocumentProcessor;
use crate::error::ProcessorError;
use crate::extraction::types::{DocumentType, ExtractionResult};

const LICENSE_WARNING: &str =
    "Driver's license extraction requires manual review. AI-powered extraction coming soon.";
const CV_WARNING: &str = "CV extraction is not yet available. AI-powered extraction coming soon.";

fn stub_result(doc_type: DocumentType, warning: &str, start: Instant) -> ExtractionResult {
    let mut result = ExtractionResult::empty(doc_type, warning);
    result.processing_time_ms = start.elapsed().as_millis() as u64;
    result
}

/// Driver's license stub
#[derive(Debug, Default, Clone, Copy)]
pub struct LicenseStubProcessor;

#[async_trait]
impl DocumentProcessor for LicenseStubProcessor {
    fn name(&self) -> &'static str {
        "license_stub"
    }

    fn can_process(&self, doc_type: DocumentType) -> bool {
        doc_type == DocumentType::DriverLicense
    }

    async fn process(
        &self,
        _data: &[u8],
        doc_type: DocumentType,
    ) -> Result<ExtractionResult, ProcessorError> {
        Ok(stub_result(doc_type, LICENSE_WARNING, Instant::now()))
    }
}

/// CV / resume stub
#[derive(Debug, Default, Clone, Copy)]
pub struct CvStubProcessor;

#[async_trait]
impl DocumentProcessor for CvStubProcessor {
    fn name(&self) -> &'static str {
        "cv_stub"
    }

    fn can_process(&self, doc_type: DocumentType) -> bool {
        doc_type == DocumentType::Resume
    }

    async fn process(
        &self,
        _data: &[u8],
        doc_type: DocumentType,
    ) -> Result<ExtractionResult, ProcessorError> {
        Ok(stub_result(doc_type, CV_WARNING, Instant::now()))
    }
}
