//! Document processors.
//!
//! Each processor declares which document types it handles and extracts
//! fields from the raw upload. Processors are stateless with respect to
//! uploads: the bytes are only borrowed for the duration of one `process`
//! call and must not be retained. Erasing them is the orchestrator's job.

mod mrz;
mod stubs;
mod vision;

use async_trait::async_trait;

pub use mrz::MrzProcessor;
pub use stubs::{CvStubProcessor, LicenseStubProcessor};
pub use vision::VisionProcessor;

use super::types::{DocumentType, ExtractionResult};
use crate::error::ProcessorError;

/// A field-extraction strategy for one or more document types.
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether this processor handles the given document type
    fn can_process(&self, doc_type: DocumentType) -> bool;

    /// Extract fields from the uploaded bytes.
    ///
    /// An `Err` makes the orchestrator fall through to the next candidate.
    async fn process(
        &self,
        data: &[u8],
        doc_type: DocumentType,
    ) -> Result<ExtractionResult, ProcessorError>;
}
