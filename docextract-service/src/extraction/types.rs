//! Extraction data model.
//!
//! These structures are what callers poll for and what the vision service
//! returns, so their serde shape is part of the external contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Identity document types accepted for extraction.
///
/// Wire tags are the German document names used throughout the practice
/// backend and by the vision service.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum DocumentType {
    /// Personal ID card (TD1 MRZ)
    #[strum(serialize = "personalausweis")]
    #[serde(rename = "personalausweis")]
    IdCard,
    /// Passport (TD3 MRZ)
    #[strum(serialize = "reisepass")]
    #[serde(rename = "reisepass")]
    Passport,
    /// Driver's license
    #[strum(serialize = "fuehrerschein")]
    #[serde(rename = "fuehrerschein")]
    DriverLicense,
    /// Resume / CV
    #[strum(serialize = "lebenslauf")]
    #[serde(rename = "lebenslauf")]
    Resume,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }
}

/// Processing state of an extraction job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// Declared for API compatibility. Jobs are created directly in `Processing`.
    #[allow(dead_code)]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Pending => "pending",
            ExtractionStatus::Processing => "processing",
            ExtractionStatus::Completed => "completed",
            ExtractionStatus::Failed => "failed",
        }
    }

    /// Completed and failed jobs never change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExtractionStatus::Completed | ExtractionStatus::Failed)
    }
}

/// A single extracted field.
///
/// `confidence` is a fixed per-field heuristic in `0.0..=1.0`, not a
/// statistical estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionField {
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub source: DocumentType,
}

impl ExtractionField {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        confidence: f64,
        source: DocumentType,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            confidence,
            source,
        }
    }
}

/// Output of one processor run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub document_type: DocumentType,
    #[serde(default)]
    pub fields: Vec<ExtractionField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub processing_time_ms: u64,
}

impl ExtractionResult {
    /// A successful result that carries no fields, only warnings.
    pub fn empty(document_type: DocumentType, warning: impl Into<String>) -> Self {
        Self {
            document_type,
            fields: Vec::new(),
            warnings: vec![warning.into()],
            processing_time_ms: 0,
        }
    }

    /// Keys of the extracted fields, in extraction order.
    pub fn field_keys(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.key.clone()).collect()
    }
}

/// An extraction job as seen by pollers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionJob {
    pub job_id: String,
    pub status: ExtractionStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ExtractionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExtractionJob {
    /// Create a job that is already processing.
    pub fn processing(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: ExtractionStatus::Processing,
            results: Vec::new(),
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Transition to `Completed` with a single result.
    ///
    /// Returns false and leaves the job untouched if it is already terminal.
    pub fn complete(&mut self, result: ExtractionResult) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = ExtractionStatus::Completed;
        self.results = vec![result];
        self.error = None;
        true
    }

    /// Transition to `Failed` with a message.
    ///
    /// Returns false and leaves the job untouched if it is already terminal.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = ExtractionStatus::Failed;
        self.results.clear();
        self.error = Some(message.into());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_document_type_tags() {
        assert_eq!(DocumentType::IdCard.to_string(), "personalausweis");
        assert_eq!(DocumentType::Passport.as_str(), "reisepass");
        assert_eq!(
            DocumentType::from_str("fuehrerschein").unwrap(),
            DocumentType::DriverLicense
        );
        assert!(DocumentType::from_str("passport").is_err());

        for doc_type in DocumentType::iter() {
            let json = serde_json::to_string(&doc_type).unwrap();
            assert_eq!(json, format!("\"{}\"", doc_type));
        }
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut job = ExtractionJob::processing("abc");
        let result = ExtractionResult::empty(DocumentType::Resume, "stub");

        assert!(job.complete(result.clone()));
        assert_eq!(job.status, ExtractionStatus::Completed);
        assert_eq!(job.results.len(), 1);

        assert!(!job.fail("late failure"));
        assert_eq!(job.status, ExtractionStatus::Completed);
        assert!(job.error.is_none());

        let mut failed = ExtractionJob::processing("def");
        assert!(failed.fail("boom"));
        assert!(!failed.complete(result));
        assert!(failed.results.is_empty());
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_job_serialization_omits_empty_parts() {
        let job = ExtractionJob::processing("0123");
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["status"], "processing");
        assert!(value.get("results").is_none());
        assert!(value.get("error").is_none());
        assert!(value.get("created_at").is_some());
    }
}
