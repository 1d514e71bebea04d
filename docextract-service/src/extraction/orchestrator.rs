//! Extraction orchestration: job lifecycle, processor fallback, image erasure
//! and the audit hand-off.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use strum::IntoEnumIterator;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use zeroize::Zeroize;

use super::audit::{AuditEntry, AuditWriter};
use super::processors::DocumentProcessor;
use super::registry::ProcessorRegistry;
use super::store::JobStore;
use super::types::{DocumentType, ExtractionJob, ExtractionResult};
use crate::error::format_error_chain;

/// Uploaded document bytes.
///
/// [`SensitiveBuffer::wipe`] zero-fills the contents in place. A buffer
/// dropped without having been wiped is zeroed on drop instead, so an early
/// return can't leave the image behind.
pub struct SensitiveBuffer {
    data: Vec<u8>,
    wiped_at: Option<DateTime<Utc>>,
}

impl SensitiveBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            wiped_at: None,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Overwrite every byte with zero and return the time of erasure.
    ///
    /// Only the first call touches the bytes; later calls return the
    /// original erasure time.
    pub fn wipe(&mut self) -> DateTime<Utc> {
        if let Some(wiped_at) = self.wiped_at {
            return wiped_at;
        }
        self.data.as_mut_slice().zeroize();
        let wiped_at = Utc::now();
        self.wiped_at = Some(wiped_at);
        wiped_at
    }

    #[cfg(test)]
    fn wiped_at(&self) -> Option<DateTime<Utc>> {
        self.wiped_at
    }
}

impl Drop for SensitiveBuffer {
    fn drop(&mut self) {
        if self.wiped_at.is_none() {
            self.data.zeroize();
        }
    }
}

impl From<Vec<u8>> for SensitiveBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

/// Everything a background extraction needs besides the image
struct ExtractionRun {
    job_id: String,
    doc_type: DocumentType,
    consent_timestamp: DateTime<Utc>,
    user_id: String,
    processors: Vec<Arc<dyn DocumentProcessor>>,
}

/// Composes the job store, processor registry and audit writer.
pub struct ExtractionService {
    store: Arc<JobStore>,
    registry: ProcessorRegistry,
    audit: Arc<AuditWriter>,
    tasks: TaskTracker,
}

impl ExtractionService {
    pub fn new(store: Arc<JobStore>, registry: ProcessorRegistry, audit: Arc<AuditWriter>) -> Self {
        info!(processors = ?registry.names(), "Extraction service ready");
        for doc_type in DocumentType::iter() {
            match registry.find_first(doc_type) {
                Some(primary) => {
                    debug!(doc_type = %doc_type, primary = primary.name(), "Primary processor")
                }
                None => warn!(doc_type = %doc_type, "No processor registered for document type"),
            }
        }
        Self {
            store,
            registry,
            audit,
            tasks: TaskTracker::new(),
        }
    }

    /// Create a job and start processing it in the background.
    ///
    /// Returns the job as stored: `processing` normally, or already `failed`
    /// when no processor handles `doc_type`. The image is owned by the
    /// service from here on and is always erased.
    pub fn start_extraction(
        &self,
        image: impl Into<SensitiveBuffer>,
        doc_type: DocumentType,
        consent_timestamp: DateTime<Utc>,
        user_id: impl Into<String>,
    ) -> ExtractionJob {
        let mut image: SensitiveBuffer = image.into();
        let job_id = JobStore::generate_id();
        let mut job = ExtractionJob::processing(job_id.clone());
        self.store.put(job.clone());

        // Held until the run is spawned, so a concurrent shutdown() either
        // rejects this job or waits for it.
        let _admission = self.tasks.token();
        let processors = self.registry.find_all(doc_type);
        let rejection = if self.tasks.is_closed() {
            Some("service is shutting down".to_string())
        } else if processors.is_empty() {
            Some(format!("no processor available for document type: {}", doc_type))
        } else {
            None
        };

        if let Some(message) = rejection {
            warn!(
                job_id = %job_id,
                doc_type = %doc_type,
                reason = %message,
                "Extraction rejected"
            );
            self.store.update(&job_id, |j| {
                j.fail(message.clone());
            });
            image.wipe();
            job.fail(message);
            return self.store.get(&job_id).unwrap_or(job);
        }

        let run = ExtractionRun {
            job_id: job_id.clone(),
            doc_type,
            consent_timestamp,
            user_id: user_id.into(),
            processors,
        };

        // Spawned on the runtime rather than awaited in the caller: a dropped
        // request or client timeout must not stop the run before the image
        // has been erased.
        let store = self.store.clone();
        let audit = self.audit.clone();
        self.tasks.spawn(async move {
            run_extraction(&store, &audit, run, &mut image).await;
        });

        self.store.get(&job_id).unwrap_or(job)
    }

    /// Current state of a job. Unknown and evicted ids are `None`.
    pub fn get_job(&self, job_id: &str) -> Option<ExtractionJob> {
        self.store.get(job_id)
    }

    /// Number of live jobs in the store
    pub fn job_count(&self) -> usize {
        self.store.len()
    }

    /// Wait for in-flight extractions, flush the audit queue and stop the
    /// store's sweeper.
    pub async fn shutdown(&self) {
        self.tasks.close();
        info!(in_flight = self.tasks.len(), "Waiting for in-flight extractions");
        self.tasks.wait().await;
        self.audit.shutdown().await;
        self.store.shutdown();
    }
}

/// Try each processor in order, erase the image, then record the outcome.
async fn run_extraction(
    store: &JobStore,
    audit: &AuditWriter,
    run: ExtractionRun,
    image: &mut SensitiveBuffer,
) {
    let mut outcome: Result<ExtractionResult, String> = Err(format!(
        "no processor available for document type: {}",
        run.doc_type
    ));

    for processor in &run.processors {
        info!(
            job_id = %run.job_id,
            processor = processor.name(),
            doc_type = %run.doc_type,
            "Trying document extraction"
        );

        match processor.process(image.as_slice(), run.doc_type).await {
            Ok(result) => {
                info!(job_id = %run.job_id, processor = processor.name(), "Processor succeeded");
                outcome = Ok(result);
                break;
            }
            Err(e) => {
                let message = format_error_chain(&e);
                warn!(
                    job_id = %run.job_id,
                    processor = processor.name(),
                    error = %message,
                    "Processor failed, trying next"
                );
                outcome = Err(message);
            }
        }
    }

    // Must run before anything else, whatever the outcome
    let image_deleted_at = image.wipe();

    match outcome {
        Ok(result) => {
            let entry = AuditEntry::for_result(
                &result,
                run.consent_timestamp,
                run.user_id,
                image_deleted_at,
            );
            let fields_extracted = result.fields.len();
            let duration_ms = result.processing_time_ms;

            store.update(&run.job_id, |job| {
                job.complete(result);
            });
            info!(
                job_id = %run.job_id,
                fields_extracted,
                duration_ms,
                "Document extraction completed"
            );

            audit.submit(entry);
        }
        Err(message) => {
            error!(job_id = %run.job_id, error = %message, "All processors failed");
            store.update(&run.job_id, |job| {
                job.fail(message);
            });
        }
    }
}
