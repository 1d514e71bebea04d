//! Regulatory audit trail for completed extractions.
//!
//! Every completed extraction produces one [`AuditEntry`] recording who
//! consented, when, which field keys were extracted, and when the image was
//! erased. Field values are never part of an entry.
//!
//! Entries go through a bounded queue to a single writer task. Submitting
//! never blocks the extraction; a full queue or a failing sink is logged and
//! nothing else.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::types::{DocumentType, ExtractionResult};
use crate::error::{AuditError, format_error_chain};

/// One immutable audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub document_type: DocumentType,
    pub consent_timestamp: DateTime<Utc>,
    pub consent_given_by: String,
    /// Keys only, never values
    pub fields_extracted: Vec<String>,
    pub processing_duration_ms: u64,
    pub image_deleted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn for_result(
        result: &ExtractionResult,
        consent_timestamp: DateTime<Utc>,
        consent_given_by: impl Into<String>,
        image_deleted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_type: result.document_type,
            consent_timestamp,
            consent_given_by: consent_given_by.into(),
            fields_extracted: result.field_keys(),
            processing_duration_ms: result.processing_time_ms,
            image_deleted_at,
            created_at: Utc::now(),
        }
    }
}

/// Durable destination for audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Emits entries as structured events on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        info!(
            target: "audit",
            audit_id = %entry.id,
            document_type = %entry.document_type,
            consent_timestamp = %entry.consent_timestamp.to_rfc3339(),
            consent_given_by = %entry.consent_given_by,
            fields_extracted = %entry.fields_extracted.join(","),
            processing_duration_ms = entry.processing_duration_ms,
            image_deleted_at = %entry.image_deleted_at.to_rfc3339(),
            "Document processing audit entry"
        );
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
///
/// The file is only ever opened in append mode.
#[derive(Debug, Clone)]
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.sync_data().await?;
        Ok(())
    }
}

/// Handle to the single audit writer task
pub struct AuditWriter {
    tx: mpsc::Sender<AuditEntry>,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AuditWriter {
    /// Start the writer task. `capacity` bounds the number of queued entries.
    pub fn start(sink: Arc<dyn AuditSink>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shutdown = CancellationToken::new();

        info!(sink = sink.name(), capacity, "Audit writer started");
        let handle = tokio::spawn(write_loop(sink, rx, shutdown.clone()));

        Self {
            tx,
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Queue an entry without waiting. Returns false if it was dropped.
    pub fn submit(&self, entry: AuditEntry) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(entry)) => {
                error!(audit_id = %entry.id, "Audit queue full, dropping audit entry");
                false
            }
            Err(mpsc::error::TrySendError::Closed(entry)) => {
                error!(audit_id = %entry.id, "Audit writer stopped, dropping audit entry");
                false
            }
        }
    }

    /// Stop accepting entries, write everything already queued, then stop.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.lock().await.take()
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Audit writer task ended abnormally");
        }
    }
}

async fn write_loop(
    sink: Arc<dyn AuditSink>,
    mut rx: mpsc::Receiver<AuditEntry>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            entry = rx.recv() => match entry {
                Some(entry) => write_entry(sink.as_ref(), &entry).await,
                None => break,
            },
            _ = shutdown.cancelled() => {
                rx.close();
                while let Some(entry) = rx.recv().await {
                    write_entry(sink.as_ref(), &entry).await;
                }
                break;
            }
        }
    }
    debug!("Audit writer stopped");
}

async fn write_entry(sink: &dyn AuditSink, entry: &AuditEntry) {
    match sink.record(entry).await {
        Ok(()) => debug!(audit_id = %entry.id, "Audit entry written"),
        Err(e) => error!(
            audit_id = %entry.id,
            error = %format_error_chain(&e),
            "Failed to write document processing audit log"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::types::ExtractionField;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Semaphore;

    #[derive(Default)]
    struct RecordingSink {
        entries: StdMutex<Vec<AuditEntry>>,
    }

    #[async_trait]
    impl AuditSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn record(&self, _entry: &AuditEntry) -> Result<(), AuditError> {
            Err(AuditError::Io(std::io::Error::other("disk full")))
        }
    }

    struct BlockedSink {
        release: Semaphore,
    }

    #[async_trait]
    impl AuditSink for BlockedSink {
        fn name(&self) -> &'static str {
            "blocked"
        }

        async fn record(&self, _entry: &AuditEntry) -> Result<(), AuditError> {
            if let Ok(permit) = self.release.acquire().await {
                permit.forget();
            }
            Ok(())
        }
    }

    fn sample_entry() -> AuditEntry {
        let result = ExtractionResult {
            document_type: DocumentType::Passport,
            fields: vec![
                ExtractionField::new("last_name", "MUSTERMANN", 0.9, DocumentType::Passport),
                ExtractionField::new("gender", "F", 0.95, DocumentType::Passport),
            ],
            warnings: Vec::new(),
            processing_time_ms: 42,
        };
        AuditEntry::for_result(&result, Utc::now(), "user-1", Utc::now())
    }

    #[test]
    fn test_entry_carries_keys_not_values() {
        let entry = sample_entry();
        assert_eq!(entry.fields_extracted, vec!["last_name", "gender"]);
        assert_eq!(entry.processing_duration_ms, 42);
        assert_eq!(entry.consent_given_by, "user-1");

        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("MUSTERMANN"));
    }

    #[tokio::test]
    async fn test_writer_delivers_and_drains_on_shutdown() {
        let sink = Arc::new(RecordingSink::default());
        let writer = AuditWriter::start(sink.clone(), 8);

        let entries: Vec<AuditEntry> = (0..3).map(|_| sample_entry()).collect();
        for entry in &entries {
            assert!(writer.submit(entry.clone()));
        }
        writer.shutdown().await;

        assert_eq!(*sink.entries.lock().unwrap(), entries);
        assert!(!writer.submit(sample_entry()));
    }

    #[tokio::test]
    async fn test_sink_failure_is_contained() {
        let writer = AuditWriter::start(Arc::new(FailingSink), 4);
        assert!(writer.submit(sample_entry()));
        assert!(writer.submit(sample_entry()));
        writer.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let sink = Arc::new(BlockedSink {
            release: Semaphore::new(0),
        });
        let writer = AuditWriter::start(sink.clone(), 1);

        // One entry may be in flight and one queued; the rest are dropped
        let accepted = (0..4).filter(|_| writer.submit(sample_entry())).count();
        assert!((1..=2).contains(&accepted));

        sink.release.add_permits(accepted);
        writer.shutdown().await;
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("entries.jsonl");
        let sink = JsonlAuditSink::new(&path);

        let first = sample_entry();
        let second = sample_entry();
        sink.record(&first).await.unwrap();
        sink.record(&second).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: Vec<AuditEntry> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(parsed, vec![first, second]);
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_entries() {
        assert!(TracingAuditSink.record(&sample_entry()).await.is_ok());
    }
}
