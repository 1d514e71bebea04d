//! Document field extraction.
//!
//! Uploads become jobs in the transient [`store`]. The [`orchestrator`] runs
//! each job through the processors the [`registry`] resolves for its document
//! type, erases the image, and hands completed jobs to the [`audit`] writer.

pub mod audit;
pub mod orchestrator;
pub mod processors;
pub mod registry;
pub mod store;
pub mod types;

pub use audit::{AuditSink, AuditWriter, JsonlAuditSink, TracingAuditSink};
pub use orchestrator::{ExtractionService, SensitiveBuffer};
pub use processors::VisionProcessor;
pub use registry::ProcessorRegistry;
pub use store::JobStore;
pub use types::{DocumentType, ExtractionJob};
