//! Processor registry.
//!
//! Registration order is the fallback priority: the first registered
//! processor that can handle a document type is tried first.

use std::sync::Arc;

use super::processors::{
    CvStubProcessor, DocumentProcessor, LicenseStubProcessor, MrzProcessor, VisionProcessor,
};
use super::types::DocumentType;

/// Ordered collection of document processors
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: Vec<Arc<dyn DocumentProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The production chain: vision model first (when configured), then the
    /// MRZ text parser, then the stubs.
    pub fn standard(vision: Option<Arc<VisionProcessor>>) -> Self {
        let mut registry = Self::new();
        if let Some(vision) = vision {
            registry = registry.with_shared(vision);
        }
        registry
            .with(MrzProcessor::new())
            .with(LicenseStubProcessor)
            .with(CvStubProcessor)
    }

    /// Append a processor at the lowest priority.
    pub fn with(mut self, processor: impl DocumentProcessor + 'static) -> Self {
        self.processors.push(Arc::new(processor));
        self
    }

    /// Append an already shared processor at the lowest priority.
    pub fn with_shared(mut self, processor: Arc<dyn DocumentProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    /// Every processor that can handle `doc_type`, in registration order.
    pub fn find_all(&self, doc_type: DocumentType) -> Vec<Arc<dyn DocumentProcessor>> {
        self.processors
            .iter()
            .filter(|p| p.can_process(doc_type))
            .cloned()
            .collect()
    }

    /// The highest-priority processor for `doc_type`, if any.
    pub fn find_first(&self, doc_type: DocumentType) -> Option<Arc<dyn DocumentProcessor>> {
        self.processors
            .iter()
            .find(|p| p.can_process(doc_type))
            .cloned()
    }

    /// Processor names in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|p| p.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn vision() -> VisionProcessor {
        VisionProcessor::with_timeout("http://127.0.0.1:9", Duration::from_secs(1)).unwrap()
    }

    fn shared_vision() -> Arc<VisionProcessor> {
        Arc::new(vision())
    }

    fn names_for(registry: &ProcessorRegistry, doc_type: DocumentType) -> Vec<&'static str> {
        registry
            .find_all(doc_type)
            .iter()
            .map(|p| p.name())
            .collect()
    }

    #[test]
    fn test_standard_registry_order() {
        let registry = ProcessorRegistry::standard(Some(shared_vision()));
        assert_eq!(registry.names(), ["vlm", "mrz", "license_stub", "cv_stub"]);

        assert_eq!(names_for(&registry, DocumentType::IdCard), ["vlm", "mrz"]);
        assert_eq!(names_for(&registry, DocumentType::Passport), ["vlm", "mrz"]);
        assert_eq!(
            names_for(&registry, DocumentType::DriverLicense),
            ["vlm", "license_stub"]
        );
        assert_eq!(names_for(&registry, DocumentType::Resume), ["cv_stub"]);
    }

    #[test]
    fn test_standard_registry_without_vision() {
        let registry = ProcessorRegistry::standard(None);
        assert_eq!(registry.names(), ["mrz", "license_stub", "cv_stub"]);
        assert_eq!(names_for(&registry, DocumentType::IdCard), ["mrz"]);
        assert_eq!(
            registry
                .find_first(DocumentType::DriverLicense)
                .map(|p| p.name()),
            Some("license_stub")
        );
    }

    #[test]
    fn test_registration_order_is_priority() {
        let registry = ProcessorRegistry::new()
            .with(LicenseStubProcessor)
            .with(vision());
        assert_eq!(
            names_for(&registry, DocumentType::DriverLicense),
            ["license_stub", "vlm"]
        );
    }

    #[test]
    fn test_empty_registry() {
        let registry = ProcessorRegistry::new();
        assert!(registry.names().is_empty());
        assert!(registry.find_all(DocumentType::Passport).is_empty());
        assert!(registry.find_first(DocumentType::Passport).is_none());
    }
}
