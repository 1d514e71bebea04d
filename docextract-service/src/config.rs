//! Service configuration.

mod loader;
mod settings;

pub use loader::load_settings;
pub use settings::{AuditConfig, AuditSinkKind, Settings, VisionConfig};
