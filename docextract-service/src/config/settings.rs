//! Startup configuration. Nothing here changes while the service runs.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration loaded once at startup
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub vision: VisionConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Job store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// How long a job record stays pollable
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

/// Vision service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    /// Base URL of the vision service. Empty disables the VLM processor.
    #[serde(default)]
    pub base_url: String,

    #[serde(default = "default_vision_timeout_secs")]
    pub timeout_secs: u64,
}

/// Upload limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Where audit entries are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkKind {
    /// Structured events on the `audit` tracing target
    #[default]
    Log,
    /// JSON lines appended to `audit.path`
    File,
}

/// Audit trail configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub sink: AuditSinkKind,

    #[serde(default = "default_audit_path")]
    pub path: PathBuf,

    #[serde(default = "default_audit_queue_capacity")]
    pub queue_capacity: usize,
}

impl JobsConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl VisionConfig {
    pub fn is_enabled(&self) -> bool {
        !self.base_url.trim().is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// Default value functions

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_ttl_secs() -> u64 {
    600
}

fn default_vision_timeout_secs() -> u64 {
    30
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("./data/document_processing_audit.jsonl")
}

fn default_audit_queue_capacity() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: default_vision_timeout_secs(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: AuditSinkKind::default(),
            path: default_audit_path(),
            queue_capacity: default_audit_queue_capacity(),
        }
    }
}
