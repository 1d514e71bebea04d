//! Configuration loading from files and environment variables.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};

use crate::error::{ServiceError, ServiceResult};

use super::settings::{AuditSinkKind, Settings};

const ENV_PREFIX: &str = "DOCEXTRACT";

/// Load settings from `config.*` in the working directory and `DOCEXTRACT__*`
/// environment variables.
pub fn load_settings() -> ServiceResult<Settings> {
    let builder = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
    load_from(builder)
}

fn load_from(builder: ConfigBuilder<DefaultState>) -> ServiceResult<Settings> {
    let settings: Settings = builder
        .build()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to build config: {}", e),
        })?
        .try_deserialize()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to deserialize config: {}", e),
        })?;

    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> ServiceResult<()> {
    if settings.jobs.ttl_secs == 0 {
        return Err(config_error("jobs.ttl_secs must be greater than zero"));
    }
    if settings.vision.is_enabled() && settings.vision.timeout_secs == 0 {
        return Err(config_error("vision.timeout_secs must be greater than zero"));
    }
    if settings.limits.max_upload_bytes == 0 {
        return Err(config_error("limits.max_upload_bytes must be greater than zero"));
    }
    if settings.audit.queue_capacity == 0 {
        return Err(config_error("audit.queue_capacity must be greater than zero"));
    }
    if settings.audit.sink == AuditSinkKind::File && settings.audit.path.as_os_str().is_empty() {
        return Err(config_error("audit.path is required for the file audit sink"));
    }
    Ok(())
}

fn config_error(message: &str) -> ServiceError {
    ServiceError::Config {
        message: message.to_string(),
    }
}
