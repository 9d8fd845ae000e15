//! Configuration validation
//!
//! Validates critical configuration values at startup to catch misconfigurations early.

use anyhow::Result;
use docvault_core::Config;

/// Validate critical configuration values
///
/// Runs the config's own checks, then warns about settings that are legal but
/// likely unintended.
pub fn validate_config(config: &Config) -> Result<()> {
    config.validate()?;

    let is_production = config.is_production();
    let env_var = std::env::var("ENVIRONMENT")
        .or_else(|_| std::env::var("APP_ENV"))
        .ok();

    if is_production && env_var.is_none() {
        tracing::warn!(
            "Production mode detected but ENVIRONMENT/APP_ENV not set - error details may leak"
        );
    }

    if is_production && config.uses_memory_database() {
        tracing::warn!("DATABASE_URL=memory:// in production - file records will not survive a restart");
    }

    if config.staging_ttl_secs() == 0 {
        tracing::warn!("STAGING_TTL_SECS=0 - abandoned upload staging is never reaped");
    }

    if config.service_api_key().is_none() {
        tracing::info!("SERVICE_API_KEY not set - processing status callback disabled");
    }

    tracing::info!("Configuration validation passed");
    Ok(())
}
