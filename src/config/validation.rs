use super::models::Config;
use thiserror::Error;

const MAX_RETRY_DELAY_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("dispatch.retry_delay_ms must be within 1..={max}, got {actual}")]
    InvalidRetryDelay { actual: u64, max: u64 },

    #[error("dispatch.alert_channel_capacity must be positive")]
    InvalidChannelCapacity,

    #[error("resume.path must not be empty when resume is enabled")]
    MissingResumePath,

    #[error("logging.filter must not be empty")]
    EmptyLogFilter,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_dispatch(config)?;
    validate_resume(config)?;
    validate_logging(config)?;
    Ok(())
}

fn validate_dispatch(config: &Config) -> Result<(), ValidationError> {
    let delay = config.dispatch.retry_delay_ms;
    if delay == 0 || delay > MAX_RETRY_DELAY_MS {
        return Err(ValidationError::InvalidRetryDelay {
            actual: delay,
            max: MAX_RETRY_DELAY_MS,
        });
    }

    if config.dispatch.alert_channel_capacity == 0 {
        return Err(ValidationError::InvalidChannelCapacity);
    }

    Ok(())
}

fn validate_resume(config: &Config) -> Result<(), ValidationError> {
    if config.resume.enabled && config.resume.path.as_os_str().is_empty() {
        return Err(ValidationError::MissingResumePath);
    }
    Ok(())
}

fn validate_logging(config: &Config) -> Result<(), ValidationError> {
    if config.logging.filter.trim().is_empty() {
        return Err(ValidationError::EmptyLogFilter);
    }
    Ok(())
}
