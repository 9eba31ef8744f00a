//! Configuration validation.

use super::{Config, StoreConfig};
use crate::error::{CloneError, Result};

/// Largest sample accepted for inference.
const MAX_SAMPLE_SIZE: usize = 1000;

/// Upper bound for `clone.max_attempts`.
const MAX_ATTEMPTS: u32 = 100;

/// Upper bound for `clone.backoff_factor`.
const MAX_BACKOFF_FACTOR: f64 = 10.0;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_store("source", &config.source)?;
    validate_store("destination", &config.destination)?;

    // Cannot clone into the same project
    if config.source.url.trim_end_matches('/') == config.destination.url.trim_end_matches('/')
        && config.source.schema == config.destination.schema
    {
        return Err(CloneError::Config(
            "source and destination cannot be the same database".into(),
        ));
    }

    let clone = &config.clone;
    if clone.page_size == 0 {
        return Err(CloneError::Config("clone.page_size must be at least 1".into()));
    }
    if clone.chunk_size == 0 {
        return Err(CloneError::Config("clone.chunk_size must be at least 1".into()));
    }
    if clone.chunk_size >= clone.page_size {
        return Err(CloneError::Config(format!(
            "clone.chunk_size ({}) must be smaller than clone.page_size ({})",
            clone.chunk_size, clone.page_size
        )));
    }
    if clone.max_attempts == 0 || clone.max_attempts > MAX_ATTEMPTS {
        return Err(CloneError::Config(format!(
            "clone.max_attempts must be between 1 and {}, got {}",
            MAX_ATTEMPTS, clone.max_attempts
        )));
    }
    if !(1.0..=MAX_BACKOFF_FACTOR).contains(&clone.backoff_factor) {
        return Err(CloneError::Config(format!(
            "clone.backoff_factor must be between 1.0 and {}, got {}",
            MAX_BACKOFF_FACTOR, clone.backoff_factor
        )));
    }

    if config.schema.sample_size == 0 || config.schema.sample_size > MAX_SAMPLE_SIZE {
        return Err(CloneError::Config(format!(
            "schema.sample_size must be between 1 and {}, got {}",
            MAX_SAMPLE_SIZE, config.schema.sample_size
        )));
    }

    Ok(())
}

fn validate_store(name: &str, store: &StoreConfig) -> Result<()> {
    if store.url.is_empty() {
        return Err(CloneError::Config(format!("{}.url is required", name)));
    }
    if !(store.url.starts_with("http://") || store.url.starts_with("https://")) {
        return Err(CloneError::Config(format!(
            "{}.url must start with http:// or https://, got '{}'",
            name, store.url
        )));
    }
    if store.key.is_empty() {
        return Err(CloneError::Config(format!("{}.key is required", name)));
    }
    if store.timeout_secs == 0 {
        return Err(CloneError::Config(format!(
            "{}.timeout_secs must be at least 1",
            name
        )));
    }
    Ok(())
}
