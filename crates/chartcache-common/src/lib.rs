//! # chartcache common
//!
//! Shared error type, logging setup, and retry/timeout helpers used by every
//! chartcache crate.
//!
//! ## Features
//!
//! - Shared error type for config, timeout and lookup failures
//! - Logging configuration and setup
//! - Bounded retry and timeout utilities
//! - Result extension traits

use std::time::Duration;
use thiserror::Error;

pub mod logging;
pub mod retry;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use retry::{retry_with_backoff, with_timeout, RetryConfig};

/// Error type shared by the chartcache crates.
#[derive(Error, Debug)]
pub enum ChartCacheError {
    /// Configuration could not be read or is invalid.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A guarded operation ran out of time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A required resource is missing.
    #[error("Resource not found: {0}")]
    NotFound(String),
}

impl ChartCacheError {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias for chartcache operations.
pub type Result<T> = std::result::Result<T, ChartCacheError>;

/// Extension trait for Result.
pub trait ResultExt<T> {
    /// Wrap the error as a config error with context.
    fn config_context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn config_context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| ChartCacheError::config_with_source(message, e))
    }
}

/// Extension trait for Option.
pub trait OptionExt<T> {
    /// Convert None to a NotFound error.
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| ChartCacheError::NotFound(resource.into()))
    }
}
