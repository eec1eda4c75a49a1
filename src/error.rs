//! Error types for the frame governor.
//!
//! Two taxonomies live here: `Fault` covers internal computation and
//! collaborator failures that are caught at the public-API boundary and
//! converted into neutral results, and `ConfigError` covers configuration
//! validation and persistence.

use thiserror::Error;

/// Internal faults. These never escape a public method; they are forwarded
/// to the injected [`ErrorSink`](crate::providers::ErrorSink) and the call
/// returns a conservative default instead.
#[derive(Error, Debug)]
pub enum Fault {
    #[error("metrics provider '{provider}' unavailable: {reason}")]
    ProviderUnavailable {
        provider: &'static str,
        reason: String,
    },

    #[error("non-finite value in {context}: {value}")]
    NonFiniteValue { context: &'static str, value: f64 },

    #[error("unknown performance level '{0}', expected one of: high, medium, low")]
    UnknownPerformanceLevel(String),

    #[error("unknown stabilization mode '{0}', expected one of: aggressive, balanced, conservative")]
    UnknownStabilizationMode(String),

    #[error("target fps must be greater than zero")]
    InvalidTargetFps,
}

/// Errors related to configuration management.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),

    #[error("failed to write configuration: {0}")]
    WriteError(#[from] std::io::Error),
}
